// Persist the finished dataset as CSV or Parquet.
//
// Writes go to a hidden sibling file first and are renamed into place, so a
// failed run never leaves a half-written dataset behind.

use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{FrameContext, PipelineError, Result, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Parquet,
}

impl OutputFormat {
    /// `.parquet` selects Parquet; anything else is CSV.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("parquet") => OutputFormat::Parquet,
            _ => OutputFormat::Csv,
        }
    }
}

fn io_error(path: &Path, source: std::io::Error) -> PipelineError {
    PipelineError::Io { stage: Stage::Persist, path: path.to_path_buf(), source }
}

fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string());
    path.with_file_name(format!(".{name}.partial"))
}

/// Save a DataFrame as comma-separated text with a header row
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path).map_err(|e| io_error(path, e))?;

    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(df)
        .in_stage(Stage::Persist)
}

/// Save a DataFrame to a Parquet file
pub fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| io_error(path, e))?;

    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Zstd(None))
        .finish(df)
        .in_stage(Stage::Persist)?;

    Ok(())
}

/// Load a DataFrame from a Parquet file
pub fn read_parquet(path: &Path) -> Result<DataFrame> {
    let file = File::open(path).map_err(|e| io_error(path, e))?;

    ParquetReader::new(file).finish().in_stage(Stage::Persist)
}

/// Write `df` to `path` in the format implied by its extension.
pub fn persist(df: &mut DataFrame, path: &Path) -> Result<OutputFormat> {
    let format = OutputFormat::from_path(path);
    let staging = partial_path(path);

    let written = match format {
        OutputFormat::Csv => write_csv(df, &staging),
        OutputFormat::Parquet => write_parquet(df, &staging),
    };
    if let Err(err) = written {
        let _ = std::fs::remove_file(&staging);
        return Err(err);
    }

    std::fs::rename(&staging, path).map_err(|e| io_error(path, e))?;
    Ok(format)
}
