use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use polars::prelude::*;
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{FrameContext, PipelineError, Result, Stage};
use crate::join::normalize_date;
use crate::DATE_COLUMN;

/// A parsed source document and the file it came from.
#[derive(Debug, Clone)]
pub struct SourceDocument<T> {
    pub path: PathBuf,
    pub body: T,
}

/// One row of the clinic series.
///
/// The count stays as written; the normalizer turns it into a number and
/// reports cells that are not one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyRecord {
    pub date: NaiveDate,
    pub daily_count: Option<String>,
}

/// The clinic series in file order.
///
/// `extra` holds every clinic column other than the date and the target,
/// as raw text, with one row per entry in `records`.
#[derive(Debug, Clone)]
pub struct ClinicSeries {
    pub target: String,
    pub records: Vec<DailyRecord>,
    pub extra: DataFrame,
}

impl ClinicSeries {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.records.iter().map(|r| r.date).collect()
    }
}

/// List the JSON documents at `path`.
///
/// A file is returned as-is. A directory yields its `*.json` entries sorted by
/// path so last-write-wins merging is reproducible across file systems.
pub fn discover_json_sources<P: AsRef<Path>>(path: P, stage: Stage) -> Result<Vec<PathBuf>> {
    let path = path.as_ref();
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let io_err = |source| PipelineError::Io { stage, path: path.to_path_buf(), source };
    let mut sources = Vec::new();
    for entry in std::fs::read_dir(path).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let path = entry.path();
        if path.extension().map_or(false, |ext| ext == "json") {
            sources.push(path);
        }
    }
    sources.sort();
    Ok(sources)
}

/// Load a single JSON document
pub fn load_document<T: DeserializeOwned, P: AsRef<Path>>(path: P, stage: Stage) -> Result<T> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| PipelineError::Io {
        stage,
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    serde_json::from_reader(reader).map_err(|source| PipelineError::Document {
        stage,
        path: path.to_path_buf(),
        source,
    })
}

/// Load every document at `path`, parsed in parallel, returned in discovery order.
pub fn load_documents<T, P>(path: P, stage: Stage) -> Result<Vec<SourceDocument<T>>>
where
    T: DeserializeOwned + Send,
    P: AsRef<Path>,
{
    let sources = discover_json_sources(&path, stage)?;
    if sources.is_empty() {
        warn!(%stage, path = %path.as_ref().display(), "no JSON documents found");
    }

    sources
        .into_par_iter()
        .map(|path| -> Result<SourceDocument<T>> {
            let body = load_document(&path, stage)?;
            debug!(%stage, path = %path.display(), "loaded document");
            Ok(SourceDocument { path, body })
        })
        .collect()
}

/// Load the clinic series from a CSV file with a `date` column and `target`.
///
/// Every column is read as text. Rows whose date cannot be parsed abort the
/// load; the target is left for the normalizer.
pub fn load_clinic_series<P: AsRef<Path>>(path: P, target: &str) -> Result<ClinicSeries> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(PipelineError::Io {
            stage: Stage::Clinic,
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "clinic series not found"),
        });
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .in_stage(Stage::Clinic)?;

    let origin = path.display().to_string();
    for required in [DATE_COLUMN, target] {
        if df.column(required).is_err() {
            return Err(PipelineError::format(
                Stage::Clinic,
                origin,
                format!("missing required column `{required}`"),
            ));
        }
    }

    let dates = df.column(DATE_COLUMN).in_stage(Stage::Clinic)?.str().in_stage(Stage::Clinic)?;
    let counts = df.column(target).in_stage(Stage::Clinic)?.str().in_stage(Stage::Clinic)?;

    let mut records = Vec::with_capacity(df.height());
    for (row, (date, count)) in dates.into_iter().zip(counts.into_iter()).enumerate() {
        // header is line 1
        let line = row + 2;
        let date = date
            .and_then(normalize_date)
            .ok_or_else(|| {
                PipelineError::format(
                    Stage::Clinic,
                    origin.clone(),
                    format!("line {line}: unparseable date {:?}", date.unwrap_or("")),
                )
            })?;
        records.push(DailyRecord { date, daily_count: count.map(str::to_string) });
    }

    let extra = df
        .drop(DATE_COLUMN)
        .and_then(|df| df.drop(target))
        .in_stage(Stage::Clinic)?;

    debug!(rows = records.len(), extra_columns = extra.width(), "loaded clinic series");
    Ok(ClinicSeries { target: target.to_string(), records, extra })
}
