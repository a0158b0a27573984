use std::fmt;
use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Pipeline stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Holidays,
    Weather,
    Clinic,
    Join,
    Calendar,
    Categorical,
    Lags,
    Normalize,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Holidays => "holidays",
            Stage::Weather => "weather",
            Stage::Clinic => "clinic",
            Stage::Join => "join",
            Stage::Calendar => "calendar",
            Stage::Categorical => "categorical",
            Stage::Lags => "lags",
            Stage::Normalize => "normalize",
            Stage::Persist => "persist",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("[{stage}] failed to access {}: {source}", .path.display())]
    Io {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[{stage}] malformed document {}: {source}", .path.display())]
    Document {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("[{stage}] unexpected shape in {origin}: {detail}")]
    SourceFormat {
        stage: Stage,
        origin: String,
        detail: String,
    },

    #[error("[{stage}] data frame operation failed: {source}")]
    Frame {
        stage: Stage,
        #[source]
        source: PolarsError,
    },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Io { stage, .. }
            | PipelineError::Document { stage, .. }
            | PipelineError::SourceFormat { stage, .. }
            | PipelineError::Frame { stage, .. } => *stage,
        }
    }

    pub(crate) fn format(stage: Stage, origin: impl Into<String>, detail: impl Into<String>) -> Self {
        PipelineError::SourceFormat {
            stage,
            origin: origin.into(),
            detail: detail.into(),
        }
    }
}

/// Attach a stage to a polars result.
pub(crate) trait FrameContext<T> {
    fn in_stage(self, stage: Stage) -> Result<T>;
}

impl<T> FrameContext<T> for std::result::Result<T, PolarsError> {
    fn in_stage(self, stage: Stage) -> Result<T> {
        self.map_err(|source| PipelineError::Frame { stage, source })
    }
}
