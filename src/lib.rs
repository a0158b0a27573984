//! Builds a model-ready daily dataset from clinic visit counts, weather
//! documents and holiday calendars.
//!
//! Stages, in run order: [`holidays`] and [`weather`] load independently,
//! [`join`] aligns them with the clinic series, then [`calendar`],
//! [`categorical`], [`lags`] and [`normalize`] shape the table that
//! [`storage`] writes. [`pipeline`] wires them together.

pub mod calendar;
pub mod categorical;
pub mod error;
pub mod holidays;
pub mod join;
pub mod lags;
pub mod loader;
pub mod normalize;
pub mod pipeline;
pub mod storage;
pub mod weather;

pub use error::{PipelineError, Result, Stage};
pub use pipeline::{run, PipelineConfig, PipelineOutput};

/// Join key; the only column left non-numeric in the output.
pub const DATE_COLUMN: &str = "date";
pub const DEFAULT_TARGET_COLUMN: &str = "DAILY_COUNT";
