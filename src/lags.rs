use polars::prelude::*;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{FrameContext, Result, Stage};
use crate::normalize::coerce_text;

pub const DEFAULT_LAG_DEPTH: usize = 10;

pub fn lag_column_name(target: &str, lag: usize) -> String {
    format!("{target}_lag_{lag}")
}

// === Helpers =============================================================

/// The target as numbers. A text target is parsed here without touching the
/// column itself; the normalizer still reports its bad cells.
fn target_values(df: &DataFrame, target: &str) -> Result<Series> {
    let column = df.column(target).in_stage(Stage::Lags)?;
    match column.dtype() {
        DataType::String => {
            let (values, _) = coerce_text(target, column.str().in_stage(Stage::Lags)?);
            Ok(values)
        }
        _ => Ok(column.as_materialized_series().clone()),
    }
}

/// Append `<target>_lag_1..=depth` in the table's current row order.
///
/// Row `i` of lag `d` holds the target at row `i - d`, or null when `i < d`.
/// Every lag column is emitted even when `depth` exceeds the row count.
/// Lags are numeric: Int64 for integral targets, Float64 otherwise.
pub fn add_lag_features(df: &mut DataFrame, target: &str, depth: usize) -> Result<Vec<String>> {
    let values = target_values(df, target)?;

    let lags: Vec<Series> = (1..=depth)
        .into_par_iter()
        .map(|lag| {
            let name = lag_column_name(target, lag);
            values.shift(lag as i64).with_name(PlSmallStr::from(name.as_str()))
        })
        .collect();

    let mut names = Vec::with_capacity(depth);
    for series in lags {
        names.push(series.name().to_string());
        df.with_column(series).in_stage(Stage::Lags)?;
    }
    debug!(column = target, depth, rows = df.height(), "lag features added");
    Ok(names)
}

// === Tests ===============================================================
