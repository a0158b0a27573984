use std::collections::BTreeMap;

use polars::prelude::*;
use tracing::{debug, warn};

use crate::error::{FrameContext, Result, Stage};

/// Per-column counts of values that could not be made numeric.
///
/// Empty or missing cells are not failures; they were already missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoercionReport {
    failures: BTreeMap<String, usize>,
}

impl CoercionReport {
    pub fn failures_for(&self, column: &str) -> usize {
        self.failures.get(column).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.failures.values().sum()
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }

    /// Columns with at least one failure.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.failures.iter().map(|(k, v)| (k.as_str(), *v))
    }

    fn record(&mut self, column: &str, failures: usize) {
        if failures > 0 {
            self.failures.insert(column.to_string(), failures);
        }
    }
}

enum Parsed {
    Int(i64),
    Float(f64),
}

fn parse_number(raw: &str) -> Option<Parsed> {
    if let Ok(v) = raw.parse::<i64>() {
        return Some(Parsed::Int(v));
    }
    raw.parse::<f64>().ok().map(Parsed::Float)
}

/// Parse a text column; Int64 if every parsed value is integral, else Float64.
///
/// Also returns how many non-empty cells failed to parse.
pub(crate) fn coerce_text(name: &str, values: &StringChunked) -> (Series, usize) {
    let mut failures = 0;
    let parsed: Vec<Option<Parsed>> = values
        .into_iter()
        .map(|v| {
            let raw = v.map(str::trim).filter(|s| !s.is_empty())?;
            let number = parse_number(raw);
            if number.is_none() {
                failures += 1;
            }
            number
        })
        .collect();

    let name = PlSmallStr::from(name);
    let all_int = parsed.iter().flatten().all(|p| matches!(p, Parsed::Int(_)));
    let series = if all_int {
        let ints: Vec<Option<i64>> = parsed
            .into_iter()
            .map(|p| match p {
                Some(Parsed::Int(v)) => Some(v),
                _ => None,
            })
            .collect();
        Series::new(name, ints)
    } else {
        let floats: Vec<Option<f64>> = parsed
            .into_iter()
            .map(|p| match p {
                Some(Parsed::Int(v)) => Some(v as f64),
                Some(Parsed::Float(v)) => Some(v),
                None => None,
            })
            .collect();
        Series::new(name, floats)
    };
    (series, failures)
}

pub(crate) fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Make every column except `key` numeric, in place.
///
/// Unparsable values become null; no column is dropped, even one that ends up
/// entirely null.
pub fn normalize_numeric(df: &mut DataFrame, key: &str) -> Result<CoercionReport> {
    let mut report = CoercionReport::default();
    let names: Vec<String> = df
        .get_column_names()
        .into_iter()
        .map(|n| n.to_string())
        .filter(|n| n != key)
        .collect();

    for name in names {
        let column = df.column(&name).in_stage(Stage::Normalize)?;
        let dtype = column.dtype().clone();
        if is_numeric(&dtype) {
            continue;
        }

        let (series, failures) = match dtype {
            DataType::String => {
                let values = column.str().in_stage(Stage::Normalize)?;
                coerce_text(&name, values)
            }
            DataType::Boolean => {
                let cast = column.cast(&DataType::Int32).in_stage(Stage::Normalize)?;
                (cast.as_materialized_series().clone(), 0)
            }
            other => {
                let before = column.null_count();
                let cast = column.cast(&DataType::Float64).in_stage(Stage::Normalize)?;
                let failures = cast.null_count().saturating_sub(before);
                debug!(column = %name, dtype = %other, "cast to float");
                (cast.as_materialized_series().clone(), failures)
            }
        };

        if failures > 0 {
            warn!(column = %name, failures, "values could not be made numeric");
        }
        report.record(&name, failures);
        df.with_column(series).in_stage(Stage::Normalize)?;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_columns_become_numbers() {
        let mut df = df!(
            "date" => ["2021-01-01", "2021-01-02", "2021-01-03"],
            "maxtempC" => ["9", "12", "-3"],
            "mintempC" => ["1.5", "2", "0"],
            "weatherCode" => ["113", "n/a", ""]
        )
        .unwrap();
        let report = normalize_numeric(&mut df, "date").unwrap();

        assert_eq!(df.column("date").unwrap().dtype(), &DataType::String);
        assert_eq!(df.column("maxtempC").unwrap().dtype(), &DataType::Int64);
        assert_eq!(df.column("mintempC").unwrap().dtype(), &DataType::Float64);

        let code = df.column("weatherCode").unwrap().i64().unwrap();
        assert_eq!(code.get(0), Some(113));
        assert_eq!(code.get(1), None);
        assert_eq!(code.get(2), None);

        assert_eq!(report.failures_for("weatherCode"), 1);
        assert_eq!(report.failures_for("maxtempC"), 0);
        assert_eq!(report.total(), 1);
    }

    #[test]
    fn test_text_target_is_coerced_and_counted() {
        let mut df = df!(
            "date" => ["2021-01-01", "2021-01-02", "2021-01-03"],
            "DAILY_COUNT" => [Some("5"), Some("n/a"), Some("12.5")]
        )
        .unwrap();
        let report = normalize_numeric(&mut df, "date").unwrap();

        let counts = df.column("DAILY_COUNT").unwrap().f64().unwrap();
        assert_eq!(counts.get(0), Some(5.0));
        assert_eq!(counts.get(1), None);
        assert_eq!(counts.get(2), Some(12.5));
        assert_eq!(report.failures_for("DAILY_COUNT"), 1);
    }

    #[test]
    fn test_all_invalid_column_is_kept() {
        let mut df = df!("date" => ["2021-01-01", "2021-01-02"], "note" => ["closed", "open"]).unwrap();
        let report = normalize_numeric(&mut df, "date").unwrap();
        assert_eq!(df.width(), 2);
        assert_eq!(df.column("note").unwrap().null_count(), 2);
        assert_eq!(report.iter().collect::<Vec<_>>(), [("note", 2)]);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_numeric_and_boolean_columns() {
        let mut df = df!(
            "date" => ["2021-01-01", "2021-01-02"],
            "DAILY_COUNT" => [Some(5i64), None],
            "open" => [true, false]
        )
        .unwrap();
        let report = normalize_numeric(&mut df, "date").unwrap();
        assert!(report.is_clean());
        assert_eq!(df.column("DAILY_COUNT").unwrap().null_count(), 1);
        let open: Vec<_> = df.column("open").unwrap().i32().unwrap().into_no_null_iter().collect();
        assert_eq!(open, [1, 0]);
    }
}
