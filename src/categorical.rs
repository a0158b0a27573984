use std::collections::BTreeSet;

use polars::prelude::*;
use tracing::{debug, warn};

use crate::calendar::{HOLIDAY_COLUMN, WEEKDAY_COLUMN};
use crate::error::{FrameContext, Result, Stage};

pub const WEEKDAY_PREFIX: &str = "weekday_";
pub const HOLIDAY_PREFIX: &str = "holiday_";

/// Categories observed in one run, in column order.
///
/// Indicator columns depend on the data, so two runs over different inputs can
/// produce different schemas. Compare domains with [`CategoricalDomain::drift`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoricalDomain {
    pub weekdays: Vec<i32>,
    pub holidays: Vec<String>,
}

/// Indicator columns present in one domain but not the other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaDrift {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl SchemaDrift {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

impl CategoricalDomain {
    pub fn weekday_columns(&self) -> Vec<String> {
        self.weekdays.iter().map(|d| format!("{WEEKDAY_PREFIX}{d}")).collect()
    }

    pub fn holiday_columns(&self) -> Vec<String> {
        self.holidays.iter().map(|h| format!("{HOLIDAY_PREFIX}{h}")).collect()
    }

    pub fn columns(&self) -> Vec<String> {
        let mut cols = self.weekday_columns();
        cols.extend(self.holiday_columns());
        cols
    }

    /// Columns `current` has that `self` lacks (added) and vice versa (removed).
    pub fn drift(&self, current: &CategoricalDomain) -> SchemaDrift {
        let before: BTreeSet<String> = self.columns().into_iter().collect();
        let after: BTreeSet<String> = current.columns().into_iter().collect();
        SchemaDrift {
            added: after.difference(&before).cloned().collect(),
            removed: before.difference(&after).cloned().collect(),
        }
    }
}

fn indicator<T: PartialEq>(name: String, values: &[T], category: &T) -> Series {
    let flags: Vec<i32> = values.iter().map(|v| i32::from(v == category)).collect();
    Series::new(PlSmallStr::from(name.as_str()), flags)
}

/// Replace `weekday` and `holiday_name` with 0/1 indicator columns.
///
/// One column per observed value: `weekday_<n>` ascending by weekday, then
/// `holiday_<name>` ascending by name, with `holiday_` for "no holiday".
pub fn expand_categoricals(df: &mut DataFrame) -> Result<CategoricalDomain> {
    let weekdays: Vec<i32> = {
        let column = df.column(WEEKDAY_COLUMN).in_stage(Stage::Categorical)?;
        let values = column.cast(&DataType::Int32).in_stage(Stage::Categorical)?;
        let values = values.i32().in_stage(Stage::Categorical)?;
        if values.null_count() > 0 {
            warn!(nulls = values.null_count(), "weekday column has missing values");
        }
        // -1 never matches a category, so a missing weekday gets no indicator
        values.into_iter().map(|v| v.unwrap_or(-1)).collect()
    };
    let holidays: Vec<String> = df
        .column(HOLIDAY_COLUMN)
        .and_then(|c| c.str())
        .in_stage(Stage::Categorical)?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect();

    let weekday_domain: BTreeSet<i32> = weekdays.iter().copied().filter(|d| *d >= 0).collect();
    let holiday_domain: BTreeSet<String> = holidays.iter().cloned().collect();
    let domain = CategoricalDomain {
        weekdays: weekday_domain.into_iter().collect(),
        holidays: holiday_domain.into_iter().collect(),
    };

    // sources go first: a holiday called "name" yields `holiday_name`
    df.drop_in_place(WEEKDAY_COLUMN).in_stage(Stage::Categorical)?;
    df.drop_in_place(HOLIDAY_COLUMN).in_stage(Stage::Categorical)?;

    for (name, day) in domain.weekday_columns().into_iter().zip(&domain.weekdays) {
        df.with_column(indicator(name, &weekdays, day)).in_stage(Stage::Categorical)?;
    }
    for (name, holiday) in domain.holiday_columns().into_iter().zip(&domain.holidays) {
        df.with_column(indicator(name, &holidays, holiday)).in_stage(Stage::Categorical)?;
    }

    debug!(
        weekdays = domain.weekdays.len(),
        holidays = domain.holidays.len(),
        "categoricals expanded"
    );
    Ok(domain)
}
