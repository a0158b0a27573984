use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use tracing::debug;

use crate::error::{FrameContext, PipelineError, Result, Stage};
use crate::holidays::HolidayIndex;
use crate::join::ISO_DATE;
use crate::DATE_COLUMN;

pub const WEEKDAY_COLUMN: &str = "weekday";
pub const HOLIDAY_COLUMN: &str = "holiday_name";
pub const MONTH_COLUMN: &str = "month";
pub const DAY_COLUMN: &str = "day";
pub const YEAR_COLUMN: &str = "year";

/// Weekday with Monday = 0 through Sunday = 6.
pub fn weekday_index(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_monday() as i32
}

fn frame_dates(df: &DataFrame) -> Result<Vec<NaiveDate>> {
    let dates = df
        .column(DATE_COLUMN)
        .and_then(|c| c.str())
        .in_stage(Stage::Calendar)?;
    dates
        .into_iter()
        .enumerate()
        .map(|(row, raw)| {
            raw.and_then(|s| NaiveDate::parse_from_str(s, ISO_DATE).ok())
                .ok_or_else(|| {
                    PipelineError::format(
                        Stage::Calendar,
                        DATE_COLUMN,
                        format!("row {row}: expected ISO date, got {raw:?}"),
                    )
                })
        })
        .collect()
}

/// Add `weekday`, `month`, `day`, `year` and `holiday_name` to the merged table.
///
/// Dates without a holiday get the empty string, which is a category of its own.
pub fn derive_calendar(df: &mut DataFrame, holidays: &HolidayIndex) -> Result<()> {
    let dates = frame_dates(df)?;

    let weekday: Vec<i32> = dates.iter().map(|&d| weekday_index(d)).collect();
    let month: Vec<i32> = dates.iter().map(|d| d.month() as i32).collect();
    let day: Vec<i32> = dates.iter().map(|d| d.day() as i32).collect();
    let year: Vec<i32> = dates.iter().map(|d| d.year()).collect();
    let holiday: Vec<String> = dates
        .iter()
        .map(|d| {
            let key = d.format(ISO_DATE).to_string();
            holidays.name_for(&key).unwrap_or_default().to_string()
        })
        .collect();

    let hits = holiday.iter().filter(|h| !h.is_empty()).count();
    for series in [
        Series::new(PlSmallStr::from(HOLIDAY_COLUMN), holiday),
        Series::new(PlSmallStr::from(WEEKDAY_COLUMN), weekday),
        Series::new(PlSmallStr::from(MONTH_COLUMN), month),
        Series::new(PlSmallStr::from(DAY_COLUMN), day),
        Series::new(PlSmallStr::from(YEAR_COLUMN), year),
    ] {
        df.with_column(series).in_stage(Stage::Calendar)?;
    }
    debug!(rows = dates.len(), holidays = hits, "calendar features derived");
    Ok(())
}
