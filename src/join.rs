use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::{debug, info};

use crate::error::{FrameContext, Result, Stage};
use crate::loader::ClinicSeries;
use crate::weather::{WeatherRecord, WeatherTable, MAX_TEMP_COLUMN, MIN_TEMP_COLUMN, WEATHER_CODE_COLUMN};
use crate::DATE_COLUMN;

pub const ISO_DATE: &str = "%Y-%m-%d";

// Slashed day-month-year is read month first: `1/3/2021` is 3 January.
const DATE_FORMATS: [&str; 4] = [ISO_DATE, "%Y/%m/%d", "%Y%m%d", "%m/%d/%Y"];
const DATETIME_FORMATS: [&str; 7] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

/// Reduce a date or timestamp string to its calendar date.
///
/// Time of day is dropped, and so is any UTC offset: `2021-01-01T23:00:00-05:00`
/// is 2021-01-01, the date as written.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_local().date()))
}

/// Pair up rows with equal dates, in left order.
///
/// Every left row is matched against every right row carrying the same date,
/// so duplicate keys fan out into one pair per combination.
pub fn match_rows(left: &[NaiveDate], right: &[NaiveDate]) -> (Vec<IdxSize>, Vec<IdxSize>) {
    let mut by_date: HashMap<NaiveDate, Vec<IdxSize>> = HashMap::with_capacity(right.len());
    for (idx, date) in right.iter().enumerate() {
        by_date.entry(*date).or_default().push(idx as IdxSize);
    }

    let mut left_idx = Vec::with_capacity(left.len());
    let mut right_idx = Vec::with_capacity(left.len());
    for (idx, date) in left.iter().enumerate() {
        match by_date.get(date) {
            Some(matches) => {
                for &r in matches {
                    left_idx.push(idx as IdxSize);
                    right_idx.push(r);
                }
            }
            None => debug!(date = %date, "no weather for clinic date, dropping row"),
        }
    }
    (left_idx, right_idx)
}

fn weather_column<F>(name: &str, rows: &[IdxSize], records: &[WeatherRecord], field: F) -> Column
where
    F: Fn(&WeatherRecord) -> Option<String>,
{
    let values: Vec<Option<String>> = rows.iter().map(|&i| field(&records[i as usize])).collect();
    Series::new(PlSmallStr::from(name), values).into()
}

/// Inner join the clinic series with the flattened weather on calendar date.
///
/// Output columns: `date` (ISO text), the target, any extra clinic columns,
/// then `maxtempC`, `mintempC` and `weatherCode`. Row order follows the clinic
/// series; clinic dates without weather are dropped.
pub fn join_weather(clinic: &ClinicSeries, weather: &WeatherTable) -> Result<DataFrame> {
    let records = weather.records();
    let weather_dates: Vec<NaiveDate> = records.iter().map(|r| r.date).collect();
    let (left, right) = match_rows(&clinic.dates(), &weather_dates);

    let dates: Vec<String> = left
        .iter()
        .map(|&i| clinic.records[i as usize].date.format(ISO_DATE).to_string())
        .collect();
    let counts: Vec<Option<String>> = left
        .iter()
        .map(|&i| clinic.records[i as usize].daily_count.clone())
        .collect();

    let mut columns: Vec<Column> = vec![
        Series::new(PlSmallStr::from(DATE_COLUMN), dates).into(),
        Series::new(PlSmallStr::from(clinic.target.as_str()), counts).into(),
    ];

    if clinic.extra.width() > 0 {
        let take = IdxCa::from_vec(PlSmallStr::from("take"), left.clone());
        let extra = clinic.extra.take(&take).in_stage(Stage::Join)?;
        columns.extend(extra.get_columns().iter().cloned());
    }

    columns.push(weather_column(MAX_TEMP_COLUMN, &right, records, |r| r.max_temp_c.clone()));
    columns.push(weather_column(MIN_TEMP_COLUMN, &right, records, |r| r.min_temp_c.clone()));
    columns.push(weather_column(WEATHER_CODE_COLUMN, &right, records, |r| r.weather_code.clone()));

    let joined = DataFrame::new(columns).in_stage(Stage::Join)?;
    info!(
        clinic_rows = clinic.len(),
        weather_days = records.len(),
        joined_rows = joined.height(),
        "joined clinic series with weather"
    );
    Ok(joined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::DailyRecord;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn clinic(rows: &[(NaiveDate, i64)]) -> ClinicSeries {
        ClinicSeries {
            target: "DAILY_COUNT".into(),
            records: rows
                .iter()
                .map(|&(date, count)| DailyRecord { date, daily_count: Some(count.to_string()) })
                .collect(),
            extra: DataFrame::default(),
        }
    }

    fn weather_day(date: NaiveDate, max: &str) -> WeatherRecord {
        WeatherRecord {
            date,
            max_temp_c: Some(max.into()),
            min_temp_c: Some("1".into()),
            weather_code: Some("113".into()),
        }
    }

    #[test]
    fn test_normalize_date_variants() {
        let expected = ymd(2021, 1, 3);
        for raw in [
            "2021-01-03",
            " 2021-01-03 ",
            "2021/01/03",
            "2021-01-03 00:00:00",
            "2021-01-03 17:45",
            "2021-01-03T23:59:59.500",
            "2021-01-03T23:00:00-05:00",
            "20210103",
            "1/3/2021",
            "01/03/2021",
            "1/3/2021 08:15",
        ] {
            assert_eq!(normalize_date(raw), Some(expected), "{raw}");
        }
        assert_eq!(normalize_date("03/01/2021 maybe"), None);
        assert_eq!(normalize_date("13/01/2021"), None);
        assert_eq!(normalize_date(""), None);
    }

    #[test]
    fn test_match_rows_keeps_left_order_and_fans_out() {
        let left = [ymd(2021, 1, 3), ymd(2021, 1, 1), ymd(2021, 1, 2), ymd(2021, 1, 1)];
        let right = [ymd(2021, 1, 1), ymd(2021, 1, 3), ymd(2021, 1, 1)];
        let (l, r) = match_rows(&left, &right);
        assert_eq!(l, vec![0, 1, 1, 3, 3]);
        assert_eq!(r, vec![1, 0, 2, 0, 2]);
    }

    #[test]
    fn test_join_drops_unmatched_clinic_dates() {
        let series = clinic(&[(ymd(2021, 1, 1), 5), (ymd(2021, 1, 2), 7), (ymd(2021, 1, 3), 9)]);
        let weather = WeatherTable::from_records([
            weather_day(ymd(2021, 1, 1), "10"),
            weather_day(ymd(2021, 1, 3), "12"),
        ]);
        let df = join_weather(&series, &weather).unwrap();

        assert_eq!(df.height(), 2);
        let dates: Vec<_> = df.column("date").unwrap().str().unwrap().into_no_null_iter().collect();
        assert_eq!(dates, ["2021-01-01", "2021-01-03"]);
        let counts: Vec<_> = df.column("DAILY_COUNT").unwrap().str().unwrap().into_no_null_iter().collect();
        assert_eq!(counts, ["5", "9"]);
        let max: Vec<_> = df.column("maxtempC").unwrap().str().unwrap().into_no_null_iter().collect();
        assert_eq!(max, ["10", "12"]);
    }

    #[test]
    fn test_join_carries_extra_clinic_columns() {
        let mut series = clinic(&[(ymd(2021, 1, 1), 5), (ymd(2021, 1, 2), 7)]);
        series.extra = df!("CLINIC" => ["north", "south"]).unwrap();
        let weather = WeatherTable::from_records([weather_day(ymd(2021, 1, 2), "8")]);
        let df = join_weather(&series, &weather).unwrap();

        let names: Vec<&str> = df.get_column_names().into_iter().map(|n| n.as_str()).collect();
        assert_eq!(names, ["date", "DAILY_COUNT", "CLINIC", "maxtempC", "mintempC", "weatherCode"]);
        assert_eq!(df.column("CLINIC").unwrap().str().unwrap().get(0), Some("south"));
    }

    #[test]
    fn test_join_with_no_weather_is_empty_not_error() {
        let series = clinic(&[(ymd(2021, 1, 1), 5)]);
        let df = join_weather(&series, &WeatherTable::default()).unwrap();
        assert_eq!(df.height(), 0);
        assert_eq!(df.width(), 5);
    }
}
