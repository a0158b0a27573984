use std::fs;
use std::path::Path;

use clinic_dataset::{storage, PipelineConfig, PipelineError, Stage};
use tempfile::{tempdir, TempDir};

fn weather_day(date: &str, max: &str, min: &str, code: &str) -> String {
    format!(
        r#"{{"date":"{date}","maxtempC":"{max}","mintempC":"{min}","hourly":[{{"time":"0","weatherCode":"{code}"}},{{"time":"300","weatherCode":"999"}}]}}"#
    )
}

fn write_weather(dir: &Path, name: &str, days: &[String]) {
    let body = format!(r#"{{"data":{{"request":[],"weather":[{}]}}}}"#, days.join(","));
    fs::write(dir.join(name), body).unwrap();
}

/// Clinic rows 2021-01-01..03, weather for the 1st and 3rd, New Year holiday.
fn fixture() -> (TempDir, PipelineConfig) {
    let root = tempdir().unwrap();
    let weather = root.path().join("Weather");
    let holidays = root.path().join("Holiday");
    fs::create_dir_all(&weather).unwrap();
    fs::create_dir_all(&holidays).unwrap();

    fs::write(
        root.path().join("DailyCount.csv"),
        "date,DAILY_COUNT\n2021-01-01,5\n2021-01-02,7\n2021-01-03,9\n",
    )
    .unwrap();
    write_weather(&weather, "2021-01.json", &[weather_day("2021-01-01", "9", "-1", "113")]);
    write_weather(&weather, "2021-01-late.json", &[weather_day("2021-01-03", "11", "2", "176")]);
    fs::write(
        holidays.join("2021.json"),
        r#"{"year":2021,"days":[{"name":"New Year","date":"2021-01-01","isOffDay":true}]}"#,
    )
    .unwrap();

    let config = PipelineConfig::new(
        root.path().join("DailyCount.csv"),
        &weather,
        &holidays,
        root.path().join("dataset.csv"),
    );
    (root, config)
}

#[test]
fn pipeline_end_to_end() {
    let (_root, config) = fixture();
    let output = clinic_dataset::run(&config).unwrap();

    let text = fs::read_to_string(&config.output_path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);

    let header: Vec<&str> = lines[0].split(',').collect();
    let mut expected = vec!["date", "DAILY_COUNT", "maxtempC", "mintempC", "weatherCode", "weekday_4", "weekday_6"];
    let lag_names: Vec<String> = (1..=10).map(|d| format!("DAILY_COUNT_lag_{d}")).collect();
    expected.extend(lag_names.iter().map(String::as_str));
    expected.extend(["month", "day", "year", "holiday_", "holiday_New Year"]);
    assert_eq!(header, expected);

    // 2021-01-01 is a Friday, 2021-01-03 a Sunday; lag_1 of the second row is
    // the first row's count because lags follow post-join order.
    let row = |head: &[&str], lags: &[&str], tail: &[&str]| -> String {
        let mut fields: Vec<&str> = head.to_vec();
        fields.extend(lags);
        fields.extend(std::iter::repeat("").take(10 - lags.len()));
        fields.extend(tail);
        fields.join(",")
    };
    assert_eq!(lines[1], row(&["2021-01-01", "5", "9", "-1", "113", "1", "0"], &[], &["1", "1", "2021", "0", "1"]));
    assert_eq!(lines[2], row(&["2021-01-03", "9", "11", "2", "176", "0", "1"], &["5"], &["1", "3", "2021", "1", "0"]));

    assert_eq!(output.domain.weekdays, [4, 6]);
    assert_eq!(output.domain.holidays, ["", "New Year"]);
    assert!(output.coercion.is_clean());
}

#[test]
fn pipeline_is_idempotent() {
    let (root, config) = fixture();
    clinic_dataset::run(&config).unwrap();
    let first = fs::read(&config.output_path).unwrap();

    let second_config = PipelineConfig {
        output_path: root.path().join("again.csv"),
        ..config.clone()
    };
    clinic_dataset::run(&second_config).unwrap();
    let second = fs::read(&second_config.output_path).unwrap();
    assert_eq!(first, second);
}

#[test]
fn malformed_weather_aborts_without_output() {
    let (_root, config) = fixture();
    fs::write(config.weather_path.join("2021-02.json"), r#"{"data":{"weather":"soon"}}"#).unwrap();

    let err = clinic_dataset::run(&config).unwrap_err();
    assert_eq!(err.stage(), Stage::Weather);
    assert!(matches!(err, PipelineError::Document { .. }));
    assert!(err.to_string().contains("2021-02.json"));
    assert!(!config.output_path.exists());
}

#[test]
fn unparseable_weather_values_become_missing() {
    let (_root, config) = fixture();
    write_weather(
        &config.weather_path,
        "2021-01-late.json",
        &[weather_day("2021-01-03", "hot", "2", "176")],
    );

    let output = clinic_dataset::run(&config).unwrap();
    let max = output.frame.column("maxtempC").unwrap().i64().unwrap();
    assert_eq!(max.get(0), Some(9));
    assert_eq!(max.get(1), None);
    assert_eq!(output.coercion.failures_for("maxtempC"), 1);
}

#[test]
fn bad_target_cells_are_reported_not_dropped() {
    let (root, config) = fixture();
    fs::write(
        root.path().join("DailyCount.csv"),
        "date,DAILY_COUNT\n1/1/2021,n/a\n2021-01-02,7\n1/3/2021,12.5\n",
    )
    .unwrap();

    let output = clinic_dataset::run(&config).unwrap();
    assert_eq!(output.coercion.failures_for("DAILY_COUNT"), 1);
    let counts = output.frame.column("DAILY_COUNT").unwrap().f64().unwrap();
    assert_eq!(counts.get(0), None);
    assert_eq!(counts.get(1), Some(12.5));
    let dates: Vec<_> = output.frame.column("date").unwrap().str().unwrap().into_no_null_iter().collect();
    assert_eq!(dates, ["2021-01-01", "2021-01-03"]);
}

#[test]
fn short_series_keeps_every_lag_column() {
    let (_root, config) = fixture();
    let config = config.with_lag_depth(10);
    let output = clinic_dataset::pipeline::build_dataset(&config).unwrap();
    assert_eq!(output.frame.height(), 2);
    for d in 1..=10 {
        let column = output.frame.column(format!("DAILY_COUNT_lag_{d}").as_str()).unwrap();
        let expected_nulls = if d == 1 { 1 } else { 2 };
        assert_eq!(column.null_count(), expected_nulls, "lag {d}");
    }
    assert!(!config.output_path.exists());
}

#[test]
fn parquet_output() {
    let (root, config) = fixture();
    let config = PipelineConfig {
        output_path: root.path().join("dataset.parquet"),
        ..config
    };
    let output = clinic_dataset::run(&config).unwrap();
    let read = storage::read_parquet(&config.output_path).unwrap();
    assert_eq!(read.shape(), output.frame.shape());
}
