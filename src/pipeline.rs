//! Runs every stage in order and persists the result.

use std::collections::HashSet;
use std::path::PathBuf;

use polars::prelude::*;
use tracing::info;

use crate::calendar::{self, DAY_COLUMN, MONTH_COLUMN, YEAR_COLUMN};
use crate::categorical::{self, CategoricalDomain};
use crate::error::{FrameContext, Result, Stage};
use crate::holidays::{self, HolidayIndex};
use crate::join;
use crate::lags::{self, DEFAULT_LAG_DEPTH};
use crate::loader::{self, ClinicSeries};
use crate::normalize::{self, CoercionReport};
use crate::storage;
use crate::weather::{self, WeatherTable, MAX_TEMP_COLUMN, MIN_TEMP_COLUMN, WEATHER_CODE_COLUMN};
use crate::{DATE_COLUMN, DEFAULT_TARGET_COLUMN};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// CSV with `date` and the target column.
    pub clinic_path: PathBuf,
    /// Folder of weather JSON documents, or a single document.
    pub weather_path: PathBuf,
    /// Folder of holiday JSON documents, or a single document.
    pub holiday_path: PathBuf,
    pub output_path: PathBuf,
    pub lag_depth: usize,
    pub target_column: String,
}

impl PipelineConfig {
    pub fn new(
        clinic_path: impl Into<PathBuf>,
        weather_path: impl Into<PathBuf>,
        holiday_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            clinic_path: clinic_path.into(),
            weather_path: weather_path.into(),
            holiday_path: holiday_path.into(),
            output_path: output_path.into(),
            lag_depth: DEFAULT_LAG_DEPTH,
            target_column: DEFAULT_TARGET_COLUMN.to_string(),
        }
    }

    pub fn with_lag_depth(mut self, lag_depth: usize) -> Self {
        self.lag_depth = lag_depth;
        self
    }

    pub fn with_target_column(mut self, target: impl Into<String>) -> Self {
        self.target_column = target.into();
        self
    }
}

/// The finished table plus what a caller needs to judge it.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub frame: DataFrame,
    pub domain: CategoricalDomain,
    pub coercion: CoercionReport,
}

/// Feature-engineer already loaded sources into the final table.
///
/// Stage order matters: lags are computed after the join so they follow the
/// post-join row order, never calendar adjacency.
pub fn assemble(
    clinic: &ClinicSeries,
    weather: &WeatherTable,
    holidays: &HolidayIndex,
    lag_depth: usize,
) -> Result<PipelineOutput> {
    let mut df = join::join_weather(clinic, weather)?;
    calendar::derive_calendar(&mut df, holidays)?;
    let domain = categorical::expand_categoricals(&mut df)?;
    let lag_columns = lags::add_lag_features(&mut df, &clinic.target, lag_depth)?;
    let coercion = normalize::normalize_numeric(&mut df, DATE_COLUMN)?;
    let frame = arrange_columns(&df, &clinic.target, &domain, &lag_columns)?;
    Ok(PipelineOutput { frame, domain, coercion })
}

/// `date`, clinic columns, weather, weekday indicators, lags, month/day/year,
/// holiday indicators.
fn arrange_columns(
    df: &DataFrame,
    target: &str,
    domain: &CategoricalDomain,
    lag_columns: &[String],
) -> Result<DataFrame> {
    let weather = [MAX_TEMP_COLUMN, MIN_TEMP_COLUMN, WEATHER_CODE_COLUMN].map(String::from);
    let calendar = [MONTH_COLUMN, DAY_COLUMN, YEAR_COLUMN].map(String::from);
    let weekday = domain.weekday_columns();
    let holiday = domain.holiday_columns();

    let placed: HashSet<&str> = [DATE_COLUMN, target]
        .into_iter()
        .chain(weather.iter().map(String::as_str))
        .chain(calendar.iter().map(String::as_str))
        .chain(weekday.iter().map(String::as_str))
        .chain(holiday.iter().map(String::as_str))
        .chain(lag_columns.iter().map(String::as_str))
        .collect();
    let extra: Vec<String> = df
        .get_column_names()
        .into_iter()
        .filter(|n| !placed.contains(n.as_str()))
        .map(|n| n.to_string())
        .collect();

    let mut order = vec![DATE_COLUMN.to_string(), target.to_string()];
    order.extend(extra);
    order.extend(weather);
    order.extend(weekday);
    order.extend(lag_columns.iter().cloned());
    order.extend(calendar);
    order.extend(holiday);

    df.select(order).in_stage(Stage::Persist)
}

/// Load every source and build the table without writing it.
pub fn build_dataset(config: &PipelineConfig) -> Result<PipelineOutput> {
    let (holidays, weather) = rayon::join(
        || holidays::build_holiday_index(&config.holiday_path),
        || weather::load_weather(&config.weather_path),
    );
    let (holidays, weather) = (holidays?, weather?);
    let clinic = loader::load_clinic_series(&config.clinic_path, &config.target_column)?;
    info!(rows = clinic.len(), path = %config.clinic_path.display(), "clinic series loaded");

    assemble(&clinic, &weather, &holidays, config.lag_depth)
}

/// Build the dataset and write it to `config.output_path`.
///
/// Nothing is written unless every stage succeeds.
pub fn run(config: &PipelineConfig) -> Result<PipelineOutput> {
    let mut output = build_dataset(config)?;
    let format = storage::persist(&mut output.frame, &config.output_path)?;
    info!(
        rows = output.frame.height(),
        columns = output.frame.width(),
        ?format,
        path = %config.output_path.display(),
        "dataset written"
    );
    Ok(output)
}
