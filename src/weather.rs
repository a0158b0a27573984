use std::collections::BTreeMap;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use tracing::{debug, info};

use crate::error::{PipelineError, Result, Stage};
use crate::join::normalize_date;
use crate::loader::{load_documents, SourceDocument};

pub const MAX_TEMP_COLUMN: &str = "maxtempC";
pub const MIN_TEMP_COLUMN: &str = "mintempC";
pub const WEATHER_CODE_COLUMN: &str = "weatherCode";

/// A JSON scalar kept as the text it was written with.
///
/// Providers send temperatures both as `"12"` and `12`; coercion to numbers
/// happens once, in the normalizer.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawScalar {
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
}

impl RawScalar {
    pub fn into_text(self) -> String {
        match self {
            RawScalar::Text(s) => s,
            RawScalar::Number(n) => n.to_string(),
            RawScalar::Flag(b) => b.to_string(),
        }
    }
}

/// A field that must be present but may be `null`.
fn nullable<'de, D>(deserializer: D) -> std::result::Result<Option<RawScalar>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawScalar>::deserialize(deserializer)
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherDocument {
    pub data: WeatherData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherData {
    pub weather: Vec<WeatherDay>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherDay {
    pub date: String,
    #[serde(rename = "maxtempC", deserialize_with = "nullable")]
    pub max_temp_c: Option<RawScalar>,
    #[serde(rename = "mintempC", deserialize_with = "nullable")]
    pub min_temp_c: Option<RawScalar>,
    pub hourly: Vec<HourlyObservation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HourlyObservation {
    #[serde(rename = "weatherCode", deserialize_with = "nullable")]
    pub weather_code: Option<RawScalar>,
}

/// One flattened day of weather.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherRecord {
    pub date: NaiveDate,
    pub max_temp_c: Option<String>,
    pub min_temp_c: Option<String>,
    /// Code of the first hourly observation of the day.
    pub weather_code: Option<String>,
}

/// Flattened weather keyed by calendar date, ascending.
#[derive(Debug, Clone, Default)]
pub struct WeatherTable {
    records: Vec<WeatherRecord>,
}

impl WeatherTable {
    /// Build from records in observation order; a later record for a date
    /// replaces the earlier one wholesale.
    pub fn from_records<I: IntoIterator<Item = WeatherRecord>>(records: I) -> Self {
        let by_date: BTreeMap<NaiveDate, WeatherRecord> =
            records.into_iter().map(|r| (r.date, r)).collect();
        Self { records: by_date.into_values().collect() }
    }

    pub fn records(&self) -> &[WeatherRecord] {
        &self.records
    }

    pub fn get(&self, date: NaiveDate) -> Option<&WeatherRecord> {
        self.records
            .binary_search_by_key(&date, |r| r.date)
            .ok()
            .map(|i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn flatten_day(day: WeatherDay, origin: &Path) -> Result<WeatherRecord> {
    let date = normalize_date(&day.date).ok_or_else(|| {
        PipelineError::format(
            Stage::Weather,
            origin.display().to_string(),
            format!("unparseable date {:?}", day.date),
        )
    })?;
    let first_hour = day.hourly.into_iter().next().ok_or_else(|| {
        PipelineError::format(
            Stage::Weather,
            origin.display().to_string(),
            format!("day {} has no hourly observations", day.date),
        )
    })?;

    Ok(WeatherRecord {
        date,
        max_temp_c: day.max_temp_c.map(RawScalar::into_text),
        min_temp_c: day.min_temp_c.map(RawScalar::into_text),
        weather_code: first_hour.weather_code.map(RawScalar::into_text),
    })
}

/// Flatten weather documents into one record per date.
///
/// Documents are applied in the given order, so a date reported twice keeps
/// the record from the later document.
pub fn flatten_weather(documents: Vec<SourceDocument<WeatherDocument>>) -> Result<WeatherTable> {
    let mut days = Vec::new();
    for doc in documents {
        let reported = doc.body.data.weather.len();
        for day in doc.body.data.weather {
            days.push(flatten_day(day, &doc.path)?);
        }
        debug!(path = %doc.path.display(), days = reported, "flattened weather document");
    }
    Ok(WeatherTable::from_records(days))
}

/// Load and flatten every weather document at `path`.
pub fn load_weather<P: AsRef<Path>>(path: P) -> Result<WeatherTable> {
    let documents = load_documents::<WeatherDocument, _>(&path, Stage::Weather)?;
    let count = documents.len();
    let table = flatten_weather(documents)?;
    info!(documents = count, days = table.len(), "weather flattened");
    Ok(table)
}
