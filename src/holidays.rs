use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Result, Stage};
use crate::loader::{load_documents, SourceDocument};

#[derive(Debug, Clone, Deserialize)]
pub struct HolidayDocument {
    pub days: Vec<HolidayEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HolidayEntry {
    pub date: String,
    pub name: String,
}

/// Holiday names keyed by date string.
///
/// Keys are taken verbatim from the source documents. A key that is not an
/// ISO `YYYY-MM-DD` date never matches a row and is otherwise harmless.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HolidayIndex {
    by_date: HashMap<String, String>,
}

impl HolidayIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a holiday, replacing any earlier name for the same date.
    pub fn insert(&mut self, entry: HolidayEntry) {
        if let Some(previous) = self.by_date.insert(entry.date.clone(), entry.name) {
            debug!(date = %entry.date, %previous, "holiday overwritten by later source");
        }
    }

    /// Merge documents in order; later entries win.
    pub fn from_documents<I>(documents: I) -> Self
    where
        I: IntoIterator<Item = SourceDocument<HolidayDocument>>,
    {
        let mut index = Self::new();
        for doc in documents {
            index.extend(doc.body.days);
        }
        index
    }

    pub fn name_for(&self, date: &str) -> Option<&str> {
        self.by_date.get(date).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.by_date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }
}

impl Extend<HolidayEntry> for HolidayIndex {
    fn extend<T: IntoIterator<Item = HolidayEntry>>(&mut self, iter: T) {
        for entry in iter {
            self.insert(entry);
        }
    }
}

impl FromIterator<(String, String)> for HolidayIndex {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        let mut index = Self::new();
        index.extend(iter.into_iter().map(|(date, name)| HolidayEntry { date, name }));
        index
    }
}

/// Build the holiday index from every document at `path`.
pub fn build_holiday_index<P: AsRef<Path>>(path: P) -> Result<HolidayIndex> {
    let documents = load_documents::<HolidayDocument, _>(&path, Stage::Holidays)?;
    let count = documents.len();
    let index = HolidayIndex::from_documents(documents);
    info!(documents = count, holidays = index.len(), "holiday index built");
    Ok(index)
}
