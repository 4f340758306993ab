//! Row and partition types flowing through the pipeline.

use chrono::{DateTime, FixedOffset, NaiveDate};
use std::path::PathBuf;

use crate::fields::FieldValues;

/// One undecoded source row: raw column name to raw text value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    pub columns: Vec<(String, String)>,
}

impl RawRow {
    pub fn new(columns: Vec<(String, String)>) -> Self {
        Self { columns }
    }

    /// Looks a column up by name, ignoring case and surrounding whitespace.
    pub fn get(&self, name: &str) -> Option<&str> {
        let wanted = name.trim();
        self.columns
            .iter()
            .find(|(k, _)| k.trim().eq_ignore_ascii_case(wanted))
            .map(|(_, v)| v.as_str())
    }
}

/// Where a partition came from and the dates it claims to cover.
///
/// The declared range is only used to pick partitions, never to filter rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRef {
    pub sensor_id: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub location: PathBuf,
}

impl PartitionRef {
    pub fn single_day(sensor_id: &str, date: NaiveDate, location: impl Into<PathBuf>) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            start: date,
            end: date,
            location: location.into(),
        }
    }
}

/// Orders partition refs newest first: by end date, then start date, then
/// location so the traversal is stable regardless of listing order.
pub fn sort_newest_first(refs: &mut [PartitionRef]) {
    refs.sort_by(|a, b| {
        b.end
            .cmp(&a.end)
            .then_with(|| b.start.cmp(&a.start))
            .then_with(|| a.location.cmp(&b.location))
    });
}

/// An immutable batch of raw rows for one sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPartition {
    pub descriptor: PartitionRef,
    pub rows: Vec<RawRow>,
}

/// A normalized observation with canonical field names.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub sensor_id: String,
    pub timestamp: DateTime<FixedOffset>,
    pub values: FieldValues,
}

/// A reading after the affine correction has been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibratedReading {
    pub sensor_id: String,
    pub timestamp: DateTime<FixedOffset>,
    pub values: FieldValues,
}
