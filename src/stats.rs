use chrono::{DateTime, Utc};
use serde::Serialize;

/// Processing counters for one sensor in one run.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct SensorStats {
    pub as_of: DateTime<Utc>,
    pub sensor_id: Option<String>,
    pub status: Option<String>,

    // partitions
    pub partitions_listed: usize,
    pub partitions_read: usize,
    pub partitions_failed: usize,

    // rows
    pub rows_read: usize,
    pub rows_rejected: usize,
    pub malformed_values: usize,
    pub duplicate_rows: usize,
    pub future_rows: usize,

    // window
    pub warmup_rows: usize,
    pub window_rows: usize,
    pub aqhi_rows: usize,

    pub error_message: Option<String>,
}

impl SensorStats {
    pub fn new(sensor_id: &str, as_of: DateTime<Utc>) -> Self {
        SensorStats {
            as_of,
            sensor_id: Some(sensor_id.to_string()),
            ..Default::default()
        }
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    /// Share of window rows that received an AQHI value.
    pub fn aqhi_coverage_pct(&self) -> f64 {
        Self::pct(self.aqhi_rows, self.window_rows)
    }

    /// Share of read rows dropped for a missing or broken timestamp.
    pub fn rejected_pct(&self) -> f64 {
        Self::pct(self.rows_rejected, self.rows_read)
    }

    pub fn with_status(mut self, status: &str, error_message: Option<String>) -> Self {
        self.status = Some(status.to_string());
        self.error_message = error_message;
        self
    }
}
