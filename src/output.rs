//! Output formatting and persistence for run results.
//!
//! Supports pretty-printing, the JSON payload file, and CSV append of
//! per-sensor stats.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tracing::debug;

use crate::config::SensorConfig;
use crate::pipeline::SensorReport;
use crate::snapshot::{HistoryRow, Latest, SensorStatus, format_timestamp};
use crate::stats::SensorStats;
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// One sensor entry of the payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorOutput {
    pub id: String,
    pub name: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub status: SensorStatus,
    pub last_seen: Option<String>,
    pub latest: Latest,
    pub history: Vec<HistoryRow>,
}

impl SensorOutput {
    pub fn from_report(report: &SensorReport) -> Self {
        let SensorConfig { id, name, lat, lon, .. } = &report.sensor;
        let snapshot = &report.snapshot;
        Self {
            id: id.clone(),
            name: name.clone().unwrap_or_else(|| id.clone()),
            lat: *lat,
            lon: *lon,
            status: snapshot.status,
            last_seen: snapshot.last_seen.clone(),
            latest: snapshot.latest.clone(),
            history: snapshot.history.clone(),
        }
    }
}

/// The document consumed by the dashboards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Payload {
    pub generated_at: String,
    pub sensors: Vec<SensorOutput>,
}

impl Payload {
    pub fn new(generated_at: &DateTime<FixedOffset>, reports: &[SensorReport]) -> Self {
        Self {
            generated_at: format_timestamp(generated_at),
            sensors: reports.iter().map(SensorOutput::from_report).collect(),
        }
    }
}

/// Logs sensor statistics using Rust's debug pretty-print format.
pub fn print_pretty(stats: &SensorStats) {
    debug!("{:#?}", stats);
}

/// Writes `value` as compact JSON to `path`, creating parent directories.
pub fn write_json<T: Serialize>(path: &str, value: &T) -> Result<()> {
    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory '{}'", parent.display()))?;
    }
    let body = serde_json::to_vec(value)?;
    std::fs::write(path, body).with_context(|| format!("failed to write '{path}'"))?;
    debug!(path, "JSON written");
    Ok(())
}

/// Appends a [`SensorStats`] record as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_record(path: &str, stats: &SensorStats) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, "Appending CSV record");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // IMPORTANT when appending
        .from_writer(file);

    writer.serialize(stats)?;
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SensorSnapshot;
    use chrono::TimeZone;
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> String {
        format!("{}/{}", env::temp_dir().display(), name)
    }

    #[test]
    fn test_print_pretty_does_not_panic() {
        let stats = SensorStats::default();
        print_pretty(&stats);
    }

    #[test]
    fn test_payload_shape() {
        let mut sensor = SensorConfig::new("2021", "ramp");
        sensor.name = Some("Memorial Library".into());
        sensor.lat = Some(49.33);
        let report = SensorReport {
            snapshot: SensorSnapshot::no_data("2021", SensorStatus::MissingSource),
            sensor,
            stats: SensorStats::default(),
        };
        let generated_at = FixedOffset::west_opt(7 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 6, 30, 14, 5, 0)
            .unwrap();

        let json = serde_json::to_value(Payload::new(&generated_at, &[report])).unwrap();

        assert_eq!(json["generated_at"], "2025-06-30T14:05-07:00");
        let sensor = &json["sensors"][0];
        assert_eq!(sensor["id"], "2021");
        assert_eq!(sensor["name"], "Memorial Library");
        assert_eq!(sensor["lat"], 49.33);
        assert!(sensor["lon"].is_null());
        assert_eq!(sensor["status"], "missing_source");
        assert_eq!(sensor["latest"], "no data");
        assert_eq!(sensor["history"], serde_json::json!([]));
    }

    #[test]
    fn test_write_json_creates_parent_dirs() {
        let dir = temp_path("aqhi_snapshot_test_json");
        let _ = fs::remove_dir_all(&dir);
        let path = format!("{dir}/nested/out.json");

        write_json(&path, &serde_json::json!({"ok": true})).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), r#"{"ok":true}"#);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_append_record_writes_header_once() {
        let path = temp_path("aqhi_snapshot_test_header.csv");
        let _ = fs::remove_file(&path);

        let stats = SensorStats::default();
        append_record(&path, &stats).unwrap();
        append_record(&path, &stats).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.contains("partitions_listed")).count();
        assert_eq!(header_count, 1);
        // 1 header + 2 data rows
        assert_eq!(content.lines().count(), 3);

        fs::remove_file(&path).unwrap();
    }
}
