//! Per-sensor pipeline and the concurrent multi-sensor runner.
//!
//! Each sensor runs normalize → calibrate → window → AQHI → snapshot on its
//! own task. Nothing a single sensor hits leaves this module as an error; it
//! becomes a [`SensorStatus`] on that sensor's snapshot.

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, error, info, warn};

use crate::config::{SensorConfig, Settings, SourceProfile};
use crate::error::WindowError;
use crate::snapshot::{SensorSnapshot, SensorStatus};
use crate::source::PartitionSource;
use crate::stats::SensorStats;
use crate::window::WindowAssembler;

/// Everything produced for one sensor in one run.
#[derive(Debug, Clone)]
pub struct SensorReport {
    pub sensor: SensorConfig,
    pub snapshot: SensorSnapshot,
    pub stats: SensorStats,
}

impl SensorReport {
    fn failed(
        sensor: SensorConfig,
        status: SensorStatus,
        as_of: DateTime<FixedOffset>,
        message: String,
    ) -> Self {
        let stats = SensorStats::new(&sensor.id, as_of.with_timezone(&Utc))
            .with_status(status.as_str(), Some(message));
        Self {
            snapshot: SensorSnapshot::no_data(&sensor.id, status),
            sensor,
            stats,
        }
    }
}

/// Sensors to process: every configured sensor in config order, followed by
/// discovered ids that are not configured when a default source is set.
pub fn plan_sensors(settings: &Settings, discovered: &[String]) -> Vec<SensorConfig> {
    let mut planned = settings.sensors.clone();
    let known: BTreeSet<&str> = settings.sensors.iter().map(|s| s.id.as_str()).collect();

    let extra: Vec<&String> = discovered
        .iter()
        .filter(|id| !known.contains(id.as_str()))
        .collect();

    match &settings.default_source {
        Some(source) => {
            planned.extend(extra.into_iter().map(|id| SensorConfig::new(id, source)));
        }
        None if !extra.is_empty() => {
            debug!(
                count = extra.len(),
                "Discovered sensors without config ignored, no default_source set"
            );
        }
        None => {}
    }

    planned
}

/// Runs the whole pipeline for one sensor.
///
/// Partitions are listed newest first and loaded one at a time until the
/// window is covered, so older history is never read.
pub async fn process_sensor<S>(
    source: &S,
    settings: &Settings,
    profile: &SourceProfile,
    sensor: SensorConfig,
    as_of: DateTime<FixedOffset>,
) -> SensorReport
where
    S: PartitionSource + ?Sized,
{
    let refs = match source.list(&sensor.id).await {
        Ok(refs) => refs,
        Err(e) => {
            error!(error = %e, "Failed to list partitions");
            return SensorReport::failed(sensor, SensorStatus::SourceError, as_of, e.to_string());
        }
    };

    let mut assembler = WindowAssembler::new(
        &sensor.id,
        &profile.schema,
        &profile.calibration,
        as_of,
        settings.window,
    );

    let mut pushed = 0usize;
    let mut failed = 0usize;
    let mut last_error = None;
    for partition_ref in &refs {
        match source.load(partition_ref).await {
            Ok(partition) => {
                pushed += 1;
                if assembler.push(partition) {
                    debug!(pushed, listed = refs.len(), "Window covered");
                    break;
                }
            }
            Err(e) => {
                failed += 1;
                warn!(
                    location = %partition_ref.location.display(),
                    error = %e,
                    "Failed to load partition, skipping"
                );
                last_error = Some(e.to_string());
            }
        }
    }

    let (window, mut stats) = assembler.finish();
    stats.partitions_listed = refs.len();
    stats.partitions_failed = failed;

    let mut window_span = None;
    let snapshot = match window {
        Err(_) if pushed == 0 && failed > 0 => {
            let message = last_error.unwrap_or_default();
            return SensorReport {
                snapshot: SensorSnapshot::no_data(&sensor.id, SensorStatus::SourceError),
                stats: stats.with_status(SensorStatus::SourceError.as_str(), Some(message)),
                sensor,
            };
        }
        Err(WindowError::MissingSource(_)) => {
            warn!("No partitions for sensor");
            SensorSnapshot::no_data(&sensor.id, SensorStatus::MissingSource)
        }
        Err(WindowError::NoReadings(_)) => {
            warn!(rows_read = stats.rows_read, "No usable readings in partitions");
            SensorSnapshot::no_data(&sensor.id, SensorStatus::NoReadings)
        }
        Ok(window) => {
            let series = settings.aqhi.annotate(&window);
            stats.aqhi_rows = series.computed_rows();
            window_span = Some(window.span());
            SensorSnapshot::build(&window, &series)
        }
    };

    match snapshot.status {
        SensorStatus::Ok => info!(
            window_rows = stats.window_rows,
            aqhi_rows = stats.aqhi_rows,
            duplicates = stats.duplicate_rows,
            span_minutes = window_span.map_or(0, |s| s.num_minutes()),
            aqhi_coverage_pct = stats.aqhi_coverage_pct(),
            rejected_pct = stats.rejected_pct(),
            "Sensor processed"
        ),
        SensorStatus::Stale => warn!(
            last_seen = snapshot.last_seen.as_deref().unwrap_or("never"),
            "Sensor is stale"
        ),
        SensorStatus::AqhiUnavailable => warn!(
            window_rows = stats.window_rows,
            "AQHI inputs missing, reporting raw fields only"
        ),
        _ => {}
    }

    let stats = stats.with_status(snapshot.status.as_str(), None);
    SensorReport {
        sensor,
        snapshot,
        stats,
    }
}

/// Processes every planned sensor concurrently, at most `concurrency` at a
/// time. Reports come back in plan order.
///
/// # Errors
///
/// Only if the source cannot enumerate its sensors; per-sensor failures are
/// carried in the reports.
pub async fn run(
    source: Arc<dyn PartitionSource>,
    settings: Arc<Settings>,
    as_of: DateTime<FixedOffset>,
    concurrency: usize,
) -> Result<Vec<SensorReport>> {
    let discovered = if settings.default_source.is_some() {
        source
            .sensor_ids()
            .await
            .context("failed to enumerate sensors")?
    } else {
        Vec::new()
    };

    let planned = plan_sensors(&settings, &discovered);
    info!(sensors = planned.len(), as_of = %as_of, concurrency, "Starting run");

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = Vec::with_capacity(planned.len());

    for sensor in planned {
        let sem = semaphore.clone();
        let source = source.clone();
        let settings = settings.clone();
        let fallback = sensor.clone();

        let sensor_span = tracing::info_span!(
            "process_sensor",
            sensor_id = %sensor.id,
            source = %sensor.source,
        );

        let task = tokio::spawn(
            async move {
                let _permit = sem.acquire_owned().await;
                let Some(profile) = settings.source(&sensor.source) else {
                    let message = format!("unknown source '{}'", sensor.source);
                    return SensorReport::failed(sensor, SensorStatus::SourceError, as_of, message);
                };
                process_sensor(source.as_ref(), &settings, &profile, sensor, as_of).await
            }
            .instrument(sensor_span),
        );

        tasks.push((fallback, task));
    }

    let mut reports = Vec::with_capacity(tasks.len());
    for (sensor, task) in tasks {
        match task.await {
            Ok(report) => reports.push(report),
            Err(e) => {
                error!(sensor_id = %sensor.id, error = %e, "Sensor task failed");
                reports.push(SensorReport::failed(
                    sensor,
                    SensorStatus::SourceError,
                    as_of,
                    e.to_string(),
                ));
            }
        }
    }

    let ok = reports
        .iter()
        .filter(|r| r.snapshot.status == SensorStatus::Ok)
        .count();
    info!(sensors = reports.len(), ok, "Run finished");

    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aqhi::AqhiCalculator;
    use crate::calibrate::CalibrationTable;
    use crate::normalize::SourceSchema;
    use crate::reading::{PartitionRef, RawPartition, RawRow};
    use crate::source::MemorySource;
    use crate::window::WindowSpec;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::{Duration, NaiveDate, TimeZone};
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn test_process_sensor_ok() {
        let source = MemorySource::new().with(partition("2021", 30, &[(10, 0), (11, 0), (11, 30)]));
        let settings = settings(None, vec![SensorConfig::new("2021", "ramp")]);
        let profile = settings.source("ramp").unwrap();

        let report =
            process_sensor(&source, &settings, &profile, settings.sensors[0].clone(), as_of()).await;

        assert_eq!(report.snapshot.status, SensorStatus::Ok);
        assert_eq!(report.snapshot.history.len(), 3);
        assert_eq!(report.stats.partitions_listed, 1);
        assert_eq!(report.stats.aqhi_rows, 3);
        assert_eq!(report.stats.status.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_process_sensor_without_partitions() {
        let source = MemorySource::new();
        let settings = settings(None, vec![SensorConfig::new("2021", "ramp")]);
        let profile = settings.source("ramp").unwrap();

        let report =
            process_sensor(&source, &settings, &profile, settings.sensors[0].clone(), as_of()).await;

        assert_eq!(report.snapshot.status, SensorStatus::MissingSource);
        assert!(report.snapshot.history.is_empty());
    }

    #[tokio::test]
    async fn test_failing_source_is_isolated() {
        let settings = Arc::new(settings(
            None,
            vec![SensorConfig::new("broken", "ramp"), SensorConfig::new("2021", "ramp")],
        ));
        let source: Arc<dyn PartitionSource> = Arc::new(FlakySource {
            inner: MemorySource::new().with(partition("2021", 30, &[(11, 0)])),
        });

        let reports = run(source, settings, as_of(), 2).await.unwrap();

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].sensor.id, "broken");
        assert_eq!(reports[0].snapshot.status, SensorStatus::SourceError);
        assert!(reports[0].stats.error_message.as_deref().unwrap().contains("offline"));
        assert_eq!(reports[1].snapshot.status, SensorStatus::Ok);
    }

    #[tokio::test]
    async fn test_run_includes_discovered_sensors_with_default_source() {
        let settings = Arc::new(settings(Some("ramp"), vec![SensorConfig::new("2021", "ramp")]));
        let source: Arc<dyn PartitionSource> = Arc::new(
            MemorySource::new()
                .with(partition("2021", 30, &[(11, 0)]))
                .with(partition("2019", 30, &[(11, 15)])),
        );

        let reports = run(source, settings, as_of(), 4).await.unwrap();

        let ids: Vec<&str> = reports.iter().map(|r| r.sensor.id.as_str()).collect();
        assert_eq!(ids, vec!["2021", "2019"]);
        assert!(reports.iter().all(|r| r.snapshot.status == SensorStatus::Ok));
    }

    #[test]
    fn test_plan_ignores_unconfigured_without_default() {
        let settings = settings(None, vec![SensorConfig::new("2021", "ramp")]);
        let planned = plan_sensors(&settings, &["2019".to_string(), "2021".to_string()]);
        assert_eq!(planned, vec![SensorConfig::new("2021", "ramp")]);
    }

    // Helper functions for tests
    struct FlakySource {
        inner: MemorySource,
    }

    #[async_trait]
    impl PartitionSource for FlakySource {
        async fn sensor_ids(&self) -> Result<Vec<String>> {
            self.inner.sensor_ids().await
        }

        async fn list(&self, sensor_id: &str) -> Result<Vec<PartitionRef>> {
            if sensor_id == "broken" {
                return Err(anyhow!("bucket offline"));
            }
            self.inner.list(sensor_id).await
        }

        async fn load(&self, partition: &PartitionRef) -> Result<RawPartition> {
            self.inner.load(partition).await
        }
    }

    fn pdt() -> FixedOffset {
        FixedOffset::west_opt(7 * 3600).unwrap()
    }

    fn as_of() -> DateTime<FixedOffset> {
        pdt().with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap()
    }

    fn settings(default_source: Option<&str>, sensors: Vec<SensorConfig>) -> Settings {
        let profile = SourceProfile {
            name: "ramp".into(),
            schema: SourceSchema::ramp(),
            calibration: CalibrationTable::new(),
        };
        Settings {
            tz: pdt(),
            window: WindowSpec::new(Duration::hours(24), Duration::hours(3)),
            aqhi: AqhiCalculator::default(),
            sources: BTreeMap::from([("ramp".to_string(), Arc::new(profile))]),
            default_source: default_source.map(str::to_string),
            sensors,
        }
    }

    fn partition(sensor_id: &str, day: u32, times: &[(u32, u32)]) -> RawPartition {
        let date = NaiveDate::from_ymd_opt(2025, 6, day).unwrap();
        let rows = times
            .iter()
            .map(|(h, m)| {
                RawRow::new(vec![
                    ("DATE".into(), format!("2025-06-{day:02} {h:02}:{m:02}:00")),
                    ("NO2".into(), "20".into()),
                    ("O3".into(), "30".into()),
                    ("PM2.5".into(), "10".into()),
                ])
            })
            .collect();
        RawPartition {
            descriptor: PartitionRef::single_day(sensor_id, date, format!("{sensor_id}_{date}.csv")),
            rows,
        }
    }
}
