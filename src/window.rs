//! Trailing-window assembly over overlapping raw partitions.
//!
//! Partitions are pushed newest first. Each one is normalized, calibrated
//! and merged into an arena keyed by timestamp, and the caller stops pushing
//! once [`WindowAssembler::push`] reports the window (plus the rolling-mean
//! warm-up) is covered. The first partition to supply a timestamp keeps it,
//! so the newest-declared partition wins; inside one partition a later row
//! overrides an earlier duplicate.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use tracing::{debug, trace};

use crate::calibrate::CalibrationTable;
use crate::error::WindowError;
use crate::normalize::{SourceSchema, normalize_row};
use crate::reading::{CalibratedReading, RawPartition};
use crate::stats::SensorStats;

/// Trailing window length plus the extra history kept for rolling means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSpec {
    pub length: Duration,
    pub lookback: Duration,
}

impl WindowSpec {
    pub fn new(length: Duration, lookback: Duration) -> Self {
        Self { length, lookback }
    }
}

/// Calibrated readings for one sensor inside `[as_of - length, as_of]`.
///
/// `readings` is sorted ascending with unique timestamps. `warmup` holds the
/// readings of the preceding lookback period and is never reported.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub sensor_id: String,
    pub as_of: DateTime<FixedOffset>,
    pub start: DateTime<FixedOffset>,
    pub warmup: Vec<CalibratedReading>,
    pub readings: Vec<CalibratedReading>,
    /// Newest reading seen in any accumulated partition, even if outside
    /// the window.
    pub last_seen: Option<DateTime<FixedOffset>>,
}

impl Window {
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Elapsed time between the first and last reading of the window.
    pub fn span(&self) -> Duration {
        match (self.readings.first(), self.readings.last()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => Duration::zero(),
        }
    }
}

pub struct WindowAssembler<'a> {
    sensor_id: String,
    schema: &'a SourceSchema,
    calibration: &'a CalibrationTable,
    as_of: DateTime<FixedOffset>,
    spec: WindowSpec,
    arena: BTreeMap<DateTime<FixedOffset>, CalibratedReading>,
    partitions: usize,
    stats: SensorStats,
}

impl<'a> WindowAssembler<'a> {
    pub fn new(
        sensor_id: &str,
        schema: &'a SourceSchema,
        calibration: &'a CalibrationTable,
        as_of: DateTime<FixedOffset>,
        spec: WindowSpec,
    ) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            schema,
            calibration,
            as_of,
            spec,
            arena: BTreeMap::new(),
            partitions: 0,
            stats: SensorStats::new(sensor_id, as_of.with_timezone(&Utc)),
        }
    }

    pub fn cutoff(&self) -> DateTime<FixedOffset> {
        self.as_of - self.spec.length
    }

    fn warmup_start(&self) -> DateTime<FixedOffset> {
        self.cutoff() - self.spec.lookback
    }

    /// True once the accumulated readings reach back to the warm-up start.
    pub fn is_covered(&self) -> bool {
        self.arena
            .keys()
            .next()
            .is_some_and(|earliest| *earliest <= self.warmup_start())
    }

    /// Merges one partition and reports whether the window is now covered.
    pub fn push(&mut self, partition: RawPartition) -> bool {
        self.partitions += 1;
        self.stats.partitions_read += 1;

        let tz = *self.as_of.offset();
        let mut local: BTreeMap<DateTime<FixedOffset>, CalibratedReading> = BTreeMap::new();

        for row in &partition.rows {
            self.stats.rows_read += 1;
            match normalize_row(row, self.schema, &self.sensor_id, tz) {
                Ok(normalized) => {
                    self.stats.malformed_values += normalized.malformed.len();
                    let reading = self.calibration.calibrate(normalized.reading);
                    if local.insert(reading.timestamp, reading).is_some() {
                        self.stats.duplicate_rows += 1;
                    }
                }
                Err(reason) => {
                    self.stats.rows_rejected += 1;
                    trace!(sensor_id = %self.sensor_id, ?reason, "Row rejected");
                }
            }
        }

        let mut merged = 0usize;
        for (ts, reading) in local {
            match self.arena.entry(ts) {
                Entry::Vacant(slot) => {
                    slot.insert(reading);
                    merged += 1;
                }
                Entry::Occupied(_) => self.stats.duplicate_rows += 1,
            }
        }

        debug!(
            sensor_id = %self.sensor_id,
            location = %partition.descriptor.location.display(),
            rows = partition.rows.len(),
            merged,
            "Partition merged"
        );

        self.is_covered()
    }

    pub fn stats(&self) -> &SensorStats {
        &self.stats
    }

    /// Filters the arena to the window and warm-up periods.
    ///
    /// # Errors
    ///
    /// [`WindowError::MissingSource`] if no partition was pushed,
    /// [`WindowError::NoReadings`] if none of them yielded a usable row.
    pub fn finish(self) -> (Result<Window, WindowError>, SensorStats) {
        let mut stats = self.stats;

        if self.partitions == 0 {
            return (Err(WindowError::MissingSource(self.sensor_id)), stats);
        }
        if self.arena.is_empty() {
            return (Err(WindowError::NoReadings(self.sensor_id)), stats);
        }

        let cutoff = self.as_of - self.spec.length;
        let warmup_start = cutoff - self.spec.lookback;
        let last_seen = self.arena.keys().next_back().copied();

        let mut warmup = Vec::new();
        let mut readings = Vec::new();
        for (ts, reading) in self.arena {
            if ts > self.as_of {
                stats.future_rows += 1;
            } else if ts >= cutoff {
                readings.push(reading);
            } else if ts >= warmup_start {
                warmup.push(reading);
            }
        }

        stats.warmup_rows = warmup.len();
        stats.window_rows = readings.len();

        let window = Window {
            sensor_id: self.sensor_id,
            as_of: self.as_of,
            start: cutoff,
            warmup,
            readings,
            last_seen,
        };
        (Ok(window), stats)
    }
}

/// Assembles a window from partitions that are already in memory, reading
/// them newest first and stopping once covered.
pub fn assemble_window(
    sensor_id: &str,
    partitions: impl IntoIterator<Item = RawPartition>,
    schema: &SourceSchema,
    calibration: &CalibrationTable,
    as_of: DateTime<FixedOffset>,
    spec: WindowSpec,
) -> (Result<Window, WindowError>, SensorStats) {
    let mut assembler = WindowAssembler::new(sensor_id, schema, calibration, as_of, spec);
    for partition in partitions {
        if assembler.push(partition) {
            break;
        }
    }
    assembler.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibrate::Affine;
    use crate::fields::Field;
    use crate::reading::{PartitionRef, RawRow};
    use chrono::{NaiveDate, TimeZone};

    #[test]
    fn test_no_partitions_is_missing_source() {
        let (result, stats) = assemble_window(
            "2021",
            Vec::new(),
            &SourceSchema::ramp(),
            &CalibrationTable::new(),
            as_of(),
            spec(),
        );
        assert_eq!(result, Err(WindowError::MissingSource("2021".into())));
        assert_eq!(stats.partitions_read, 0);
    }

    #[test]
    fn test_unparsable_partitions_are_no_readings() {
        let bad = partition(30, vec![raw("garbage", "1")]);
        let (result, stats) = assemble_window(
            "2021",
            vec![bad, partition(29, vec![])],
            &SourceSchema::ramp(),
            &CalibrationTable::new(),
            as_of(),
            spec(),
        );
        assert_eq!(result, Err(WindowError::NoReadings("2021".into())));
        assert_eq!(stats.rows_rejected, 1);
    }

    #[test]
    fn test_overlapping_partitions_are_deduplicated_and_sorted() {
        // newest partition: 10:00..=11:00 every 15 minutes, NO2 = 1
        let newer: Vec<RawRow> = (0..5).map(|i| raw(&at(10, i * 15), "1")).rev().collect();
        // older partition overlaps all five timestamps and adds two earlier ones
        let older: Vec<RawRow> = (0..5)
            .map(|i| raw(&at(10, i * 15), "2"))
            .chain([raw(&at(9, 30), "2"), raw(&at(9, 45), "2")])
            .collect();

        let (result, stats) = assemble_window(
            "2021",
            vec![partition(30, newer), partition(29, older)],
            &SourceSchema::ramp(),
            &CalibrationTable::new(),
            as_of(),
            spec(),
        );
        let window = result.unwrap();

        assert_eq!(window.readings.len(), 7);
        assert!(window.readings.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(stats.duplicate_rows, 5);
        // shared timestamps keep the newest partition's value
        let last = window.readings.last().unwrap();
        assert_eq!(last.values.get(Field::No2), Some(1.0));
        assert_eq!(window.readings[0].values.get(Field::No2), Some(2.0));
    }

    #[test]
    fn test_later_row_wins_inside_one_partition() {
        let rows = vec![raw(&at(10, 0), "1"), raw(&at(10, 0), "5")];
        let (result, _) = assemble_window(
            "2021",
            vec![partition(30, rows)],
            &SourceSchema::ramp(),
            &CalibrationTable::new(),
            as_of(),
            spec(),
        );
        let window = result.unwrap();
        assert_eq!(window.readings.len(), 1);
        assert_eq!(window.readings[0].values.get(Field::No2), Some(5.0));
    }

    #[test]
    fn test_stops_reading_once_covered() {
        // as_of is 2025-06-30 12:00; window + warm-up reaches back to 06-29 09:00
        let newest = partition(30, vec![raw("2025-06-30 00:00:00", "1")]);
        let middle = partition(29, vec![raw("2025-06-29 08:00:00", "1")]);
        let oldest = partition(28, vec![raw("2025-06-28 12:00:00", "1")]);

        let (result, stats) = assemble_window(
            "2021",
            vec![newest, middle, oldest],
            &SourceSchema::ramp(),
            &CalibrationTable::new(),
            as_of(),
            spec(),
        );

        assert_eq!(stats.partitions_read, 2);
        let window = result.unwrap();
        assert_eq!(window.readings.len(), 1);
        assert!(window.warmup.is_empty());
    }

    #[test]
    fn test_window_and_warmup_split_at_cutoff() {
        let rows = vec![
            raw("2025-06-29 08:59:00", "1"), // before warm-up
            raw("2025-06-29 09:30:00", "2"), // warm-up
            raw("2025-06-29 12:00:00", "3"), // exactly at cutoff
            raw("2025-06-30 11:00:00", "4"),
            raw("2025-06-30 13:00:00", "5"), // after as_of
        ];
        let (result, stats) = assemble_window(
            "2021",
            vec![partition(30, rows)],
            &SourceSchema::ramp(),
            &CalibrationTable::new(),
            as_of(),
            spec(),
        );
        let window = result.unwrap();

        assert_eq!(window.warmup.len(), 1);
        assert_eq!(window.readings.len(), 2);
        assert_eq!(window.span(), Duration::hours(23));
        assert_eq!(stats.future_rows, 1);
        assert_eq!(window.last_seen.unwrap().to_rfc3339(), "2025-06-30T13:00:00-07:00");
    }

    #[test]
    fn test_stale_partition_yields_empty_window() {
        let rows = vec![raw("2025-06-28 12:00:00", "1")];
        let (result, _) = assemble_window(
            "2021",
            vec![partition(28, rows)],
            &SourceSchema::ramp(),
            &CalibrationTable::new(),
            as_of(),
            spec(),
        );
        let window = result.unwrap();
        assert!(window.is_empty());
        assert!(window.last_seen.is_some());
    }

    #[test]
    fn test_rows_are_calibrated() {
        let table = CalibrationTable::new().with(Field::No2, Affine::new(1.05, 0.0));
        let (result, _) = assemble_window(
            "2021",
            vec![partition(30, vec![raw(&at(10, 0), "20")])],
            &SourceSchema::ramp(),
            &table,
            as_of(),
            spec(),
        );
        let value = result.unwrap().readings[0].values.get(Field::No2).unwrap();
        assert!((value - 21.0).abs() < 1e-9);
    }

    // Helper functions for tests
    fn pdt() -> FixedOffset {
        FixedOffset::west_opt(7 * 3600).unwrap()
    }

    fn as_of() -> DateTime<FixedOffset> {
        pdt().with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap()
    }

    fn spec() -> WindowSpec {
        WindowSpec::new(Duration::hours(24), Duration::hours(3))
    }

    fn at(hour: u32, minute: u32) -> String {
        let (hour, minute) = (hour + minute / 60, minute % 60);
        format!("2025-06-30 {hour:02}:{minute:02}:00")
    }

    fn raw(date: &str, no2: &str) -> RawRow {
        RawRow::new(vec![
            ("DATE".to_string(), date.to_string()),
            ("NO2".to_string(), no2.to_string()),
        ])
    }

    fn partition(day: u32, rows: Vec<RawRow>) -> RawPartition {
        let date = NaiveDate::from_ymd_opt(2025, 6, day).unwrap();
        RawPartition {
            descriptor: PartitionRef::single_day("2021", date, format!("2021_2025-06-{day}.csv")),
            rows,
        }
    }
}
