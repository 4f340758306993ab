//! Reduction of an annotated window into the per-sensor output shape.
//!
//! Every numeric value is rounded to its field's precision, and absent
//! values serialize as `null`, never `0` or `NaN`.

use chrono::{DateTime, FixedOffset};
use serde::{Serialize, Serializer};

use crate::aqhi::{AqhiRecord, AqhiSeries, Category, Pollutant, category};
use crate::fields::{Field, round_to};
use crate::window::Window;

const AQHI_PRECISION: u32 = 2;
const ROLLING_PRECISION: u32 = 3;

/// Renders an instant in its civil zone with minute precision,
/// e.g. `2025-06-30T14:05-07:00`.
pub fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.format("%Y-%m-%dT%H:%M%:z").to_string()
}

/// Why a sensor does or does not have a current reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStatus {
    /// Recent data with an index.
    Ok,
    /// Recent data, but NO2, O3 or PM2.5 is absent from the whole window.
    AqhiUnavailable,
    /// The sensor has gone silent: nothing inside the window.
    Stale,
    /// Partitions exist but none yielded a usable row.
    NoReadings,
    /// No partitions at all.
    MissingSource,
    /// The partition source failed for this sensor.
    SourceError,
}

impl SensorStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SensorStatus::Ok => "ok",
            SensorStatus::AqhiUnavailable => "aqhi_unavailable",
            SensorStatus::Stale => "stale",
            SensorStatus::NoReadings => "no_readings",
            SensorStatus::MissingSource => "missing_source",
            SensorStatus::SourceError => "source_error",
        }
    }
}

/// One AQHI record, rounded and ready for serialization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryRow {
    pub timestamp: String,
    pub aqhi: Option<f64>,
    pub primary: Option<Pollutant>,
    pub rolling_no2: Option<f64>,
    pub rolling_o3: Option<f64>,
    pub rolling_pm25: Option<f64>,
    pub co: Option<f64>,
    pub no: Option<f64>,
    pub no2: Option<f64>,
    pub o3: Option<f64>,
    pub co2: Option<f64>,
    pub t: Option<f64>,
    pub rh: Option<f64>,
    pub pm1: Option<f64>,
    pub pm25: Option<f64>,
    pub pm10: Option<f64>,
    pub te: Option<f64>,
}

impl HistoryRow {
    pub fn from_record(record: &AqhiRecord) -> Self {
        let values = &record.reading.values;
        let field = |f: Field| round_to(values.get(f), f.precision());

        Self {
            timestamp: format_timestamp(&record.reading.timestamp),
            aqhi: round_to(record.aqhi, AQHI_PRECISION),
            primary: record.dominant,
            rolling_no2: round_to(record.rolling_no2, ROLLING_PRECISION),
            rolling_o3: round_to(record.rolling_o3, ROLLING_PRECISION),
            rolling_pm25: round_to(record.rolling_pm2_5, ROLLING_PRECISION),
            co: field(Field::Co),
            no: field(Field::No),
            no2: field(Field::No2),
            o3: field(Field::O3),
            co2: field(Field::Co2),
            t: field(Field::T),
            rh: field(Field::Rh),
            pm1: field(Field::Pm1),
            pm25: field(Field::Pm2_5),
            pm10: field(Field::Pm10),
            te: field(Field::Te),
        }
    }

    /// Rounded concentration of `pollutant` in this row.
    pub fn concentration(&self, pollutant: Pollutant) -> Option<f64> {
        match pollutant {
            Pollutant::No2 => self.no2,
            Pollutant::O3 => self.o3,
            Pollutant::Pm2_5 => self.pm25,
        }
    }
}

/// The newest record plus its health-risk band.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestRecord {
    #[serde(flatten)]
    pub row: HistoryRow,
    pub category: Option<Category>,
}

/// `latest` is either a record or the explicit `"no data"` sentinel.
#[derive(Debug, Clone, PartialEq)]
pub enum Latest {
    NoData,
    Record(Box<LatestRecord>),
}

impl Latest {
    pub fn record(&self) -> Option<&LatestRecord> {
        match self {
            Latest::NoData => None,
            Latest::Record(r) => Some(r),
        }
    }
}

impl Serialize for Latest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Latest::NoData => serializer.serialize_str("no data"),
            Latest::Record(record) => record.serialize(serializer),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSnapshot {
    #[serde(skip)]
    pub sensor_id: String,
    pub status: SensorStatus,
    pub last_seen: Option<String>,
    pub latest: Latest,
    pub history: Vec<HistoryRow>,
}

impl SensorSnapshot {
    /// A snapshot carrying only a "no data" marker.
    pub fn no_data(sensor_id: &str, status: SensorStatus) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            status,
            last_seen: None,
            latest: Latest::NoData,
            history: Vec::new(),
        }
    }

    pub fn build(window: &Window, series: &AqhiSeries) -> Self {
        let cutoff = window.start;
        let last_seen = window.last_seen.as_ref().map(format_timestamp);

        let newest = series.records.last();
        let is_fresh = newest.is_some_and(|r| r.reading.timestamp >= cutoff);

        let Some(newest) = newest.filter(|_| is_fresh) else {
            return Self {
                sensor_id: window.sensor_id.clone(),
                status: SensorStatus::Stale,
                last_seen,
                latest: Latest::NoData,
                history: Vec::new(),
            };
        };

        let status = if series.is_computed() {
            SensorStatus::Ok
        } else {
            SensorStatus::AqhiUnavailable
        };

        let history: Vec<HistoryRow> = series.records.iter().map(HistoryRow::from_record).collect();
        let latest = LatestRecord {
            row: HistoryRow::from_record(newest),
            category: newest.aqhi.map(category),
        };

        Self {
            sensor_id: window.sensor_id.clone(),
            status,
            last_seen,
            latest: Latest::Record(Box::new(latest)),
            history,
        }
    }
}
