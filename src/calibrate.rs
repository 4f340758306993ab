//! Per-field affine calibration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::fields::{Field, FieldValues};
use crate::reading::{CalibratedReading, Reading};

/// `value * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Affine {
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub offset: f64,
}

fn default_scale() -> f64 {
    1.0
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        scale: 1.0,
        offset: 0.0,
    };

    pub fn new(scale: f64, offset: f64) -> Self {
        Self { scale, offset }
    }

    /// Absent values stay absent.
    pub fn apply(&self, value: Option<f64>) -> Option<f64> {
        value.map(|v| v * self.scale + self.offset)
    }

    pub fn is_finite(&self) -> bool {
        self.scale.is_finite() && self.offset.is_finite()
    }
}

/// Canonical field to correction. Unlisted fields use [`Affine::IDENTITY`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationTable {
    entries: HashMap<Field, Affine>,
}

impl CalibrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: Field, affine: Affine) -> Self {
        self.entries.insert(field, affine);
        self
    }

    pub fn get(&self, field: Field) -> Affine {
        self.entries.get(&field).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, Affine)> + '_ {
        self.entries.iter().map(|(f, a)| (*f, *a))
    }

    pub fn apply_values(&self, values: &FieldValues) -> FieldValues {
        let mut out = FieldValues::default();
        for (field, value) in values.iter() {
            out.set(field, self.get(field).apply(value));
        }
        out
    }

    pub fn calibrate(&self, reading: Reading) -> CalibratedReading {
        CalibratedReading {
            values: self.apply_values(&reading.values),
            sensor_id: reading.sensor_id,
            timestamp: reading.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    #[test]
    fn test_identity_table_leaves_values_untouched() {
        let values = FieldValues::default()
            .with(Field::Co, 0.123456789)
            .with(Field::Pm2_5, -4.0)
            .with(Field::T, f64::MAX);
        let table = CalibrationTable::new().with(Field::Co, Affine::IDENTITY);

        assert_eq!(table.apply_values(&values), values);
    }

    #[test]
    fn test_absent_value_is_never_materialized() {
        let table = CalibrationTable::new().with(Field::No2, Affine::new(2.0, 5.0));
        let out = table.apply_values(&FieldValues::default());
        assert_eq!(out.get(Field::No2), None);
    }

    #[test]
    fn test_scale_and_offset_applied_per_field() {
        let table = CalibrationTable::new()
            .with(Field::Co, Affine::new(1.1, 0.0))
            .with(Field::T, Affine::new(1.0, 0.5));
        let values = FieldValues::default()
            .with(Field::Co, 10.0)
            .with(Field::T, 20.0)
            .with(Field::Rh, 40.0);

        let out = table.apply_values(&values);

        assert!((out.get(Field::Co).unwrap() - 11.0).abs() < 1e-9);
        assert_eq!(out.get(Field::T), Some(20.5));
        assert_eq!(out.get(Field::Rh), Some(40.0));
    }

    #[test]
    fn test_calibrate_keeps_identity_of_reading() {
        let ts = FixedOffset::west_opt(7 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 6, 30, 12, 0, 0)
            .unwrap();
        let reading = Reading {
            sensor_id: "2021".into(),
            timestamp: ts,
            values: FieldValues::default().with(Field::O3, 10.0),
        };
        let table = CalibrationTable::new().with(Field::O3, Affine::new(1.2, 0.0));

        let out = table.calibrate(reading);

        assert_eq!(out.sensor_id, "2021");
        assert_eq!(out.timestamp, ts);
        assert!((out.values.get(Field::O3).unwrap() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn test_deserialize_defaults_missing_parts() {
        let table: CalibrationTable =
            serde_json::from_str(r#"{"CO": {"scale": 1.1}, "T": {"offset": 0.5}}"#).unwrap();
        assert_eq!(table.get(Field::Co), Affine::new(1.1, 0.0));
        assert_eq!(table.get(Field::T), Affine::new(1.0, 0.5));
        assert_eq!(table.get(Field::Rh), Affine::IDENTITY);
    }
}
