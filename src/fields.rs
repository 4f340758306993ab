//! Canonical pollutant and meteorological fields.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A canonical field name, independent of any device family's raw naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Field {
    #[serde(rename = "CO")]
    Co,
    #[serde(rename = "NO")]
    No,
    #[serde(rename = "NO2")]
    No2,
    #[serde(rename = "O3")]
    O3,
    #[serde(rename = "CO2")]
    Co2,
    #[serde(rename = "T")]
    T,
    #[serde(rename = "RH")]
    Rh,
    #[serde(rename = "PM1", alias = "PM1.0")]
    Pm1,
    #[serde(rename = "PM2_5", alias = "PM2.5")]
    Pm2_5,
    #[serde(rename = "PM10")]
    Pm10,
    #[serde(rename = "TE")]
    Te,
}

impl Field {
    pub const COUNT: usize = 11;

    pub const ALL: [Field; Field::COUNT] = [
        Field::Co,
        Field::No,
        Field::No2,
        Field::O3,
        Field::Co2,
        Field::T,
        Field::Rh,
        Field::Pm1,
        Field::Pm2_5,
        Field::Pm10,
        Field::Te,
    ];

    /// Fields that must be present for the AQHI to be computed.
    pub const AQHI_INPUTS: [Field; 3] = [Field::No2, Field::O3, Field::Pm2_5];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Field::Co => "CO",
            Field::No => "NO",
            Field::No2 => "NO2",
            Field::O3 => "O3",
            Field::Co2 => "CO2",
            Field::T => "T",
            Field::Rh => "RH",
            Field::Pm1 => "PM1",
            Field::Pm2_5 => "PM2_5",
            Field::Pm10 => "PM10",
            Field::Te => "TE",
        }
    }

    /// Decimal places used when rendering this field in snapshot output.
    pub fn precision(self) -> u32 {
        match self {
            Field::Co | Field::No | Field::No2 | Field::O3 => 3,
            Field::Co2 | Field::T | Field::Rh | Field::Te => 1,
            Field::Pm1 | Field::Pm2_5 | Field::Pm10 => 2,
        }
    }

    /// Parses a canonical name, tolerating the dotted PM spellings.
    pub fn parse(name: &str) -> Option<Field> {
        let upper = name.trim().to_ascii_uppercase();
        match upper.as_str() {
            "PM1.0" => Some(Field::Pm1),
            "PM2.5" | "PM25" => Some(Field::Pm2_5),
            other => Field::ALL.into_iter().find(|f| f.name() == other),
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One value slot per canonical field. `None` is an explicit "no value".
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FieldValues([Option<f64>; Field::COUNT]);

impl FieldValues {
    pub fn get(&self, field: Field) -> Option<f64> {
        self.0[field.index()]
    }

    pub fn set(&mut self, field: Field, value: Option<f64>) {
        self.0[field.index()] = value;
    }

    pub fn with(mut self, field: Field, value: f64) -> Self {
        self.set(field, Some(value));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (Field, Option<f64>)> + '_ {
        Field::ALL.into_iter().map(|f| (f, self.get(f)))
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}

/// Rounds to `digits` decimal places, keeping absence and dropping NaN.
pub fn round_to(value: Option<f64>, digits: u32) -> Option<f64> {
    let v = value.filter(|v| v.is_finite())?;
    let factor = 10f64.powi(digits as i32);
    Some((v * factor).round() / factor)
}
