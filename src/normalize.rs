//! Schema normalization: raw device-family rows onto canonical fields.

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::fields::{Field, FieldValues};
use crate::parser::{parse_number, parse_timestamp};
use crate::reading::{RawRow, Reading};

/// One raw column name, or several tried in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawNames {
    One(String),
    Many(Vec<String>),
}

impl RawNames {
    pub fn names(&self) -> &[String] {
        match self {
            RawNames::One(name) => std::slice::from_ref(name),
            RawNames::Many(names) => names,
        }
    }

    fn lookup<'a>(&self, row: &'a RawRow) -> Option<&'a str> {
        self.names().iter().find_map(|n| row.get(n))
    }
}

impl From<&str> for RawNames {
    fn from(name: &str) -> Self {
        RawNames::One(name.to_string())
    }
}

impl From<&[&str]> for RawNames {
    fn from(names: &[&str]) -> Self {
        RawNames::Many(names.iter().map(|n| n.to_string()).collect())
    }
}

/// How one device family names its timestamp and fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSchema {
    pub timestamp_field: RawNames,
    pub fields: BTreeMap<Field, RawNames>,
}

impl SourceSchema {
    /// RAMP monitors: canonical upper-case names, dotted PM spellings.
    pub fn ramp() -> Self {
        let fields = [
            (Field::Co, "CO"),
            (Field::No, "NO"),
            (Field::No2, "NO2"),
            (Field::O3, "O3"),
            (Field::Co2, "CO2"),
            (Field::T, "T"),
            (Field::Rh, "RH"),
            (Field::Pm1, "PM1.0"),
            (Field::Pm2_5, "PM2.5"),
            (Field::Pm10, "PM10"),
            (Field::Te, "TE"),
        ]
        .into_iter()
        .map(|(f, n)| (f, RawNames::from(n)))
        .collect();

        Self {
            timestamp_field: "DATE".into(),
            fields,
        }
    }

    /// QuantAQ MODULAIR exports, flat or nested column spellings.
    pub fn quantaq() -> Self {
        let fields: [(Field, &[&str]); 10] = [
            (Field::Co, &["co", "gases.co.we"]),
            (Field::No, &["no", "gases.no.we"]),
            (Field::No2, &["no2", "gases.no2.we"]),
            (Field::O3, &["o3", "gases.o3.we"]),
            (Field::Co2, &["co2", "gases.co2.raw"]),
            (Field::T, &["temp", "met.temp"]),
            (Field::Rh, &["rh", "met.rh"]),
            (Field::Pm1, &["pm1", "opc.pm1"]),
            (Field::Pm2_5, &["pm25", "opc.pm25"]),
            (Field::Pm10, &["pm10", "opc.pm10"]),
        ];

        Self {
            timestamp_field: RawNames::from(&["timestamp", "timestamp_local"][..]),
            fields: fields
                .into_iter()
                .map(|(f, names)| (f, RawNames::from(names)))
                .collect(),
        }
    }

    pub fn preset(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "ramp" => Some(Self::ramp()),
            "quantaq" => Some(Self::quantaq()),
            _ => None,
        }
    }
}

/// Why a row could not be turned into a [`Reading`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowRejection {
    MissingTimestamp,
    BadTimestamp,
}

/// A normalized row plus the fields whose raw value failed to parse.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub reading: Reading,
    pub malformed: Vec<Field>,
}

/// Maps a raw row onto the canonical schema.
///
/// Unknown raw columns are ignored. A field with no raw column, an empty
/// cell or an unparsable value becomes "no value"; only a missing or broken
/// timestamp rejects the row.
pub fn normalize_row(
    row: &RawRow,
    schema: &SourceSchema,
    sensor_id: &str,
    tz: FixedOffset,
) -> Result<Normalized, RowRejection> {
    let raw_ts = schema
        .timestamp_field
        .lookup(row)
        .ok_or(RowRejection::MissingTimestamp)?;
    let timestamp = parse_timestamp(raw_ts, tz).ok_or(RowRejection::BadTimestamp)?;

    let mut values = FieldValues::default();
    let mut malformed = Vec::new();

    for (&field, names) in &schema.fields {
        let Some(raw) = names.lookup(row) else {
            continue;
        };
        let parsed = parse_number(raw);
        if parsed.is_none() && !is_blank(raw) {
            malformed.push(field);
        }
        values.set(field, parsed);
    }

    Ok(Normalized {
        reading: Reading {
            sensor_id: sensor_id.to_string(),
            timestamp,
            values,
        },
        malformed,
    })
}

fn is_blank(raw: &str) -> bool {
    let s = raw.trim();
    s.is_empty() || s.eq_ignore_ascii_case("nan") || s.eq_ignore_ascii_case("null")
}
