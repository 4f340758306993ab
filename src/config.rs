//! Run configuration.
//!
//! Stored as a JSON document on disk:
//! ```json
//! {
//!   "timezone": "-07:00",
//!   "window_hours": 24,
//!   "sources": {
//!     "ramp": { "preset": "ramp", "calibration": { "CO": { "scale": 1.1 } } }
//!   },
//!   "sensors": [ { "id": "2021", "source": "ramp", "name": "Memorial Library" } ]
//! }
//! ```

use chrono::{Duration, FixedOffset};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::aqhi::{AqhiCalculator, Coefficients};
use crate::calibrate::CalibrationTable;
use crate::error::ConfigError;
use crate::fields::Field;
use crate::normalize::{RawNames, SourceSchema};
use crate::window::WindowSpec;

fn default_timezone() -> String {
    "-07:00".to_string()
}

fn default_window_hours() -> f64 {
    24.0
}

fn default_rolling_hours() -> f64 {
    3.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_window_hours")]
    pub window_hours: f64,
    #[serde(default = "default_rolling_hours")]
    pub rolling_hours: f64,
    #[serde(default)]
    pub coefficients: Coefficients,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
    /// Source used for sensors discovered on disk but not listed below.
    #[serde(default)]
    pub default_source: Option<String>,
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
}

/// One device family: its raw schema and calibration.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub timestamp_field: Option<RawNames>,
    #[serde(default)]
    pub fields: BTreeMap<Field, RawNames>,
    /// Required, but may be empty for an identity correction.
    #[serde(default)]
    pub calibration: Option<CalibrationTable>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SensorConfig {
    pub id: String,
    pub source: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub sensor_number: Option<String>,
}

impl SensorConfig {
    pub fn new(id: &str, source: &str) -> Self {
        Self {
            id: id.to_string(),
            source: source.to_string(),
            name: None,
            lat: None,
            lon: None,
            sensor_number: None,
        }
    }
}

/// A validated source ready for the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceProfile {
    pub name: String,
    pub schema: SourceSchema,
    pub calibration: CalibrationTable,
}

/// Validated settings derived from a [`Config`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub tz: FixedOffset,
    pub window: WindowSpec,
    pub aqhi: AqhiCalculator,
    pub sources: BTreeMap<String, Arc<SourceProfile>>,
    pub default_source: Option<String>,
    pub sensors: Vec<SensorConfig>,
}

impl Settings {
    pub fn source(&self, name: &str) -> Option<Arc<SourceProfile>> {
        self.sources.get(name).cloned()
    }
}

impl Config {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Checks everything a run depends on and resolves presets.
    ///
    /// # Errors
    ///
    /// Any [`ConfigError`]; all of them mean the deployment is broken.
    pub fn validate(self) -> Result<Settings, ConfigError> {
        let tz = parse_offset(&self.timezone)?;
        let window = hours(self.window_hours, "window_hours")?;
        let rolling = hours(self.rolling_hours, "rolling_hours")?;

        for (name, value) in [
            ("coefficients.no2", self.coefficients.no2),
            ("coefficients.o3", self.coefficients.o3),
            ("coefficients.pm2_5", self.coefficients.pm2_5),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::NonPositive { name, value });
            }
        }

        if self.sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        let mut sources = BTreeMap::new();
        for (name, source) in self.sources {
            let profile = resolve_source(&name, source)?;
            sources.insert(name, Arc::new(profile));
        }

        for sensor in &self.sensors {
            if !sources.contains_key(&sensor.source) {
                return Err(ConfigError::UnknownSource {
                    sensor: sensor.id.clone(),
                    source_name: sensor.source.clone(),
                });
            }
        }
        if let Some(default) = &self.default_source {
            if !sources.contains_key(default) {
                return Err(ConfigError::UnknownSource {
                    sensor: "*".to_string(),
                    source_name: default.clone(),
                });
            }
        }

        Ok(Settings {
            tz,
            window: WindowSpec::new(window, rolling),
            aqhi: AqhiCalculator::new(self.coefficients, rolling),
            sources,
            default_source: self.default_source,
            sensors: self.sensors,
        })
    }
}

fn resolve_source(name: &str, source: SourceConfig) -> Result<SourceProfile, ConfigError> {
    let mut schema = match &source.preset {
        Some(preset) => SourceSchema::preset(preset)
            .ok_or_else(|| ConfigError::UnknownPreset(name.to_string(), preset.clone()))?,
        None => SourceSchema {
            timestamp_field: RawNames::Many(Vec::new()),
            fields: BTreeMap::new(),
        },
    };

    if let Some(ts) = source.timestamp_field {
        schema.timestamp_field = ts;
    }
    schema.fields.extend(source.fields);

    if schema.timestamp_field.names().is_empty() {
        return Err(ConfigError::MissingTimestampField(name.to_string()));
    }
    if schema.fields.is_empty() {
        return Err(ConfigError::EmptyFieldMap(name.to_string()));
    }

    let calibration = source
        .calibration
        .ok_or_else(|| ConfigError::MissingCalibration(name.to_string()))?;
    if let Some((field, _)) = calibration.iter().find(|(_, a)| !a.is_finite()) {
        return Err(ConfigError::InvalidCalibration {
            source_name: name.to_string(),
            field: field.to_string(),
        });
    }

    Ok(SourceProfile {
        name: name.to_string(),
        schema,
        calibration,
    })
}

fn hours(value: f64, name: &'static str) -> Result<Duration, ConfigError> {
    if !(value.is_finite() && value > 0.0) {
        return Err(ConfigError::NonPositive { name, value });
    }
    Ok(Duration::milliseconds((value * 3_600_000.0).round() as i64))
}

/// Parses `"-07:00"`, `"+0530"`, `"+05"` or `"UTC"` into a fixed offset.
pub fn parse_offset(raw: &str) -> Result<FixedOffset, ConfigError> {
    let invalid = || ConfigError::InvalidTimezone(raw.to_string());
    let s = raw.trim();
    if s.eq_ignore_ascii_case("utc") || s == "Z" {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }

    let (sign, rest) = match s.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => return Err(invalid()),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let (h, m) = match digits.len() {
        2 => (&digits[..2], "0"),
        4 => (&digits[..2], &digits[2..]),
        _ => return Err(invalid()),
    };
    let h: i32 = h.parse().map_err(|_| invalid())?;
    let m: i32 = m.parse().map_err(|_| invalid())?;
    if h > 23 || m > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (h * 3600 + m * 60)).ok_or_else(invalid)
}
