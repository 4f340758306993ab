//! Error types shared across the engine.
//!
//! Only [`ConfigError`] is fatal for a run. Everything a single sensor can
//! hit is folded into a [`crate::snapshot::SensorStatus`] by the pipeline.

use thiserror::Error;

/// Deployment errors: the run cannot proceed without a usable configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("config defines no sources")]
    NoSources,

    #[error("source '{0}' has an empty field map")]
    EmptyFieldMap(String),

    #[error("source '{0}' names no timestamp field")]
    MissingTimestampField(String),

    #[error("source '{0}' has an unknown preset '{1}'")]
    UnknownPreset(String, String),

    #[error("source '{0}' has no calibration table")]
    MissingCalibration(String),

    #[error("sensor '{sensor}' refers to unknown source '{source_name}'")]
    UnknownSource { sensor: String, source_name: String },

    #[error("invalid timezone offset '{0}', expected e.g. \"-07:00\"")]
    InvalidTimezone(String),

    #[error("calibration for {field} in source '{source_name}' is not finite")]
    InvalidCalibration { source_name: String, field: String },

    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },
}

/// Conditions raised while assembling a sensor's window.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("no partitions available for sensor '{0}'")]
    MissingSource(String),

    #[error("partitions for sensor '{0}' contain no usable readings")]
    NoReadings(String),
}

/// Failures decoding a whole raw partition.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("gzip error: {0}")]
    Gzip(#[from] std::io::Error),

    #[error("partition has no header row")]
    MissingHeader,
}
