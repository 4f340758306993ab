//! AQHI computation over an assembled window.
//!
//! Trailing 3-hour means of NO2, O3 and PM2.5 feed an exponential-risk
//! composite; the pollutant with the largest risk term is reported as the
//! dominant contributor. Rows whose means are not all available get no
//! index at all rather than a partial one.

pub mod category;
pub mod index;
pub mod rolling;

use chrono::Duration;
use tracing::debug;

use crate::fields::Field;
use crate::reading::CalibratedReading;
use crate::window::Window;

pub use category::{Category, category};
pub use index::{AqhiValue, Coefficients, Pollutant, TrailingMeans};

/// A calibrated reading annotated with its trailing means and index.
#[derive(Debug, Clone, PartialEq)]
pub struct AqhiRecord {
    pub reading: CalibratedReading,
    pub rolling_no2: Option<f64>,
    pub rolling_o3: Option<f64>,
    pub rolling_pm2_5: Option<f64>,
    pub aqhi: Option<f64>,
    pub dominant: Option<Pollutant>,
}

impl AqhiRecord {
    fn bare(reading: CalibratedReading) -> Self {
        Self {
            reading,
            rolling_no2: None,
            rolling_o3: None,
            rolling_pm2_5: None,
            aqhi: None,
            dominant: None,
        }
    }
}

/// Records for the reported part of a window.
#[derive(Debug, Clone, PartialEq)]
pub struct AqhiSeries {
    pub records: Vec<AqhiRecord>,
    /// Inputs with no value anywhere in the window; non-empty means the
    /// index was not computed for this sensor.
    pub missing_inputs: Vec<Field>,
}

impl AqhiSeries {
    pub fn is_computed(&self) -> bool {
        self.missing_inputs.is_empty()
    }

    pub fn computed_rows(&self) -> usize {
        self.records.iter().filter(|r| r.aqhi.is_some()).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AqhiCalculator {
    pub coefficients: Coefficients,
    pub span: Duration,
}

impl Default for AqhiCalculator {
    fn default() -> Self {
        Self {
            coefficients: Coefficients::default(),
            span: Duration::hours(3),
        }
    }
}

impl AqhiCalculator {
    pub fn new(coefficients: Coefficients, span: Duration) -> Self {
        Self { coefficients, span }
    }

    /// Annotates every reading of the window. Warm-up readings contribute to
    /// the trailing means but are not returned.
    pub fn annotate(&self, window: &Window) -> AqhiSeries {
        let series: Vec<&CalibratedReading> =
            window.warmup.iter().chain(window.readings.iter()).collect();
        let skip = window.warmup.len();

        let missing_inputs: Vec<Field> = Field::AQHI_INPUTS
            .into_iter()
            .filter(|f| series.iter().all(|r| r.values.get(*f).is_none()))
            .collect();

        if !missing_inputs.is_empty() {
            debug!(
                sensor_id = %window.sensor_id,
                missing = ?missing_inputs,
                "AQHI inputs absent from window, index not computed"
            );
            return AqhiSeries {
                records: window.readings.iter().cloned().map(AqhiRecord::bare).collect(),
                missing_inputs,
            };
        }

        let timestamps: Vec<_> = series.iter().map(|r| r.timestamp).collect();
        let means_of = |field: Field| {
            let values: Vec<Option<f64>> = series.iter().map(|r| r.values.get(field)).collect();
            rolling::trailing_means(&timestamps, &values, self.span)
        };
        let no2 = means_of(Field::No2);
        let o3 = means_of(Field::O3);
        let pm2_5 = means_of(Field::Pm2_5);

        let records = window
            .readings
            .iter()
            .enumerate()
            .map(|(i, reading)| {
                let at = skip + i;
                let value = match (no2[at], o3[at], pm2_5[at]) {
                    (Some(no2), Some(o3), Some(pm2_5)) => Some(index::compute(
                        &TrailingMeans { no2, o3, pm2_5 },
                        &self.coefficients,
                    )),
                    _ => None,
                };
                AqhiRecord {
                    reading: reading.clone(),
                    rolling_no2: no2[at],
                    rolling_o3: o3[at],
                    rolling_pm2_5: pm2_5[at],
                    aqhi: value.map(|v| v.aqhi),
                    dominant: value.map(|v| v.dominant),
                }
            })
            .collect();

        AqhiSeries {
            records,
            missing_inputs,
        }
    }
}
