//! Compact summary for lamppost kiosk displays.
//!
//! | Field                     | Source                                       |
//! |---------------------------|----------------------------------------------|
//! | `name`                    | Metadata name, falling back to the sensor id |
//! | `label`                   | Health-risk band, or `"no data"`             |
//! | `value`                   | AQHI rounded to an integer                   |
//! | `top_contributor`         | Dominant pollutant                           |
//! | `pollutant_concentration` | Latest concentration of that pollutant       |
//! | `aq_advisory`             | Active air-quality advisory for the site     |

use serde::Serialize;
use std::collections::BTreeMap;

use crate::aqhi::Pollutant;
use crate::fields::round_to;
use crate::pipeline::SensorReport;

const NO_DATA_LABEL: &str = "no data";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KioskEntry {
    pub name: String,
    pub label: String,
    pub value: Option<i64>,
    pub top_contributor: Option<Pollutant>,
    pub pollutant_concentration: Option<f64>,
    /// Advisories are not ingested yet, so this is always `false`.
    pub aq_advisory: bool,
}

impl KioskEntry {
    pub fn from_report(report: &SensorReport) -> Self {
        let name = report
            .sensor
            .name
            .clone()
            .unwrap_or_else(|| report.sensor.id.clone());

        let latest = report.snapshot.latest.record();
        let aqhi = latest.and_then(|l| l.row.aqhi);
        let primary = latest.and_then(|l| l.row.primary);
        let concentration = latest
            .zip(primary)
            .and_then(|(l, p)| l.row.concentration(p));

        Self {
            name,
            label: latest
                .and_then(|l| l.category)
                .map_or(NO_DATA_LABEL, |c| c.label())
                .to_string(),
            value: aqhi.map(|v| v.round() as i64),
            top_contributor: primary,
            pollutant_concentration: round_to(concentration, 2),
            aq_advisory: false,
        }
    }
}

/// Kiosk entries keyed by sensor number, falling back to the sensor id.
/// When two sensors share a key the later one wins.
pub fn build(reports: &[SensorReport]) -> BTreeMap<String, KioskEntry> {
    reports
        .iter()
        .map(|report| {
            let key = report
                .sensor
                .sensor_number
                .clone()
                .unwrap_or_else(|| report.sensor.id.clone());
            (key, KioskEntry::from_report(report))
        })
        .collect()
}
