//! Sensor metadata sheet (`id,name,lat,lon,sensor_number`).
//!
//! The sheet is maintained by hand in a spreadsheet, so every cell is
//! cleaned before use: whitespace, stray quotes and BOMs are removed, and a
//! trailing `.0` on ids (numbers saved as floats) is stripped.

use anyhow::{Context, Result};
use csv::{ReaderBuilder, Trim};
use std::collections::BTreeMap;
use std::io::Read;
use tracing::{debug, warn};

use crate::config::SensorConfig;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorMetadata {
    pub id: String,
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub sensor_number: Option<String>,
}

/// Metadata rows keyed by cleaned sensor id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataTable {
    rows: BTreeMap<String, SensorMetadata>,
}

fn clean(cell: &str) -> String {
    cell.replace(['"', '\u{feff}'], "").trim().to_string()
}

fn clean_id(cell: &str) -> String {
    let id = clean(cell);
    match id.strip_suffix(".0") {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => id,
    }
}

fn non_empty(cell: String) -> Option<String> {
    if cell.is_empty() { None } else { Some(cell) }
}

impl MetadataTable {
    pub fn load(path: &str) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open metadata file '{path}'"))?;
        Self::from_reader(file).with_context(|| format!("failed to read metadata file '{path}'"))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .flexible(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = rdr
            .headers()?
            .iter()
            .map(|h| clean(h).to_ascii_lowercase())
            .collect();
        let column = |name: &str| headers.iter().position(|h| h == name);
        let id_col = column("id").context("metadata has no 'id' column")?;
        let name_col = column("name");
        let lat_col = column("lat");
        let lon_col = column("lon");
        let number_col = column("sensor_number");

        let mut rows = BTreeMap::new();
        for (line, record) in rdr.records().enumerate() {
            let record = record?;
            let cell = |col: Option<usize>| col.and_then(|c| record.get(c)).map(clean);
            let coord = |col: Option<usize>| cell(col).and_then(|v| v.parse::<f64>().ok());

            let id = clean_id(record.get(id_col).unwrap_or_default());
            if id.is_empty() {
                warn!(line = line + 2, "Metadata row without id skipped");
                continue;
            }
            if rows.contains_key(&id) {
                debug!(id = %id, "Duplicate metadata id, keeping first");
                continue;
            }

            let row = SensorMetadata {
                id: id.clone(),
                name: cell(name_col).and_then(non_empty),
                lat: coord(lat_col),
                lon: coord(lon_col),
                sensor_number: cell(number_col).and_then(non_empty),
            };
            rows.insert(id, row);
        }

        Ok(Self { rows })
    }

    pub fn get(&self, id: &str) -> Option<&SensorMetadata> {
        self.rows.get(id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Overrides the sensor's display fields with whatever the sheet has.
    pub fn apply(&self, sensor: &mut SensorConfig) {
        let Some(meta) = self.get(&sensor.id) else {
            return;
        };
        if meta.name.is_some() {
            sensor.name = meta.name.clone();
        }
        if meta.lat.is_some() {
            sensor.lat = meta.lat;
        }
        if meta.lon.is_some() {
            sensor.lon = meta.lon;
        }
        if meta.sensor_number.is_some() {
            sensor.sensor_number = meta.sensor_number.clone();
        }
    }
}
