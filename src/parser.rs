//! Decoding of raw partition bytes and tolerant value parsing.
//!
//! Two layouts are understood:
//! - headered CSV, as written by the QuantAQ exporter and the calibration step
//! - RAMP key/value lines, where every line reads `KEY,value,KEY,value,...`

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use flate2::read::GzDecoder;
use std::io::Read;

use crate::error::ParseError;
use crate::reading::RawRow;

/// Layout of a decoded partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionFormat {
    Csv,
    KeyValue,
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

/// Decompresses gzip input when it carries the gzip magic bytes.
pub fn maybe_gunzip(bytes: &[u8]) -> Result<Vec<u8>, ParseError> {
    if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut out = Vec::new();
        GzDecoder::new(bytes).read_to_end(&mut out)?;
        Ok(out)
    } else {
        Ok(bytes.to_vec())
    }
}

/// Guesses the layout from the first non-empty line.
///
/// A RAMP line alternates keys and values, so its second cell is numeric or
/// a date, whereas a CSV header row is all names.
pub fn detect_format(text: &str) -> PartitionFormat {
    let Some(first) = text.lines().find(|l| !l.trim().is_empty()) else {
        return PartitionFormat::Csv;
    };
    let mut cells: Vec<&str> = first.split(',').map(str::trim).collect();
    while cells.last().is_some_and(|c| c.is_empty()) {
        cells.pop();
    }
    let second_is_value = cells
        .get(1)
        .is_some_and(|c| parse_number(c).is_some() || c.starts_with(|ch: char| ch.is_ascii_digit()));
    if cells.len() >= 4 && second_is_value {
        PartitionFormat::KeyValue
    } else {
        PartitionFormat::Csv
    }
}

/// Decodes raw partition bytes (optionally gzipped) into rows.
///
/// # Errors
///
/// Returns an error if the gzip stream is corrupt, the CSV is structurally
/// broken, or a CSV partition has no header. Invalid UTF-8 is replaced, so
/// only the cells containing it fail to parse.
pub fn parse_partition(bytes: &[u8]) -> Result<Vec<RawRow>, ParseError> {
    let bytes = maybe_gunzip(bytes)?;
    let text = String::from_utf8_lossy(&bytes);
    let text = text.trim_start_matches('\u{feff}');

    match detect_format(text) {
        PartitionFormat::Csv => parse_csv(text),
        PartitionFormat::KeyValue => Ok(parse_key_value(text)),
    }
}

fn parse_csv(text: &str) -> Result<Vec<RawRow>, ParseError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    if headers.iter().all(String::is_empty) {
        return Err(ParseError::MissingHeader);
    }

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let columns = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect();
        rows.push(RawRow::new(columns));
    }
    Ok(rows)
}

fn parse_key_value(text: &str) -> Vec<RawRow> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            let cells: Vec<&str> = line.split(',').map(str::trim).collect();
            let columns = cells
                .chunks_exact(2)
                .map(|pair| (pair[0].to_string(), pair[1].to_string()))
                .collect();
            RawRow::new(columns)
        })
        .collect()
}

/// Parses a raw numeric cell. Blank, textual nulls and non-finite numbers
/// are "no value".
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    match s.to_ascii_lowercase().as_str() {
        "nan" | "null" | "none" | "na" | "n/a" | "-" => return None,
        _ => {}
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parses a raw timestamp into the civil zone `tz`.
///
/// Zoned inputs are converted; naive inputs are taken to already be civil
/// time. Bare integers are read as Unix seconds.
pub fn parse_timestamp(raw: &str, tz: FixedOffset) -> Option<DateTime<FixedOffset>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&tz));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&tz));
        }
    }
    if let Some(stripped) = s.strip_suffix(" UTC").or_else(|| s.strip_suffix('Z')) {
        if let Some(naive) = parse_naive(stripped) {
            return Some(Utc.from_utc_datetime(&naive).with_timezone(&tz));
        }
    }
    if let Some(naive) = parse_naive(s) {
        return tz.from_local_datetime(&naive).single();
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        let secs: i64 = s.parse().ok()?;
        return DateTime::from_timestamp(secs, 0).map(|dt| dt.with_timezone(&tz));
    }
    None
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}
