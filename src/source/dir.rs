use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use regex::{Captures, Regex};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use super::PartitionSource;
use crate::parser::parse_partition;
use crate::reading::{PartitionRef, RawPartition, sort_newest_first};

// <id>_<anything>_YYYY_MM_DD_to_YYYY_MM_DD.csv (calibrated exports)
static RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<id>[^_]+)_.*?(?P<y1>\d{4})[-_](?P<m1>\d{2})[-_](?P<d1>\d{2})_to_(?P<y2>\d{4})[-_](?P<m2>\d{2})[-_](?P<d2>\d{2})\.csv(?:\.gz)?$",
    )
    .expect("valid regex")
});

// <id>_YYYY-MM-DD-HH_YYYY-MM-DD-HH.csv (RAMP hourly pulls)
static HOURLY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<id>[^_]+)_(?P<y1>\d{4})-(?P<m1>\d{2})-(?P<d1>\d{2})-\d{2}_(?P<y2>\d{4})-(?P<m2>\d{2})-(?P<d2>\d{2})-\d{2}\.csv(?:\.gz)?$",
    )
    .expect("valid regex")
});

// <id>_YYYY-MM-DD.csv (RAMP daily)
static ID_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<id>[^_]+)_(?P<y>\d{4})-(?P<m>\d{2})-(?P<d>\d{2})\.csv(?:\.gz)?$")
        .expect("valid regex")
});

// YYYY-MM-DD-<id>.csv (QuantAQ daily)
static DATE_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<y>\d{4})-(?P<m>\d{2})-(?P<d>\d{2})-(?P<id>.+?)\.csv(?:\.gz)?$")
        .expect("valid regex")
});

fn date_from(caps: &Captures, y: &str, m: &str, d: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(
        caps[y].parse().ok()?,
        caps[m].parse().ok()?,
        caps[d].parse().ok()?,
    )
}

/// Extracts `(sensor_id, start, end)` from a partition file name.
pub fn parse_partition_name(file_name: &str) -> Option<(String, NaiveDate, NaiveDate)> {
    for re in [&*RANGE_RE, &*HOURLY_RE] {
        if let Some(caps) = re.captures(file_name) {
            let start = date_from(&caps, "y1", "m1", "d1")?;
            let end = date_from(&caps, "y2", "m2", "d2")?;
            return Some((caps["id"].to_string(), start, end));
        }
    }
    for re in [&*ID_DATE_RE, &*DATE_ID_RE] {
        if let Some(caps) = re.captures(file_name) {
            let date = date_from(&caps, "y", "m", "d")?;
            return Some((caps["id"].to_string(), date, date));
        }
    }
    None
}

/// Partition files found recursively under a root directory.
///
/// The tree is walked once, on a blocking thread, the first time it is
/// needed; later calls reuse that index for the rest of the run.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
    index: OnceCell<Vec<PartitionRef>>,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index: OnceCell::new(),
        }
    }

    /// Every recognizable partition under the root, read from disk now.
    pub fn scan(&self) -> Result<Vec<PartitionRef>> {
        scan_dir(&self.root)
    }

    async fn index(&self) -> Result<&[PartitionRef]> {
        let refs = self
            .index
            .get_or_try_init(|| async {
                let root = self.root.clone();
                let refs = tokio::task::spawn_blocking(move || scan_dir(&root))
                    .await
                    .context("directory scan task failed")??;
                debug!(root = %self.root.display(), partitions = refs.len(), "Partition index built");
                Ok::<_, anyhow::Error>(refs)
            })
            .await?;
        Ok(refs)
    }
}

fn scan_dir(root: &Path) -> Result<Vec<PartitionRef>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = fs::read_dir(&dir)
            .with_context(|| format!("failed to read directory '{}'", dir.display()))?;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path);
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            match parse_partition_name(name) {
                Some((sensor_id, start, end)) => found.push(PartitionRef {
                    sensor_id,
                    start,
                    end,
                    location: path,
                }),
                None => debug!(path = %path.display(), "Skipping unrecognized file"),
            }
        }
    }

    Ok(found)
}

#[async_trait]
impl PartitionSource for DirSource {
    async fn sensor_ids(&self) -> Result<Vec<String>> {
        let ids: BTreeSet<String> = self.index().await?.iter().map(|r| r.sensor_id.clone()).collect();
        Ok(ids.into_iter().collect())
    }

    async fn list(&self, sensor_id: &str) -> Result<Vec<PartitionRef>> {
        let mut refs: Vec<PartitionRef> = self
            .index()
            .await?
            .iter()
            .filter(|r| r.sensor_id == sensor_id)
            .cloned()
            .collect();
        sort_newest_first(&mut refs);
        Ok(refs)
    }

    async fn load(&self, partition: &PartitionRef) -> Result<RawPartition> {
        let bytes = tokio::fs::read(&partition.location)
            .await
            .with_context(|| format!("failed to read '{}'", partition.location.display()))?;

        let rows = match parse_partition(&bytes) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(
                    path = %partition.location.display(),
                    error = %e,
                    "Partition could not be decoded, treating as empty"
                );
                Vec::new()
            }
        };

        Ok(RawPartition {
            descriptor: partition.clone(),
            rows,
        })
    }
}
