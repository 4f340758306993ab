use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::collections::BTreeMap;

use super::PartitionSource;
use crate::reading::{PartitionRef, RawPartition, sort_newest_first};

/// Partitions held in memory, keyed by sensor id.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    partitions: BTreeMap<String, Vec<RawPartition>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, partition: RawPartition) {
        self.partitions
            .entry(partition.descriptor.sensor_id.clone())
            .or_default()
            .push(partition);
    }

    pub fn with(mut self, partition: RawPartition) -> Self {
        self.insert(partition);
        self
    }
}

#[async_trait]
impl PartitionSource for MemorySource {
    async fn sensor_ids(&self) -> Result<Vec<String>> {
        Ok(self.partitions.keys().cloned().collect())
    }

    async fn list(&self, sensor_id: &str) -> Result<Vec<PartitionRef>> {
        let mut refs: Vec<PartitionRef> = self
            .partitions
            .get(sensor_id)
            .map(|parts| parts.iter().map(|p| p.descriptor.clone()).collect())
            .unwrap_or_default();
        sort_newest_first(&mut refs);
        Ok(refs)
    }

    async fn load(&self, partition: &PartitionRef) -> Result<RawPartition> {
        self.partitions
            .get(&partition.sensor_id)
            .and_then(|parts| parts.iter().find(|p| p.descriptor == *partition))
            .cloned()
            .ok_or_else(|| anyhow!("partition '{}' not found", partition.location.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn test_list_is_newest_first_and_load_round_trips() {
        let d = |day| NaiveDate::from_ymd_opt(2025, 6, day).unwrap();
        let source = MemorySource::new()
            .with(empty("2021", d(29), "old"))
            .with(empty("2021", d(30), "new"))
            .with(empty("2022", d(30), "other"));

        let refs = source.list("2021").await.unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].end, d(30));

        let loaded = source.load(&refs[1]).await.unwrap();
        assert_eq!(loaded.descriptor.location.to_str(), Some("old"));

        assert!(source.list("9999").await.unwrap().is_empty());
        assert_eq!(source.sensor_ids().await.unwrap(), vec!["2021", "2022"]);
    }

    fn empty(sensor: &str, date: NaiveDate, location: &str) -> RawPartition {
        RawPartition {
            descriptor: PartitionRef::single_day(sensor, date, location),
            rows: vec![],
        }
    }
}
