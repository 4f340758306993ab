//! Where raw partitions come from.
//!
//! [`PartitionSource`] is the seam between the engine and storage.
//! [`DirSource`] walks a directory tree using the device families' file
//! naming conventions; [`MemorySource`] holds partitions in memory.

mod dir;
mod memory;

pub use dir::{DirSource, parse_partition_name};
pub use memory::MemorySource;

use anyhow::Result;

use crate::reading::{PartitionRef, RawPartition};

/// Lists and loads the raw partitions of each sensor.
#[async_trait::async_trait]
pub trait PartitionSource: Send + Sync {
    /// Every sensor id with at least one partition.
    async fn sensor_ids(&self) -> Result<Vec<String>>;

    /// Partitions for `sensor_id`, newest first. Empty if there are none.
    async fn list(&self, sensor_id: &str) -> Result<Vec<PartitionRef>>;

    /// Reads and decodes one partition.
    async fn load(&self, partition: &PartitionRef) -> Result<RawPartition>;
}
