use common::storage::ContentHash;

/// A named, key-partitioned stream.
///
/// Keys map to partitions by SHA-256, so the mapping is identical across
/// processes and restarts as long as `partitions` does not change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    name: String,
    partitions: u16,
}

impl Topic {
    pub fn new(name: impl Into<String>, partitions: u16) -> Self {
        Self {
            name: name.into(),
            partitions: partitions.max(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partitions(&self) -> u16 {
        self.partitions
    }

    pub fn partition_for(&self, key: Option<&str>) -> u16 {
        match key {
            Some(key) => {
                (ContentHash::compute(key.as_bytes()).prefix_u64() % self.partitions as u64) as u16
            }
            None => 0,
        }
    }

    /// Backend queue name for one partition.
    pub fn queue_name(&self, partition: u16) -> String {
        queue_name(&self.name, partition)
    }
}

/// Backend queue name for one partition of the topic called `topic`.
pub fn queue_name(topic: &str, partition: u16) -> String {
    format!("{topic}.p{partition}")
}
