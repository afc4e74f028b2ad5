use super::partitioner::Partitioner;
use super::types::{Record, RecordKey, now_ms};

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Sharded in-memory record table with logical expiry.
///
/// Writes are upserts keyed by `(partition_key, sort_key)`; concurrent writes
/// to the same key resolve last-write-wins because each `put` replaces the
/// whole row under the shard's entry lock.
pub struct RecordStore {
    name: String,
    local_data: Arc<DashMap<u32, DashMap<RecordKey, Record>>>,
    partitioner: Partitioner,
}

impl RecordStore {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_partitioner(name, Partitioner::default())
    }

    pub fn with_partitioner(name: impl Into<String>, partitioner: Partitioner) -> Self {
        Self {
            name: name.into(),
            local_data: Arc::new(DashMap::new()),
            partitioner,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inserts or overwrites the record at its composite key.
    pub fn put(&self, record: Record) {
        let key = record.key();
        let partition = self.partitioner.get_partition(&key);
        let partition_map = self.local_data.entry(partition).or_default();

        tracing::trace!(store = %self.name, %key, partition, "put record");
        partition_map.insert(key, record);
    }

    /// Returns the record unless it is missing or already expired.
    pub fn get(&self, partition_key: &str, sort_key: &str) -> Option<Record> {
        self.get_at(partition_key, sort_key, now_ms())
    }

    pub fn get_at(&self, partition_key: &str, sort_key: &str, now_ms: u64) -> Option<Record> {
        let key = RecordKey::new(partition_key, sort_key);
        let partition = self.partitioner.get_partition(&key);

        if let Some(partition_map) = self.local_data.get(&partition)
            && let Some(record) = partition_map.get(&key)
            && !record.is_expired_at(now_ms)
        {
            return Some(record.clone());
        }

        None
    }

    /// Physically removes every expired row. Returns the number removed.
    pub fn reclaim_expired(&self) -> usize {
        self.reclaim_expired_at(now_ms())
    }

    pub fn reclaim_expired_at(&self, now_ms: u64) -> usize {
        let mut removed = 0;
        for partition in self.local_data.iter() {
            let before = partition.value().len();
            partition
                .value()
                .retain(|_, record| !record.is_expired_at(now_ms));
            removed += before - partition.value().len();
        }

        if removed > 0 {
            tracing::debug!(store = %self.name, removed, "reclaimed expired records");
        }
        removed
    }

    /// Number of rows that are still live.
    pub fn len(&self) -> usize {
        let now = now_ms();
        self.local_data
            .iter()
            .map(|partition| {
                partition
                    .value()
                    .iter()
                    .filter(|entry| !entry.value().is_expired_at(now))
                    .count()
            })
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of rows physically held, expired or not.
    pub fn physical_len(&self) -> usize {
        self.local_data
            .iter()
            .map(|partition| partition.value().len())
            .sum()
    }

    /// Spawns the background reclaimer. It stops when `shutdown` flips to `true`.
    pub fn spawn_reclaimer(
        self: Arc<Self>,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        self.reclaim_expired();
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::debug!(store = %self.name, "reclaimer stopped");
        })
    }
}
