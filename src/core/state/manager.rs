//! Checkpoint manager
//!
//! Thin wrapper over a [`CheckpointStore`] that logs what each task finds
//! when it starts. Loader writes go through the destination transaction, not
//! through this type.

use crate::adapters::database::traits::CheckpointStore;
use crate::core::state::checkpoint::Checkpoint;
use crate::domain::Result;
use std::sync::Arc;

/// Reads and writes partition checkpoints
#[derive(Clone)]
pub struct CheckpointManager {
    /// Checkpoint storage backend
    store: Arc<dyn CheckpointStore + Send + Sync>,
}

impl CheckpointManager {
    /// Create a new CheckpointManager with a storage backend
    ///
    /// # Arguments
    ///
    /// * `store` - Checkpoint store implementation
    pub fn new_with_store(store: Arc<dyn CheckpointStore + Send + Sync>) -> Self {
        Self { store }
    }

    /// Load the checkpoint of a table partition
    ///
    /// # Arguments
    ///
    /// * `table_name` - Destination table, schema-qualified
    /// * `partition` - Partition name
    ///
    /// # Returns
    ///
    /// Returns `Ok(Some(Checkpoint))` if found, `Ok(None)` if the partition has
    /// never committed a batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read. A failed read is never
    /// treated as missing progress.
    pub async fn load(&self, table_name: &str, partition: &str) -> Result<Option<Checkpoint>> {
        let checkpoint = self.store.get(table_name, partition).await?;
        match &checkpoint {
            Some(cp) => tracing::info!(
                table = table_name,
                partition = partition,
                last_ts = %cp.last_ts,
                last_id = cp.last_id,
                historical = cp.is_historical(),
                "Checkpoint found"
            ),
            None => tracing::info!(
                table = table_name,
                partition = partition,
                "No checkpoint found, loading from the beginning"
            ),
        }
        Ok(checkpoint)
    }

    /// Save a checkpoint outside of a batch commit
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.store.put(checkpoint).await
    }

    /// Every stored checkpoint, ordered by table then partition
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn list(&self) -> Result<Vec<Checkpoint>> {
        let mut checkpoints = self.store.list().await?;
        checkpoints.sort_by(|a, b| {
            a.table_name
                .cmp(&b.table_name)
                .then_with(|| a.batch_partition.cmp(&b.batch_partition))
        });
        Ok(checkpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use chrono::Utc;

    #[tokio::test]
    async fn test_load_absent_and_saved() {
        let manager = CheckpointManager::new_with_store(Arc::new(MemoryStore::new()));
        assert!(manager.load("idr.claim", "pac").await.unwrap().is_none());

        let now = Utc::now();
        manager
            .save(&Checkpoint::new("idr.claim", "pac", now, now))
            .await
            .unwrap();
        manager
            .save(&Checkpoint::new("idr.beneficiary", "idr.beneficiary", now, now))
            .await
            .unwrap();

        assert!(manager.load("idr.claim", "pac").await.unwrap().is_some());
        let listed: Vec<_> = manager
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.table_name)
            .collect();
        assert_eq!(listed, vec!["idr.beneficiary", "idr.claim"]);
    }

    #[tokio::test]
    async fn test_store_failure_is_not_absence() {
        let store = MemoryStore::new();
        store.fail_checkpoint_reads("connection refused").await;
        let manager = CheckpointManager::new_with_store(Arc::new(store));
        assert!(manager.load("idr.claim", "pac").await.is_err());
    }
}
