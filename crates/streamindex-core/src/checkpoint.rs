//! Checkpoint manager: persists the indexer's position for crash recovery.
//!
//! A checkpoint stores the last block whose logs were fully folded into the
//! aggregates. On restart, the index loop resumes from the block after it
//! rather than re-indexing from the deployment block (which would
//! double-count every aggregate).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::IndexerError;

/// A persisted checkpoint for an indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Chain slug (e.g. `"base-sepolia"`).
    pub chain_id: String,
    /// Unique indexer identifier.
    pub indexer_id: String,
    /// Last fully processed block number.
    pub block_number: u64,
    /// Unix timestamp of when this checkpoint was saved.
    pub updated_at: i64,
}

/// Trait for storing and loading checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the latest checkpoint for a given chain + indexer pair.
    async fn load(
        &self,
        chain_id: &str,
        indexer_id: &str,
    ) -> Result<Option<Checkpoint>, IndexerError>;

    /// Save (upsert) a checkpoint.
    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError>;

    /// Delete a checkpoint (e.g. when resetting an indexer).
    async fn delete(&self, chain_id: &str, indexer_id: &str) -> Result<(), IndexerError>;
}

#[async_trait]
impl<T: CheckpointStore + ?Sized> CheckpointStore for Arc<T> {
    async fn load(
        &self,
        chain_id: &str,
        indexer_id: &str,
    ) -> Result<Option<Checkpoint>, IndexerError> {
        (**self).load(chain_id, indexer_id).await
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError> {
        (**self).save(checkpoint).await
    }

    async fn delete(&self, chain_id: &str, indexer_id: &str) -> Result<(), IndexerError> {
        (**self).delete(chain_id, indexer_id).await
    }
}

/// Manages checkpoint reads/writes for an indexer.
pub struct CheckpointManager {
    store: Box<dyn CheckpointStore>,
    chain_id: String,
    indexer_id: String,
    /// How often to save (every N blocks).
    save_interval: u64,
    /// Blocks processed since last save.
    counter: u64,
}

impl CheckpointManager {
    pub fn new(
        store: Box<dyn CheckpointStore>,
        chain_id: impl Into<String>,
        indexer_id: impl Into<String>,
        save_interval: u64,
    ) -> Self {
        Self {
            store,
            chain_id: chain_id.into(),
            indexer_id: indexer_id.into(),
            save_interval: save_interval.max(1),
            counter: 0,
        }
    }

    /// Load the saved checkpoint (returns `None` if none exists).
    pub async fn load(&self) -> Result<Option<Checkpoint>, IndexerError> {
        self.store.load(&self.chain_id, &self.indexer_id).await
    }

    /// The first block to process: the one after the checkpoint, or
    /// `from_block` when there is no checkpoint yet.
    pub async fn resume_block(&self, from_block: u64) -> Result<u64, IndexerError> {
        Ok(match self.load().await? {
            Some(cp) => (cp.block_number + 1).max(from_block),
            None => from_block,
        })
    }

    /// Record that `blocks` more blocks were processed, up to and including
    /// `block_number`, saving once every `save_interval` blocks.
    pub async fn maybe_save(&mut self, block_number: u64, blocks: u64) -> Result<(), IndexerError> {
        self.counter += blocks;
        if self.counter >= self.save_interval {
            self.force_save(block_number).await?;
            self.counter = 0;
        }
        Ok(())
    }

    /// Immediately save a checkpoint (used on shutdown and at the end of
    /// a bounded backfill).
    pub async fn force_save(&self, block_number: u64) -> Result<(), IndexerError> {
        let cp = Checkpoint {
            chain_id: self.chain_id.clone(),
            indexer_id: self.indexer_id.clone(),
            block_number,
            updated_at: chrono::Utc::now().timestamp(),
        };
        self.store.save(cp).await?;
        tracing::debug!(block = block_number, indexer = %self.indexer_id, "checkpoint saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MapStore(Mutex<HashMap<(String, String), Checkpoint>>);

    #[async_trait]
    impl CheckpointStore for MapStore {
        async fn load(
            &self,
            chain_id: &str,
            indexer_id: &str,
        ) -> Result<Option<Checkpoint>, IndexerError> {
            let key = (chain_id.to_string(), indexer_id.to_string());
            Ok(self.0.lock().unwrap().get(&key).cloned())
        }

        async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError> {
            let key = (checkpoint.chain_id.clone(), checkpoint.indexer_id.clone());
            self.0.lock().unwrap().insert(key, checkpoint);
            Ok(())
        }

        async fn delete(&self, chain_id: &str, indexer_id: &str) -> Result<(), IndexerError> {
            let key = (chain_id.to_string(), indexer_id.to_string());
            self.0.lock().unwrap().remove(&key);
            Ok(())
        }
    }

    #[tokio::test]
    async fn force_save_then_load() {
        let store = Box::new(MapStore::default());
        let mgr = CheckpointManager::new(store, "base-sepolia", "stream-payment", 10);

        assert!(mgr.load().await.unwrap().is_none());

        mgr.force_save(1000).await.unwrap();

        let cp = mgr.load().await.unwrap().unwrap();
        assert_eq!(cp.block_number, 1000);
        assert_eq!(cp.chain_id, "base-sepolia");
    }

    #[tokio::test]
    async fn checkpoint_save_interval() {
        let store = Box::new(MapStore::default());
        let mut mgr = CheckpointManager::new(store, "base-sepolia", "idx", 5);

        for i in 1..=4 {
            mgr.maybe_save(i, 1).await.unwrap();
        }
        assert!(mgr.load().await.unwrap().is_none());

        mgr.maybe_save(5, 1).await.unwrap();
        let cp = mgr.load().await.unwrap().unwrap();
        assert_eq!(cp.block_number, 5);
    }

    #[tokio::test]
    async fn resume_block_follows_checkpoint() {
        let store = Box::new(MapStore::default());
        let mgr = CheckpointManager::new(store, "base-sepolia", "idx", 1);
        assert_eq!(mgr.resume_block(500).await.unwrap(), 500);

        mgr.force_save(749).await.unwrap();
        assert_eq!(mgr.resume_block(500).await.unwrap(), 750);
    }
}
