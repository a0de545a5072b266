//! In-memory storage backend.
//!
//! Keeps the aggregate tables, one record table per event kind, anomalies
//! and checkpoints in RAM. Useful for tests, replays, and short-lived
//! indexers that don't need persistence.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use streamindex_core::checkpoint::{Checkpoint, CheckpointStore};
use streamindex_core::entity::{AnomalyRecord, Creator, EventRecord, Stream};
use streamindex_core::error::IndexerError;
use streamindex_core::event::EventKind;
use streamindex_core::store::{AggregateStore, Commit, ReadStore};
use streamindex_core::types::EventId;

/// In-memory indexer storage.
///
/// All data is lost when the process exits.
#[derive(Default)]
pub struct InMemoryStore {
    creators: Mutex<HashMap<Address, Creator>>,
    streams: Mutex<HashMap<U256, Stream>>,
    records: Mutex<HashMap<EventKind, HashMap<EventId, EventRecord>>>,
    anomalies: Mutex<Vec<AnomalyRecord>>,
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, IndexerError> {
    m.lock()
        .map_err(|_| IndexerError::Storage("in-memory store poisoned".into()))
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All creators, ordered by address.
    pub fn creators(&self) -> Result<Vec<Creator>, IndexerError> {
        let mut out: Vec<_> = lock(&self.creators)?.values().cloned().collect();
        out.sort_by_key(|c| c.address);
        Ok(out)
    }

    /// All streams, ordered by stream id.
    pub fn streams(&self) -> Result<Vec<Stream>, IndexerError> {
        let mut out: Vec<_> = lock(&self.streams)?.values().cloned().collect();
        out.sort_by_key(|s| s.stream_id);
        Ok(out)
    }

    /// Number of immutable records of one kind.
    pub fn record_count(&self, kind: EventKind) -> Result<usize, IndexerError> {
        Ok(lock(&self.records)?.get(&kind).map_or(0, HashMap::len))
    }

    /// Number of immutable records across all kinds.
    pub fn total_record_count(&self) -> Result<usize, IndexerError> {
        Ok(lock(&self.records)?.values().map(HashMap::len).sum())
    }
}

#[async_trait]
impl AggregateStore for InMemoryStore {
    async fn load_creator(&self, address: &Address) -> Result<Option<Creator>, IndexerError> {
        Ok(lock(&self.creators)?.get(address).cloned())
    }

    async fn save_creator(&self, creator: &Creator) -> Result<(), IndexerError> {
        lock(&self.creators)?.insert(creator.address, creator.clone());
        Ok(())
    }

    async fn load_stream(&self, stream_id: U256) -> Result<Option<Stream>, IndexerError> {
        Ok(lock(&self.streams)?.get(&stream_id).cloned())
    }

    async fn commit(&self, commit: &Commit) -> Result<(), IndexerError> {
        let record = &commit.record;
        let kind = record
            .kind()
            .ok_or_else(|| IndexerError::Storage(format!("record {} has no kind", record.id)))?;

        // Take every table before touching any, so a commit lands whole.
        let mut creators = lock(&self.creators)?;
        let mut streams = lock(&self.streams)?;
        let mut records = lock(&self.records)?;
        let mut anomalies = lock(&self.anomalies)?;

        if let Some(creator) = &commit.creator {
            creators.insert(creator.address, creator.clone());
        }
        if let Some(stream) = &commit.stream {
            streams.insert(stream.stream_id, stream.clone());
        }
        records.entry(kind).or_default().insert(record.id, record.clone());
        if let Some(anomaly) = &commit.anomaly {
            anomalies.push(anomaly.clone());
        }
        Ok(())
    }
}

#[async_trait]
impl ReadStore for InMemoryStore {
    async fn streams_by_receiver(&self, creator: &Address) -> Result<Vec<Stream>, IndexerError> {
        Ok(lock(&self.streams)?
            .values()
            .filter(|s| s.receiver == *creator)
            .cloned()
            .collect())
    }

    async fn records_of_kind(&self, kind: EventKind) -> Result<Vec<EventRecord>, IndexerError> {
        let mut out: Vec<_> = lock(&self.records)?
            .get(&kind)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default();
        out.sort_by_key(|r| r.meta.position());
        Ok(out)
    }

    async fn anomalies(&self) -> Result<Vec<AnomalyRecord>, IndexerError> {
        Ok(lock(&self.anomalies)?.clone())
    }
}

#[async_trait]
impl CheckpointStore for InMemoryStore {
    async fn load(
        &self,
        chain_id: &str,
        indexer_id: &str,
    ) -> Result<Option<Checkpoint>, IndexerError> {
        let key = format!("{chain_id}:{indexer_id}");
        Ok(lock(&self.checkpoints)?.get(&key).cloned())
    }

    async fn save(&self, checkpoint: Checkpoint) -> Result<(), IndexerError> {
        let key = format!("{}:{}", checkpoint.chain_id, checkpoint.indexer_id);
        lock(&self.checkpoints)?.insert(key, checkpoint);
        Ok(())
    }

    async fn delete(&self, chain_id: &str, indexer_id: &str) -> Result<(), IndexerError> {
        let key = format!("{chain_id}:{indexer_id}");
        lock(&self.checkpoints)?.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;
    use streamindex_core::event::{ContractEvent, PauseToggle};
    use streamindex_core::types::EventMeta;

    fn paused_record(block: u64, log: u32) -> EventRecord {
        let meta = EventMeta {
            block_number: block,
            block_timestamp: block * 2,
            tx_hash: B256::repeat_byte(block as u8),
            log_index: log,
        };
        EventRecord {
            id: meta.id(),
            meta,
            event: ContractEvent::Paused(PauseToggle {
                admin: Address::repeat_byte(0x01),
            }),
        }
    }

    fn record_only(record: EventRecord) -> Commit {
        Commit {
            creator: None,
            stream: None,
            record,
            anomaly: None,
        }
    }

    #[tokio::test]
    async fn records_upsert_by_id() {
        let store = InMemoryStore::new();
        for (block, log) in [(10, 0), (10, 0), (9, 3)] {
            store.commit(&record_only(paused_record(block, log))).await.unwrap();
        }

        assert_eq!(store.record_count(EventKind::Paused).unwrap(), 2);
        assert_eq!(store.record_count(EventKind::Unpaused).unwrap(), 0);

        let rows = store.records_of_kind(EventKind::Paused).await.unwrap();
        assert_eq!(rows[0].meta.block_number, 9);
        assert_eq!(rows[1].meta.block_number, 10);
    }

    #[tokio::test]
    async fn streams_by_receiver_filters() {
        let store = InMemoryStore::new();
        let mut creator = Creator::new(Address::repeat_byte(0xbb));
        creator.total_stream_count = 3;
        store.save_creator(&creator).await.unwrap();

        let loaded = store.load_creator(&creator.address).await.unwrap().unwrap();
        assert_eq!(loaded.total_stream_count, 3);
        assert!(store
            .streams_by_receiver(&Address::repeat_byte(0xbb))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn checkpoint_roundtrip() {
        let store = InMemoryStore::new();
        let cp = Checkpoint {
            chain_id: "base-sepolia".into(),
            indexer_id: "test".into(),
            block_number: 1000,
            updated_at: 0,
        };
        store.save(cp).await.unwrap();
        let loaded = store.load("base-sepolia", "test").await.unwrap().unwrap();
        assert_eq!(loaded.block_number, 1000);

        store.delete("base-sepolia", "test").await.unwrap();
        assert!(store.load("base-sepolia", "test").await.unwrap().is_none());
    }
}
