//! Storage traits for aggregates and event records, plus the accessor
//! operations handlers use on top of them.
//!
//! Implementations live in `streamindex-storage` (`InMemoryStore`,
//! `SqliteStore`). The store is threaded explicitly through dispatch; there
//! is no global state.

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use std::sync::Arc;

use crate::entity::{AnomalyRecord, Creator, EventRecord, Stream};
use crate::error::IndexerError;
use crate::event::EventKind;

/// Every write one dispatched log produces.
///
/// Handlers compute the new aggregates first and hand them to
/// [`AggregateStore::commit`] together with the record, so a failed write
/// leaves the store exactly as it was before the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub creator: Option<Creator>,
    pub stream: Option<Stream>,
    pub record: EventRecord,
    pub anomaly: Option<AnomalyRecord>,
}

/// Write side: keyed aggregate tables plus the immutable record tables.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Look up a creator by address.
    async fn load_creator(&self, address: &Address) -> Result<Option<Creator>, IndexerError>;

    /// Insert or replace a creator.
    async fn save_creator(&self, creator: &Creator) -> Result<(), IndexerError>;

    /// Look up a stream by id.
    async fn load_stream(&self, stream_id: U256) -> Result<Option<Stream>, IndexerError>;

    /// Persist a [`Commit`] atomically: either every row lands or none does.
    ///
    /// Aggregates are upserted by key. The record is keyed by
    /// `(tx_hash, log_index)`, so a redelivered log overwrites its own row
    /// with identical data.
    async fn commit(&self, commit: &Commit) -> Result<(), IndexerError>;
}

/// Read side used by [`crate::query`].
#[async_trait]
pub trait ReadStore: AggregateStore {
    /// All streams whose receiver is `creator`, in no particular order.
    async fn streams_by_receiver(&self, creator: &Address) -> Result<Vec<Stream>, IndexerError>;

    /// All records of one kind, in canonical chain order.
    async fn records_of_kind(&self, kind: EventKind) -> Result<Vec<EventRecord>, IndexerError>;

    /// All recorded anomalies, in the order they were raised.
    async fn anomalies(&self) -> Result<Vec<AnomalyRecord>, IndexerError>;
}

#[async_trait]
impl<T: AggregateStore + ?Sized> AggregateStore for Arc<T> {
    async fn load_creator(&self, address: &Address) -> Result<Option<Creator>, IndexerError> {
        (**self).load_creator(address).await
    }

    async fn save_creator(&self, creator: &Creator) -> Result<(), IndexerError> {
        (**self).save_creator(creator).await
    }

    async fn load_stream(&self, stream_id: U256) -> Result<Option<Stream>, IndexerError> {
        (**self).load_stream(stream_id).await
    }

    async fn commit(&self, commit: &Commit) -> Result<(), IndexerError> {
        (**self).commit(commit).await
    }
}

#[async_trait]
impl<T: ReadStore + ?Sized> ReadStore for Arc<T> {
    async fn streams_by_receiver(&self, creator: &Address) -> Result<Vec<Stream>, IndexerError> {
        (**self).streams_by_receiver(creator).await
    }

    async fn records_of_kind(&self, kind: EventKind) -> Result<Vec<EventRecord>, IndexerError> {
        (**self).records_of_kind(kind).await
    }

    async fn anomalies(&self) -> Result<Vec<AnomalyRecord>, IndexerError> {
        (**self).anomalies().await
    }
}

/// Return the creator at `address`, creating and persisting a zeroed one on
/// a miss. Repeated calls with no intervening writes return the same value.
///
/// The zeroed row carries no counts, so it is safe to leave behind if the
/// handler's commit later fails.
pub async fn get_or_create_creator<S>(store: &S, address: Address) -> Result<Creator, IndexerError>
where
    S: AggregateStore + ?Sized,
{
    if let Some(creator) = store.load_creator(&address).await? {
        return Ok(creator);
    }
    let creator = Creator::new(address);
    store.save_creator(&creator).await?;
    tracing::debug!(creator = %address, "creator created");
    Ok(creator)
}

/// Pure lookup; never creates.
pub async fn get_stream<S>(store: &S, stream_id: U256) -> Result<Option<Stream>, IndexerError>
where
    S: AggregateStore + ?Sized,
{
    store.load_stream(stream_id).await
}
