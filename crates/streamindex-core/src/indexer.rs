//! Indexer configuration, runtime state, and the event-folding driver.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::dedupe::Deduplicator;
use crate::error::IndexerError;
use crate::event::LoggedEvent;
use crate::handler::{apply, HandlerOutcome};
use crate::ordering::OrderedEvents;
use crate::store::AggregateStore;
use crate::types::{EventFilter, EventPosition};

/// Configuration for an indexer instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Unique name for this indexer (used for checkpoint keys).
    pub id: String,
    /// Chain to index (e.g. `"base-sepolia"`).
    pub chain: String,
    /// Address of the StreamPayment contract.
    pub contract: Address,
    /// First block to index (the contract's deployment block).
    pub from_block: u64,
    /// Optional end block (for bounded backfill). `None` = run forever.
    pub to_block: Option<u64>,
    /// Number of blocks to wait before considering a block confirmed.
    pub confirmation_depth: u64,
    /// How many blocks to batch-fetch per `eth_getLogs` call.
    pub batch_size: u64,
    /// How often to save a checkpoint (every N blocks).
    pub checkpoint_interval: u64,
    /// Block polling interval in live mode (milliseconds).
    pub poll_interval_ms: u64,
    /// Drop logs whose `(tx_hash, log_index)` was already dispatched.
    pub dedupe_events: bool,
    /// How many recent event ids the dedupe guard remembers.
    pub dedupe_window: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            id: "stream-payment".into(),
            chain: "base-sepolia".into(),
            contract: Address::ZERO,
            from_block: 0,
            to_block: None,
            confirmation_depth: 12,
            batch_size: 1000,
            checkpoint_interval: 100,
            poll_interval_ms: 2000,
            dedupe_events: true,
            dedupe_window: 100_000,
        }
    }
}

impl IndexerConfig {
    /// Reject configurations the index loop cannot run with.
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.batch_size == 0 {
            return Err(IndexerError::Config("batch_size must be at least 1".into()));
        }
        if self.checkpoint_interval == 0 {
            return Err(IndexerError::Config("checkpoint_interval must be at least 1".into()));
        }
        if let Some(to) = self.to_block {
            if to < self.from_block {
                return Err(IndexerError::Config(format!(
                    "to_block {to} is before from_block {}",
                    self.from_block
                )));
            }
        }
        Ok(())
    }

    /// Log filter for the configured contract.
    pub fn filter(&self) -> EventFilter {
        EventFilter::address(self.contract)
    }
}

/// Runtime state of the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexerState {
    /// Not yet started.
    Idle,
    /// Syncing historical blocks up to the current head.
    Backfilling,
    /// Following the chain tip in real-time.
    Live,
    /// Terminated.
    Stopped,
    /// Encountered an unrecoverable error.
    Error,
}

impl std::fmt::Display for IndexerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Backfilling => write!(f, "backfilling"),
            Self::Live => write!(f, "live"),
            Self::Stopped => write!(f, "stopped"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Counters describing what the indexer has done so far.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerStats {
    /// Logs offered to the indexer.
    pub processed: u64,
    /// Immutable records written.
    pub recorded: u64,
    /// Logs skipped because they did not decode to a known event.
    pub skipped_unrecognized: u64,
    /// Logs dropped by the dedupe guard.
    pub duplicates_dropped: u64,
    /// Logs that arrived at or before the last processed position.
    pub out_of_order: u64,
    /// Anomalies raised by handlers.
    pub anomalies: u64,
    /// Position of the most recently dispatched log.
    pub last_position: Option<EventPosition>,
}

/// Folds logged events into an [`AggregateStore`], one at a time.
///
/// Assumes its input honours the ordering contract; it reports but does not
/// repair violations.
pub struct StreamIndexer<S> {
    store: S,
    dedupe: Option<Deduplicator>,
    stats: IndexerStats,
}

impl<S: AggregateStore> StreamIndexer<S> {
    pub fn new(store: S, config: &IndexerConfig) -> Self {
        Self {
            store,
            dedupe: config
                .dedupe_events
                .then(|| Deduplicator::new(config.dedupe_window)),
            stats: IndexerStats::default(),
        }
    }

    /// Process a single event.
    ///
    /// On `Err` the store is unchanged and the event is not marked as seen.
    pub async fn process(&mut self, logged: &LoggedEvent) -> Result<HandlerOutcome, IndexerError> {
        self.stats.processed += 1;
        let id = logged.meta.id();
        let position = logged.meta.position();

        if self.dedupe.as_ref().is_some_and(|d| d.contains(&id)) {
            self.stats.duplicates_dropped += 1;
            tracing::warn!(%id, %position, "duplicate delivery dropped");
            return Ok(HandlerOutcome::default());
        }

        if let Some(last) = self.stats.last_position {
            if position <= last {
                self.stats.out_of_order += 1;
                tracing::warn!(%position, %last, "event delivered out of order");
            }
        }

        // A failed apply wrote nothing, so the id stays unseen and a retry
        // of the same log is dispatched again.
        let outcome = apply(&self.store, logged).await?;
        if let Some(dedupe) = self.dedupe.as_mut() {
            dedupe.admit(id);
        }

        if outcome.is_skipped() {
            self.stats.skipped_unrecognized += 1;
        } else {
            self.stats.recorded += 1;
        }
        if outcome.anomaly.is_some() {
            self.stats.anomalies += 1;
        }
        self.stats.last_position = Some(match self.stats.last_position {
            Some(last) => last.max(position),
            None => position,
        });
        Ok(outcome)
    }

    /// Process a whole sequence in the order given.
    pub async fn process_all(&mut self, events: OrderedEvents) -> Result<&IndexerStats, IndexerError> {
        for logged in events {
            self.process(&logged).await?;
        }
        Ok(&self.stats)
    }

    pub fn stats(&self) -> &IndexerStats {
        &self.stats
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = IndexerConfig::default();
        assert!(cfg.validate().is_ok());
        assert!(cfg.dedupe_events);
        assert_eq!(cfg.confirmation_depth, 12);
    }

    #[test]
    fn rejects_zero_batch_and_inverted_range() {
        let cfg = IndexerConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(IndexerError::Config(_))));

        let cfg = IndexerConfig {
            from_block: 100,
            to_block: Some(50),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let cfg: IndexerConfig = serde_json::from_str(
            r#"{ "chain": "polygon-amoy", "contract": "0xf739b72738a8d99b6955473e2817d558ea1ffe10", "from_block": 5 }"#,
        )
        .unwrap();
        assert_eq!(cfg.chain, "polygon-amoy");
        assert_eq!(cfg.from_block, 5);
        assert_eq!(cfg.batch_size, 1000);
        assert_ne!(cfg.contract, Address::ZERO);
    }

    #[test]
    fn state_display() {
        assert_eq!(IndexerState::Backfilling.to_string(), "backfilling");
    }
}
