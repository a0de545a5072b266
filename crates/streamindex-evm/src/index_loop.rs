//! The main index loop: orchestrates backfill and live phases.
//!
//! # Phase 1: BACKFILL
//! Fetch blocks from the resume point to `head - confirmation_depth` in
//! batches. For each batch: fetch logs → stamp timestamps → decode → sort
//! into canonical order → fold into the aggregates → checkpoint.
//!
//! # Phase 2: LIVE
//! Poll for newly confirmed blocks every `poll_interval_ms` and run the same
//! pipeline over them, until `to_block` (if set) is reached.
//!
//! Reorgs are not handled: only confirmed blocks are read, and logs flagged
//! `removed` are dropped.

use std::collections::HashMap;
use std::time::Duration;

use streamindex_core::checkpoint::{CheckpointManager, CheckpointStore};
use streamindex_core::error::IndexerError;
use streamindex_core::event::LoggedEvent;
use streamindex_core::indexer::{IndexerConfig, IndexerState, IndexerStats, StreamIndexer};
use streamindex_core::ordering::OrderedEvents;
use streamindex_core::store::AggregateStore;
use streamindex_core::types::EventFilter;

use crate::decoder::EvmDecoder;
use crate::fetcher::{EvmFetcher, EvmRpcClient, RawLog};

/// Block timestamps kept around for stamping logs; older entries are dropped.
const TIMESTAMP_CACHE_LIMIT: usize = 4096;

/// The core index loop implementation.
pub struct IndexLoop<C: EvmRpcClient, S: AggregateStore> {
    config: IndexerConfig,
    fetcher: EvmFetcher<C>,
    decoder: EvmDecoder,
    filter: EventFilter,
    indexer: StreamIndexer<S>,
    checkpoint: CheckpointManager,
    timestamps: HashMap<u64, u64>,
    state: IndexerState,
}

impl<C: EvmRpcClient, S: AggregateStore> IndexLoop<C, S> {
    pub fn new(
        config: IndexerConfig,
        client: C,
        store: S,
        checkpoints: Box<dyn CheckpointStore>,
    ) -> Result<Self, IndexerError> {
        config.validate()?;
        let decoder = EvmDecoder::new();
        let mut filter = config.filter();
        filter.topic0_values = decoder.topic0_values();
        let checkpoint = CheckpointManager::new(
            checkpoints,
            &config.chain,
            &config.id,
            config.checkpoint_interval,
        );
        Ok(Self {
            fetcher: EvmFetcher::new(client),
            indexer: StreamIndexer::new(store, &config),
            decoder,
            filter,
            checkpoint,
            timestamps: HashMap::new(),
            state: IndexerState::Idle,
            config,
        })
    }

    pub fn state(&self) -> IndexerState {
        self.state
    }

    pub fn stats(&self) -> &IndexerStats {
        self.indexer.stats()
    }

    pub fn store(&self) -> &S {
        self.indexer.store()
    }

    pub fn into_store(self) -> S {
        self.indexer.into_store()
    }

    /// Run the index loop until `to_block` is reached or an error occurs.
    ///
    /// Without a `to_block` this only returns on error.
    pub async fn run(&mut self) -> Result<(), IndexerError> {
        let result = self.run_phases().await;
        if let Err(e) = &result {
            self.state = IndexerState::Error;
            tracing::error!(error = %e, "index loop failed");
        }
        result
    }

    async fn run_phases(&mut self) -> Result<(), IndexerError> {
        let start = self.checkpoint.resume_block(self.config.from_block).await?;
        if start > self.config.from_block {
            tracing::info!(block = start - 1, "Resuming from checkpoint");
        }

        // Phase 1: Backfill
        self.state = IndexerState::Backfilling;
        let target = self.confirmed_head().await?;
        tracing::info!(from = start, target, contract = %self.config.contract, "Starting backfill phase");

        if start <= target {
            self.index_range(start, target).await?;
            self.checkpoint.force_save(target).await?;
        }
        tracing::info!(at = target, stats = ?self.indexer.stats(), "Backfill complete");

        if self.reached_end(target) {
            self.state = IndexerState::Stopped;
            return Ok(());
        }

        // Phase 2: Live
        self.state = IndexerState::Live;
        self.live_loop(target.max(start.saturating_sub(1)) + 1).await
    }

    /// Confirmed head, capped at `to_block`.
    async fn confirmed_head(&self) -> Result<u64, IndexerError> {
        let head = self.fetcher.head_block_number().await?;
        let confirmed = head.saturating_sub(self.config.confirmation_depth);
        Ok(match self.config.to_block {
            Some(to) => confirmed.min(to),
            None => confirmed,
        })
    }

    fn reached_end(&self, block: u64) -> bool {
        self.config.to_block.is_some_and(|to| block >= to)
    }

    async fn live_loop(&mut self, mut next: u64) -> Result<(), IndexerError> {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            tokio::time::sleep(poll_interval).await;

            let confirmed = match self.confirmed_head().await {
                Ok(confirmed) => confirmed,
                Err(e) if e.is_transient() => {
                    tracing::warn!(error = %e, "head poll failed, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if next > confirmed {
                continue; // Nothing new yet
            }

            self.index_range(next, confirmed).await?;
            self.checkpoint.force_save(confirmed).await?;
            tracing::debug!(from = next, to = confirmed, "live blocks indexed");
            next = confirmed + 1;

            if self.reached_end(confirmed) {
                self.state = IndexerState::Stopped;
                return Ok(());
            }
        }
    }

    /// Fetch, decode and fold every log in `[from, to]`, batch by batch.
    async fn index_range(&mut self, from: u64, to: u64) -> Result<(), IndexerError> {
        let batch = self.config.batch_size;
        let mut current = from;

        while current <= to {
            let batch_end = current.saturating_add(batch - 1).min(to);

            let logs = self
                .fetcher
                .logs(current, batch_end, &self.filter, batch)
                .await?;
            let count = logs.len();
            self.ingest(logs).await?;

            self.checkpoint
                .maybe_save(batch_end, batch_end - current + 1)
                .await?;

            tracing::info!(
                current,
                batch_end,
                total = to,
                logs = count,
                "Backfill batch complete"
            );

            if batch_end == u64::MAX {
                break;
            }
            current = batch_end + 1;
        }
        Ok(())
    }

    /// Decode a set of raw logs and fold them in canonical order.
    pub async fn ingest(&mut self, logs: Vec<RawLog>) -> Result<(), IndexerError> {
        let mut events: Vec<LoggedEvent> = Vec::with_capacity(logs.len());
        for log in &logs {
            if log.is_removed() {
                tracing::debug!(tx = %log.tx_hash, log_index = %log.log_index, "dropping removed log");
                continue;
            }
            let timestamp = self.block_timestamp(log).await?;
            events.push(self.decoder.decode(log, timestamp)?);
        }
        self.indexer
            .process_all(OrderedEvents::canonical(events))
            .await?;
        Ok(())
    }

    /// Timestamp of the block containing `log`: from the log itself when the
    /// provider includes it, otherwise from the (cached) block header.
    async fn block_timestamp(&mut self, log: &RawLog) -> Result<u64, IndexerError> {
        if let Some(ts) = log.block_timestamp_u64()? {
            return Ok(ts);
        }
        let number = log.block_number_u64()?;
        if let Some(ts) = self.timestamps.get(&number) {
            return Ok(*ts);
        }
        let block = self
            .fetcher
            .block(number)
            .await?
            .ok_or_else(|| IndexerError::Rpc(format!("block {number} not found")))?;
        if self.timestamps.len() >= TIMESTAMP_CACHE_LIMIT {
            self.timestamps.clear();
        }
        self.timestamps.insert(number, block.timestamp);
        Ok(block.timestamp)
    }
}
