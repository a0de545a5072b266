//! End-to-end handler scenarios against the in-memory store.
//!
//! Each test folds a short, hand-built event log through `StreamIndexer`
//! and asserts the resulting `Creator` / `Stream` aggregates, records and
//! anomalies.

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};

use streamindex_core::entity::{Anomaly, Creator, Stream};
use streamindex_core::error::IndexerError;
use streamindex_core::event::{
    ContractEvent, EarningsWithdrawn, EventKind, LoggedEvent, PauseToggle, RateChangeAccepted,
    RateChangeProposed, StreamCreated, StreamExtended, StreamStopped, Unrecognized,
};
use streamindex_core::indexer::{IndexerConfig, StreamIndexer};
use streamindex_core::ordering::OrderedEvents;
use streamindex_core::query;
use streamindex_core::store::{AggregateStore, Commit, ReadStore};
use streamindex_core::types::{EventMeta, Page};
use streamindex_storage::InMemoryStore;

// ─── Helpers ──────────────────────────────────────────────────────────────────

const PAYER: Address = Address::new([0xaa; 20]);
const CREATOR: Address = Address::new([0xbb; 20]);

fn meta(block: u64, log_index: u32) -> EventMeta {
    EventMeta {
        block_number: block,
        block_timestamp: 1_000 + block * 12,
        tx_hash: B256::left_padding_from(&block.to_be_bytes()),
        log_index,
    }
}

fn at(block: u64, log_index: u32, event: ContractEvent) -> LoggedEvent {
    LoggedEvent::new(meta(block, log_index), event)
}

fn created(id: u64, payer: Address, rate: u64, deposit: u64, start: u64) -> ContractEvent {
    ContractEvent::StreamCreated(StreamCreated {
        stream_id: U256::from(id),
        payer,
        receiver: CREATOR,
        rate_per_second: U256::from(rate),
        max_deposit: U256::from(deposit),
        start_time: U256::from(start),
    })
}

fn extended(id: u64, additional: u64, total: u64) -> ContractEvent {
    ContractEvent::StreamExtended(StreamExtended {
        stream_id: U256::from(id),
        additional_deposit: U256::from(additional),
        new_total_deposit: U256::from(total),
    })
}

fn stopped(id: u64, paid: u64, refunded: u64, duration: u64) -> ContractEvent {
    ContractEvent::StreamStopped(StreamStopped {
        stream_id: U256::from(id),
        total_paid: U256::from(paid),
        refunded: U256::from(refunded),
        duration: U256::from(duration),
    })
}

fn rate_accepted(id: u64, old: u64, new: u64) -> ContractEvent {
    ContractEvent::RateChangeAccepted(RateChangeAccepted {
        stream_id: U256::from(id),
        old_rate: U256::from(old),
        new_rate: U256::from(new),
        settled_amount: U256::ZERO,
    })
}

fn withdrawn(amount: u64) -> ContractEvent {
    ContractEvent::EarningsWithdrawn(EarningsWithdrawn {
        creator: CREATOR,
        amount: U256::from(amount),
    })
}

async fn replay(events: Vec<LoggedEvent>) -> StreamIndexer<InMemoryStore> {
    replay_with(events, IndexerConfig::default()).await
}

async fn replay_with(events: Vec<LoggedEvent>, config: IndexerConfig) -> StreamIndexer<InMemoryStore> {
    let mut indexer = StreamIndexer::new(InMemoryStore::new(), &config);
    indexer
        .process_all(OrderedEvents::canonical(events))
        .await
        .unwrap();
    indexer
}

/// In-memory store whose next commit fails once armed.
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryStore,
    armed: AtomicBool,
}

impl FlakyStore {
    fn fail_next_commit(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AggregateStore for FlakyStore {
    async fn load_creator(&self, address: &Address) -> Result<Option<Creator>, IndexerError> {
        self.inner.load_creator(address).await
    }

    async fn save_creator(&self, creator: &Creator) -> Result<(), IndexerError> {
        self.inner.save_creator(creator).await
    }

    async fn load_stream(&self, stream_id: U256) -> Result<Option<Stream>, IndexerError> {
        self.inner.load_stream(stream_id).await
    }

    async fn commit(&self, commit: &Commit) -> Result<(), IndexerError> {
        if self.armed.swap(false, Ordering::SeqCst) {
            return Err(IndexerError::Storage("database is locked".into()));
        }
        self.inner.commit(commit).await
    }
}

fn no_dedupe() -> IndexerConfig {
    IndexerConfig {
        dedupe_events: false,
        ..IndexerConfig::default()
    }
}

// ─── Lifecycle ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_extend_stop_lifecycle() {
    let indexer = replay(vec![
        at(10, 0, created(1, PAYER, 333, 10_000_000, 1_000)),
        at(11, 0, extended(1, 5_000_000, 15_000_000)),
        at(12, 0, stopped(1, 12_000_000, 3_000_000, 3_600)),
    ])
    .await;
    let store = indexer.store();

    let stream = store.load_stream(U256::from(1)).await.unwrap().unwrap();
    assert!(!stream.is_active);
    assert_eq!(stream.deposit, U256::from(15_000_000u64));
    assert_eq!(stream.total_paid, Some(U256::from(12_000_000u64)));
    assert_eq!(stream.refunded, Some(U256::from(3_000_000u64)));
    assert_eq!(stream.duration, Some(U256::from(3_600)));
    assert_eq!(stream.end_time, Some(meta(12, 0).block_timestamp));
    assert_eq!(stream.stopped_at_block, Some(12));
    assert_eq!(stream.created_at_block, 10);

    let creator = store.load_creator(&CREATOR).await.unwrap().unwrap();
    assert_eq!(creator.active_stream_count, 0);
    assert_eq!(creator.total_stream_count, 1);
    assert_eq!(creator.unique_viewers, vec![PAYER]);
    assert_eq!(creator.total_viewers_count, 1);

    assert_eq!(store.total_record_count().unwrap(), 3);
    assert!(store.anomalies().await.unwrap().is_empty());
}

#[tokio::test]
async fn create_initialises_stream_and_creator() {
    let indexer = replay(vec![at(10, 0, created(1, PAYER, 333, 10_000_000, 1_000))]).await;
    let store = indexer.store();

    let stream = store.load_stream(U256::from(1)).await.unwrap().unwrap();
    assert!(stream.is_active);
    assert_eq!(stream.deposit, U256::from(10_000_000u64));
    assert_eq!(stream.rate_per_minute, U256::from(19_980));
    assert_eq!(stream.start_time, U256::from(1_000));
    assert_eq!(stream.end_time, None);

    let creator = store.load_creator(&CREATOR).await.unwrap().unwrap();
    assert_eq!(creator.active_stream_count, 1);
    assert_eq!(creator.total_viewers_count, 1);
    assert_eq!(creator.total_earned, U256::ZERO);
}

#[tokio::test]
async fn extension_overwrites_deposit_with_reported_total() {
    // The contract's running total wins over any local arithmetic.
    let indexer = replay(vec![
        at(10, 0, created(1, PAYER, 333, 10_000_000, 1_000)),
        at(11, 0, extended(1, 5_000_000, 15_000_000)),
        at(12, 0, extended(1, 1, 99)),
    ])
    .await;
    let stream = indexer.store().load_stream(U256::from(1)).await.unwrap().unwrap();
    assert_eq!(stream.deposit, U256::from(99));
}

#[tokio::test]
async fn rate_change_applies_to_stopped_stream() {
    let indexer = replay(vec![
        at(10, 0, created(1, PAYER, 333, 10_000_000, 1_000)),
        at(11, 0, stopped(1, 1_000, 9_999_000, 3)),
        at(12, 0, rate_accepted(1, 333, 500)),
    ])
    .await;
    let stream = indexer.store().load_stream(U256::from(1)).await.unwrap().unwrap();
    assert!(!stream.is_active);
    assert_eq!(stream.rate_per_second, U256::from(500));
    assert_eq!(stream.rate_per_minute, U256::from(30_000));
}

#[tokio::test]
async fn rate_per_minute_tracks_rate_per_second() {
    let indexer = replay(vec![
        at(10, 0, created(1, PAYER, 333, 10_000_000, 1_000)),
        at(11, 0, created(2, PAYER, 0, 10, 1_000)),
        at(12, 0, rate_accepted(1, 333, 1_234)),
    ])
    .await;
    for stream in indexer.store().streams().unwrap() {
        assert_eq!(stream.rate_per_minute, stream.rate_per_second * U256::from(60));
    }
}

#[tokio::test]
async fn proposals_only_write_records() {
    let indexer = replay(vec![
        at(10, 0, created(1, PAYER, 333, 10_000_000, 1_000)),
        at(
            11,
            0,
            ContractEvent::RateChangeProposed(RateChangeProposed {
                stream_id: U256::from(1),
                old_rate: U256::from(333),
                new_rate: U256::from(999),
            }),
        ),
        at(
            12,
            0,
            ContractEvent::Paused(PauseToggle {
                admin: Address::repeat_byte(0x01),
            }),
        ),
    ])
    .await;
    let store = indexer.store();
    let stream = store.load_stream(U256::from(1)).await.unwrap().unwrap();
    assert_eq!(stream.rate_per_second, U256::from(333));
    assert_eq!(store.record_count(EventKind::RateChangeProposed).unwrap(), 1);
    assert_eq!(store.record_count(EventKind::Paused).unwrap(), 1);
}

// ─── Creator aggregates ───────────────────────────────────────────────────────

#[tokio::test]
async fn viewers_are_deduplicated() {
    let other = Address::repeat_byte(0xcc);
    let indexer = replay(vec![
        at(10, 0, created(1, PAYER, 1, 100, 1_000)),
        at(10, 1, created(2, PAYER, 1, 100, 1_000)),
        at(11, 0, created(3, other, 1, 100, 1_000)),
    ])
    .await;
    let creator = indexer.store().load_creator(&CREATOR).await.unwrap().unwrap();
    assert_eq!(creator.total_stream_count, 3);
    assert_eq!(creator.active_stream_count, 3);
    assert_eq!(creator.unique_viewers, vec![PAYER, other]);
    assert_eq!(creator.total_viewers_count, 2);
}

#[tokio::test]
async fn withdrawals_sum_into_total_earned() {
    let indexer = replay(vec![
        at(20, 0, withdrawn(1_000)),
        at(21, 0, withdrawn(2_500)),
        at(21, 1, withdrawn(7)),
    ])
    .await;
    let store = indexer.store();
    let creator = store.load_creator(&CREATOR).await.unwrap().unwrap();
    assert_eq!(creator.total_earned, U256::from(3_507));
    // A withdrawal alone creates the creator with zero streams.
    assert_eq!(creator.total_stream_count, 0);

    let history = query::withdrawal_history(store, CREATOR, Page::default())
        .await
        .unwrap();
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].amount, U256::from(7));
    assert_eq!(history[2].amount, U256::from(1_000));
}

// ─── Anomalies ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn extension_before_creation_is_an_anomaly() {
    // Delivered out of order: the harness hands events through unsorted.
    let mut indexer = StreamIndexer::new(InMemoryStore::new(), &IndexerConfig::default());
    indexer
        .process_all(OrderedEvents::as_delivered(vec![
            at(11, 0, extended(1, 5_000_000, 15_000_000)),
            at(10, 0, created(1, PAYER, 333, 10_000_000, 1_000)),
        ]))
        .await
        .unwrap();

    let stats = indexer.stats();
    assert_eq!(stats.out_of_order, 1);
    assert_eq!(stats.anomalies, 1);

    let store = indexer.store();
    let stream = store.load_stream(U256::from(1)).await.unwrap().unwrap();
    assert_eq!(stream.deposit, U256::from(10_000_000u64));

    let anomalies = store.anomalies().await.unwrap();
    assert_eq!(
        anomalies[0].anomaly,
        Anomaly::MissingStream {
            kind: EventKind::StreamExtended,
            stream_id: U256::from(1),
        }
    );
    // The immutable record is written regardless.
    assert_eq!(store.record_count(EventKind::StreamExtended).unwrap(), 1);
}

#[tokio::test]
async fn second_stop_is_recorded_but_not_applied() {
    let indexer = replay(vec![
        at(10, 0, created(1, PAYER, 333, 10_000_000, 1_000)),
        at(11, 0, stopped(1, 100, 9_999_900, 1)),
        at(12, 0, stopped(1, 555, 0, 99)),
    ])
    .await;
    let store = indexer.store();

    let stream = store.load_stream(U256::from(1)).await.unwrap().unwrap();
    assert_eq!(stream.total_paid, Some(U256::from(100)));
    assert_eq!(stream.stopped_at_block, Some(11));

    let creator = store.load_creator(&CREATOR).await.unwrap().unwrap();
    assert_eq!(creator.active_stream_count, 0);

    let anomalies = store.anomalies().await.unwrap();
    assert_eq!(anomalies.len(), 1);
    assert_eq!(
        anomalies[0].anomaly,
        Anomaly::StreamAlreadyStopped {
            stream_id: U256::from(1)
        }
    );
    assert_eq!(store.record_count(EventKind::StreamStopped).unwrap(), 2);
}

#[tokio::test]
async fn replayed_create_is_recorded_but_not_counted() {
    let create = at(10, 0, created(1, PAYER, 333, 10_000_000, 1_000));
    let mut indexer = StreamIndexer::new(InMemoryStore::new(), &no_dedupe());
    indexer
        .process_all(OrderedEvents::as_delivered(vec![create.clone(), create]))
        .await
        .unwrap();

    let store = indexer.store();
    let creator = store.load_creator(&CREATOR).await.unwrap().unwrap();
    assert_eq!(creator.total_stream_count, 1);
    assert_eq!(creator.active_stream_count, 1);
    assert_eq!(creator.total_viewers_count, 1);

    let anomalies = store.anomalies().await.unwrap();
    assert_eq!(anomalies.len(), 1);
    assert_eq!(
        anomalies[0].anomaly,
        Anomaly::StreamAlreadyExists {
            stream_id: U256::from(1)
        }
    );
    assert_eq!(indexer.stats().anomalies, 1);
    assert_eq!(store.record_count(EventKind::StreamCreated).unwrap(), 1);
}

#[tokio::test]
async fn stop_against_drained_creator_clamps_at_zero() {
    let mut indexer = StreamIndexer::new(InMemoryStore::new(), &IndexerConfig::default());
    indexer
        .process(&at(10, 0, created(1, PAYER, 333, 10_000_000, 1_000)))
        .await
        .unwrap();

    // The creator row drifted: its active count no longer covers stream 1.
    let mut creator = indexer.store().load_creator(&CREATOR).await.unwrap().unwrap();
    creator.active_stream_count = 0;
    indexer.store().save_creator(&creator).await.unwrap();

    let outcome = indexer
        .process(&at(11, 0, stopped(1, 100, 9_999_900, 1)))
        .await
        .unwrap();
    assert_eq!(
        outcome.anomaly,
        Some(Anomaly::ActiveCountUnderflow { creator: CREATOR })
    );

    let store = indexer.store();
    let stream = store.load_stream(U256::from(1)).await.unwrap().unwrap();
    assert!(!stream.is_active);
    assert_eq!(stream.total_paid, Some(U256::from(100)));
    let creator = store.load_creator(&CREATOR).await.unwrap().unwrap();
    assert_eq!(creator.active_stream_count, 0);
    assert_eq!(creator.total_stream_count, 1);
    assert_eq!(store.anomalies().await.unwrap().len(), 1);
}

#[tokio::test]
async fn stop_for_unknown_stream_is_an_anomaly() {
    let indexer = replay(vec![at(12, 0, stopped(42, 1, 1, 1))]).await;
    let store = indexer.store();
    assert!(store.load_stream(U256::from(42)).await.unwrap().is_none());
    assert!(store.load_creator(&CREATOR).await.unwrap().is_none());
    assert_eq!(indexer.stats().anomalies, 1);
}

#[tokio::test]
async fn unrecognized_logs_are_skipped() {
    let indexer = replay(vec![at(
        10,
        0,
        ContractEvent::Unrecognized(Unrecognized {
            topic0: Some(B256::repeat_byte(0x42)),
            reason: "unknown signature".into(),
        }),
    )])
    .await;
    assert_eq!(indexer.stats().skipped_unrecognized, 1);
    assert_eq!(indexer.store().total_record_count().unwrap(), 0);
}

// ─── Redelivery ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_delivery_is_dropped_by_default() {
    let create = at(10, 0, created(1, PAYER, 333, 10_000_000, 1_000));
    let mut indexer = StreamIndexer::new(InMemoryStore::new(), &IndexerConfig::default());
    indexer
        .process_all(OrderedEvents::as_delivered(vec![create.clone(), create]))
        .await
        .unwrap();

    assert_eq!(indexer.stats().duplicates_dropped, 1);
    let creator = indexer.store().load_creator(&CREATOR).await.unwrap().unwrap();
    assert_eq!(creator.total_stream_count, 1);
    assert_eq!(creator.active_stream_count, 1);
}

#[tokio::test]
async fn duplicate_withdrawal_double_counts_without_dedupe() {
    let w = at(20, 0, withdrawn(1_000));
    let mut indexer = StreamIndexer::new(InMemoryStore::new(), &no_dedupe());
    indexer
        .process_all(OrderedEvents::as_delivered(vec![w.clone(), w]))
        .await
        .unwrap();

    let store = indexer.store();
    let creator = store.load_creator(&CREATOR).await.unwrap().unwrap();
    assert_eq!(creator.total_earned, U256::from(2_000));
    // The record table is keyed by event id, so the row is only written once.
    assert_eq!(store.record_count(EventKind::EarningsWithdrawn).unwrap(), 1);
}

// ─── Storage failures ─────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_withdrawal_is_applied_on_retry() {
    let w = at(20, 0, withdrawn(1_000));
    let mut indexer = StreamIndexer::new(FlakyStore::default(), &IndexerConfig::default());

    indexer.store().fail_next_commit();
    let err = indexer.process(&w).await.unwrap_err();
    assert!(err.is_transient());

    let outcome = indexer.process(&w).await.unwrap();
    assert_eq!(outcome.record, Some(w.meta.id()));
    assert_eq!(indexer.stats().duplicates_dropped, 0);

    let store = &indexer.store().inner;
    let creator = store.load_creator(&CREATOR).await.unwrap().unwrap();
    assert_eq!(creator.total_earned, U256::from(1_000));
    assert_eq!(store.record_count(EventKind::EarningsWithdrawn).unwrap(), 1);

    // Once applied, the same log is a duplicate again.
    indexer.process(&w).await.unwrap();
    assert_eq!(indexer.stats().duplicates_dropped, 1);
}

#[tokio::test]
async fn failed_stop_leaves_no_partial_state() {
    let stop = at(11, 0, stopped(1, 100, 9_999_900, 1));
    let mut indexer = StreamIndexer::new(FlakyStore::default(), &no_dedupe());
    indexer
        .process(&at(10, 0, created(1, PAYER, 333, 10_000_000, 1_000)))
        .await
        .unwrap();

    indexer.store().fail_next_commit();
    assert!(indexer.process(&stop).await.is_err());

    let store = &indexer.store().inner;
    let stream = store.load_stream(U256::from(1)).await.unwrap().unwrap();
    assert!(stream.is_active);
    let creator = store.load_creator(&CREATOR).await.unwrap().unwrap();
    assert_eq!(creator.active_stream_count, 1);
    assert_eq!(store.record_count(EventKind::StreamStopped).unwrap(), 0);

    let outcome = indexer.process(&stop).await.unwrap();
    assert_eq!(outcome.anomaly, None);

    let store = &indexer.store().inner;
    let stream = store.load_stream(U256::from(1)).await.unwrap().unwrap();
    assert!(!stream.is_active);
    let creator = store.load_creator(&CREATOR).await.unwrap().unwrap();
    assert_eq!(creator.active_stream_count, 0);
    assert!(store.anomalies().await.unwrap().is_empty());
}

#[tokio::test]
async fn canonical_ordering_sorts_and_dedupes() {
    let create = at(10, 0, created(1, PAYER, 333, 10_000_000, 1_000));
    let indexer = replay(vec![
        at(12, 0, stopped(1, 12_000_000, 3_000_000, 3_600)),
        create.clone(),
        at(11, 0, extended(1, 5_000_000, 15_000_000)),
        create,
    ])
    .await;
    let stats = indexer.stats();
    assert_eq!(stats.processed, 3);
    assert_eq!(stats.out_of_order, 0);
    assert_eq!(stats.anomalies, 0);
}

// ─── Queries ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn dashboard_and_history_queries() {
    let indexer = replay(vec![
        at(10, 0, created(1, PAYER, 333, 10_000_000, 1_000)),
        at(11, 0, created(2, PAYER, 500, 10_000_000, 1_100)),
        at(12, 0, created(3, PAYER, 100, 10_000_000, 1_200)),
        at(13, 0, stopped(1, 1, 1, 1)),
        at(14, 0, stopped(3, 1, 1, 1)),
    ])
    .await;
    let store = indexer.store();

    let dashboard = query::creator_dashboard(store, CREATOR).await.unwrap().unwrap();
    assert_eq!(dashboard.creator.active_stream_count, 1);
    assert_eq!(dashboard.active_streams.len(), 1);
    assert_eq!(dashboard.active_streams[0].stream_id, U256::from(2));
    assert!(query::creator_dashboard(store, PAYER).await.unwrap().is_none());

    let active = query::active_streams(store, CREATOR).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].start_time, U256::from(1_100));

    let history = query::stream_history(store, CREATOR, Page::new(10, 0))
        .await
        .unwrap();
    let ids: Vec<_> = history.iter().map(|s| s.stream_id).collect();
    assert_eq!(ids, vec![U256::from(3), U256::from(1)]);

    let page = query::stream_history(store, CREATOR, Page::new(1, 1))
        .await
        .unwrap();
    assert_eq!(page[0].stream_id, U256::from(1));

    let timeline = query::stream_timeline(store, U256::from(1)).await.unwrap();
    let kinds: Vec<_> = timeline.iter().filter_map(|r| r.kind()).collect();
    assert_eq!(kinds, vec![EventKind::StreamCreated, EventKind::StreamStopped]);
}
