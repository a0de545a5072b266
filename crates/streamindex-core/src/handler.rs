//! One state transition per contract event.
//!
//! [`apply`] is the single dispatch point: an exhaustive `match` over
//! [`ContractEvent`]. Each handler reads the aggregates it needs and
//! computes its transition; `apply` then persists the updated aggregates and
//! the immutable record in one atomic commit. Handlers are not idempotent
//! on their own (a second `StreamCreated` would double-count), so they must
//! see each log once, in canonical order. See [`crate::indexer`] for the guard in front of them.

use alloy_primitives::U256;

use crate::entity::{per_minute, Anomaly, AnomalyRecord, Creator, EventRecord, Stream};
use crate::error::IndexerError;
use crate::event::{
    ContractEvent, EarningsWithdrawn, EventKind, LoggedEvent, RateChangeAccepted, StreamCreated,
    StreamExtended, StreamStopped,
};
use crate::store::{get_or_create_creator, get_stream, AggregateStore, Commit};
use crate::types::{EventId, EventMeta};

/// What a single dispatch did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HandlerOutcome {
    /// Id of the immutable record written, `None` for skipped logs.
    pub record: Option<EventId>,
    /// Consistency fault raised while applying the event, if any.
    pub anomaly: Option<Anomaly>,
}

impl HandlerOutcome {
    fn recorded(id: EventId) -> Self {
        Self {
            record: Some(id),
            anomaly: None,
        }
    }

    fn with_anomaly(id: EventId, anomaly: Anomaly) -> Self {
        Self {
            record: Some(id),
            anomaly: Some(anomaly),
        }
    }

    /// `true` if the log was skipped without a record.
    pub fn is_skipped(&self) -> bool {
        self.record.is_none()
    }
}

/// Aggregate changes computed by one handler, not yet persisted.
#[derive(Debug, Default)]
struct Transition {
    creator: Option<Creator>,
    stream: Option<Stream>,
    anomaly: Option<Anomaly>,
}

impl Transition {
    fn creator(creator: Creator) -> Self {
        Self {
            creator: Some(creator),
            ..Self::default()
        }
    }

    fn stream(stream: Stream) -> Self {
        Self {
            stream: Some(stream),
            ..Self::default()
        }
    }

    fn anomaly(anomaly: Anomaly) -> Self {
        Self {
            anomaly: Some(anomaly),
            ..Self::default()
        }
    }
}

/// Apply one logged event to the store.
///
/// Handlers compute their transition; the updated aggregates, the immutable
/// record and any anomaly are persisted by a single
/// [`AggregateStore::commit`]. Only storage failures return `Err`, and then
/// none of this log's effects were written, so it can be dispatched again. Ordering faults become anomalies
/// in the returned outcome (and in the store's anomaly table).
pub async fn apply<S>(store: &S, logged: &LoggedEvent) -> Result<HandlerOutcome, IndexerError>
where
    S: AggregateStore + ?Sized,
{
    let meta = &logged.meta;
    let transition = match &logged.event {
        ContractEvent::StreamCreated(e) => on_stream_created(store, meta, e).await?,
        ContractEvent::StreamExtended(e) => on_stream_extended(store, e).await?,
        ContractEvent::StreamStopped(e) => on_stream_stopped(store, meta, e).await?,
        ContractEvent::RateChangeAccepted(e) => on_rate_change_accepted(store, e).await?,
        ContractEvent::EarningsWithdrawn(e) => on_earnings_withdrawn(store, e).await?,
        // Advisory / admin events: the record is the whole effect.
        ContractEvent::RateChangeProposed(_)
        | ContractEvent::RateChangeCancelled(_)
        | ContractEvent::OwnershipTransferStarted(_)
        | ContractEvent::OwnershipTransferred(_)
        | ContractEvent::Paused(_)
        | ContractEvent::Unpaused(_)
        | ContractEvent::PlatformFeeUpdated(_) => Transition::default(),
        ContractEvent::Unrecognized(u) => {
            tracing::debug!(
                position = %meta.position(),
                topic0 = ?u.topic0,
                reason = %u.reason,
                "skipping unrecognized log"
            );
            return Ok(HandlerOutcome::default());
        }
    };

    let record = EventRecord::from_logged(logged).ok_or_else(|| IndexerError::Handler {
        handler: "apply".into(),
        reason: "recognised event without a kind".into(),
    })?;
    let id = record.id;
    let anomaly = transition.anomaly.map(|anomaly| AnomalyRecord {
        event_id: id,
        meta: *meta,
        anomaly,
    });

    store
        .commit(&Commit {
            creator: transition.creator,
            stream: transition.stream,
            record,
            anomaly: anomaly.clone(),
        })
        .await?;
    tracing::debug!(%id, kind = ?logged.event.kind(), position = %meta.position(), "event recorded");

    match anomaly {
        Some(AnomalyRecord { anomaly, .. }) => {
            tracing::warn!(%id, position = %meta.position(), %anomaly, "event log anomaly");
            Ok(HandlerOutcome::with_anomaly(id, anomaly))
        }
        None => Ok(HandlerOutcome::recorded(id)),
    }
}

async fn on_stream_created<S>(
    store: &S,
    meta: &EventMeta,
    e: &StreamCreated,
) -> Result<Transition, IndexerError>
where
    S: AggregateStore + ?Sized,
{
    // Stream ids are never reused; an existing row means this log was replayed.
    if get_stream(store, e.stream_id).await?.is_some() {
        return Ok(Transition::anomaly(Anomaly::StreamAlreadyExists {
            stream_id: e.stream_id,
        }));
    }

    let mut creator = get_or_create_creator(store, e.receiver).await?;
    creator.active_stream_count += 1;
    creator.total_stream_count += 1;
    creator.add_unique_viewer(e.payer);

    let stream = Stream {
        stream_id: e.stream_id,
        payer: e.payer,
        receiver: e.receiver,
        rate_per_second: e.rate_per_second,
        rate_per_minute: per_minute(e.rate_per_second),
        deposit: e.max_deposit,
        start_time: e.start_time,
        is_active: true,
        end_time: None,
        duration: None,
        total_paid: None,
        refunded: None,
        created_at_block: meta.block_number,
        created_at_timestamp: meta.block_timestamp,
        stopped_at_block: None,
        stopped_at_timestamp: None,
    };
    Ok(Transition {
        creator: Some(creator),
        stream: Some(stream),
        anomaly: None,
    })
}

async fn on_stream_extended<S>(store: &S, e: &StreamExtended) -> Result<Transition, IndexerError>
where
    S: AggregateStore + ?Sized,
{
    let Some(mut stream) = get_stream(store, e.stream_id).await? else {
        return Ok(missing(EventKind::StreamExtended, e.stream_id));
    };
    stream.deposit = e.new_total_deposit;
    Ok(Transition::stream(stream))
}

async fn on_stream_stopped<S>(
    store: &S,
    meta: &EventMeta,
    e: &StreamStopped,
) -> Result<Transition, IndexerError>
where
    S: AggregateStore + ?Sized,
{
    let Some(mut stream) = get_stream(store, e.stream_id).await? else {
        return Ok(missing(EventKind::StreamStopped, e.stream_id));
    };
    if !stream.is_active {
        return Ok(Transition::anomaly(Anomaly::StreamAlreadyStopped {
            stream_id: e.stream_id,
        }));
    }

    stream.is_active = false;
    stream.end_time = Some(meta.block_timestamp);
    stream.duration = Some(e.duration);
    stream.total_paid = Some(e.total_paid);
    stream.refunded = Some(e.refunded);
    stream.stopped_at_block = Some(meta.block_number);
    stream.stopped_at_timestamp = Some(meta.block_timestamp);

    let mut creator = get_or_create_creator(store, stream.receiver).await?;
    if !creator.release_active_stream() {
        // The stop still settles the stream; the creator row stays at zero.
        return Ok(Transition {
            anomaly: Some(Anomaly::ActiveCountUnderflow {
                creator: creator.address,
            }),
            ..Transition::stream(stream)
        });
    }
    Ok(Transition {
        creator: Some(creator),
        stream: Some(stream),
        anomaly: None,
    })
}

async fn on_rate_change_accepted<S>(
    store: &S,
    e: &RateChangeAccepted,
) -> Result<Transition, IndexerError>
where
    S: AggregateStore + ?Sized,
{
    let Some(mut stream) = get_stream(store, e.stream_id).await? else {
        return Ok(missing(EventKind::RateChangeAccepted, e.stream_id));
    };
    // Applied whether or not the stream is still active.
    if !stream.is_active {
        tracing::debug!(stream_id = %e.stream_id, "rate change accepted on a stopped stream");
    }
    stream.set_rate(e.new_rate);
    Ok(Transition::stream(stream))
}

async fn on_earnings_withdrawn<S>(
    store: &S,
    e: &EarningsWithdrawn,
) -> Result<Transition, IndexerError>
where
    S: AggregateStore + ?Sized,
{
    let mut creator = get_or_create_creator(store, e.creator).await?;
    creator.total_earned = creator.total_earned.saturating_add(e.amount);
    Ok(Transition::creator(creator))
}

fn missing(kind: EventKind, stream_id: U256) -> Transition {
    Transition::anomaly(Anomaly::MissingStream { kind, stream_id })
}
