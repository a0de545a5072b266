//! Read-side queries backing the creator dashboard and history views.

use alloy_primitives::{Address, U256};
use serde::Serialize;
use std::cmp::Reverse;

use crate::entity::{Creator, EventRecord, Stream};
use crate::error::IndexerError;
use crate::event::{ContractEvent, EventKind};
use crate::store::ReadStore;
use crate::types::Page;

/// A creator with its currently active streams.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatorDashboard {
    pub creator: Creator,
    /// Active streams, newest first (by `createdAtTimestamp`).
    pub active_streams: Vec<Stream>,
}

/// Dashboard for `creator`, or `None` if no event ever referenced it.
pub async fn creator_dashboard<S>(
    store: &S,
    creator: Address,
) -> Result<Option<CreatorDashboard>, IndexerError>
where
    S: ReadStore + ?Sized,
{
    let Some(c) = store.load_creator(&creator).await? else {
        return Ok(None);
    };
    let mut active: Vec<Stream> = store
        .streams_by_receiver(&creator)
        .await?
        .into_iter()
        .filter(|s| s.is_active)
        .collect();
    active.sort_by_key(|s| (Reverse(s.created_at_timestamp), Reverse(s.stream_id)));
    Ok(Some(CreatorDashboard {
        creator: c,
        active_streams: active,
    }))
}

/// Active streams for `creator`, newest `startTime` first.
pub async fn active_streams<S>(store: &S, creator: Address) -> Result<Vec<Stream>, IndexerError>
where
    S: ReadStore + ?Sized,
{
    let mut streams: Vec<Stream> = store
        .streams_by_receiver(&creator)
        .await?
        .into_iter()
        .filter(|s| s.is_active)
        .collect();
    streams.sort_by_key(|s| (Reverse(s.start_time), Reverse(s.stream_id)));
    Ok(streams)
}

/// Stopped streams for `creator`, most recently stopped first, paginated.
pub async fn stream_history<S>(
    store: &S,
    creator: Address,
    page: Page,
) -> Result<Vec<Stream>, IndexerError>
where
    S: ReadStore + ?Sized,
{
    let mut streams: Vec<Stream> = store
        .streams_by_receiver(&creator)
        .await?
        .into_iter()
        .filter(|s| !s.is_active)
        .collect();
    streams.sort_by_key(|s| (Reverse(s.stopped_at_timestamp), Reverse(s.stream_id)));
    Ok(page.apply(streams))
}

/// A single earnings withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    pub id: String,
    pub amount: U256,
    pub block_timestamp: u64,
    pub transaction_hash: String,
}

/// `EarningsWithdrawn` records for `creator`, newest first, paginated.
pub async fn withdrawal_history<S>(
    store: &S,
    creator: Address,
    page: Page,
) -> Result<Vec<Withdrawal>, IndexerError>
where
    S: ReadStore + ?Sized,
{
    let records = store.records_of_kind(EventKind::EarningsWithdrawn).await?;
    let mut withdrawals: Vec<(u64, u32, Withdrawal)> = records
        .into_iter()
        .filter_map(|r| match &r.event {
            ContractEvent::EarningsWithdrawn(e) if e.creator == creator => Some((
                r.meta.block_number,
                r.meta.log_index,
                Withdrawal {
                    id: r.id.to_string(),
                    amount: e.amount,
                    block_timestamp: r.meta.block_timestamp,
                    transaction_hash: r.meta.tx_hash.to_string(),
                },
            )),
            _ => None,
        })
        .collect();
    withdrawals.sort_by_key(|(block, log, w)| {
        (Reverse(w.block_timestamp), Reverse(*block), Reverse(*log))
    });
    Ok(page.apply(withdrawals.into_iter().map(|(_, _, w)| w).collect()))
}

/// Every record that references `stream_id`, in canonical chain order.
pub async fn stream_timeline<S>(store: &S, stream_id: U256) -> Result<Vec<EventRecord>, IndexerError>
where
    S: ReadStore + ?Sized,
{
    let mut out = Vec::new();
    for kind in [
        EventKind::StreamCreated,
        EventKind::StreamExtended,
        EventKind::RateChangeProposed,
        EventKind::RateChangeAccepted,
        EventKind::RateChangeCancelled,
        EventKind::StreamStopped,
    ] {
        out.extend(
            store
                .records_of_kind(kind)
                .await?
                .into_iter()
                .filter(|r| r.event.stream_id() == Some(stream_id)),
        );
    }
    out.sort_by_key(|r| r.meta.position());
    Ok(out)
}
