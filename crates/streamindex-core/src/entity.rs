//! Aggregate entities (`Creator`, `Stream`) and immutable event records.
//!
//! Aggregates are a derived, eventually-consistent cache of the contract's
//! event log; they are folded incrementally by the handlers in
//! [`crate::handler`] and never recomputed from history.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::event::{ContractEvent, EventKind, LoggedEvent};
use crate::types::{EventId, EventMeta};

pub const SECONDS_PER_MINUTE: u64 = 60;

/// `ratePerMinute` is always `ratePerSecond * 60`.
///
/// Rates above `U256::MAX / 60` have no representable per-minute value; they
/// are capped at `U256::MAX` and logged at `warn`.
pub fn per_minute(rate_per_second: U256) -> U256 {
    match rate_per_second.checked_mul(U256::from(SECONDS_PER_MINUTE)) {
        Some(rate) => rate,
        None => {
            tracing::warn!(%rate_per_second, "per-minute rate overflows uint256, capping");
            U256::MAX
        }
    }
}

// ─── Creator ─────────────────────────────────────────────────────────────────

/// Aggregate state of a stream receiver, keyed by address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    pub address: Address,
    /// Sum of all `EarningsWithdrawn` amounts.
    pub total_earned: U256,
    pub active_stream_count: u64,
    pub total_stream_count: u64,
    /// Every payer that ever opened a stream to this creator, deduplicated.
    pub unique_viewers: Vec<Address>,
    /// Always equal to `unique_viewers.len()`.
    pub total_viewers_count: u64,
}

impl Creator {
    /// A creator with every counter zeroed.
    pub fn new(address: Address) -> Self {
        Self {
            address,
            total_earned: U256::ZERO,
            active_stream_count: 0,
            total_stream_count: 0,
            unique_viewers: Vec::new(),
            total_viewers_count: 0,
        }
    }

    /// Insert `payer` into the viewer set. Returns `false` if already present.
    pub fn add_unique_viewer(&mut self, payer: Address) -> bool {
        if self.unique_viewers.contains(&payer) {
            return false;
        }
        self.unique_viewers.push(payer);
        self.total_viewers_count = self.unique_viewers.len() as u64;
        true
    }

    /// Decrement the active count, refusing to go below zero.
    ///
    /// Returns `false` when the counter was already zero.
    pub fn release_active_stream(&mut self) -> bool {
        match self.active_stream_count.checked_sub(1) {
            Some(n) => {
                self.active_stream_count = n;
                true
            }
            None => false,
        }
    }
}

// ─── Stream ──────────────────────────────────────────────────────────────────

/// Aggregate state of one payer → creator stream, keyed by stream id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    pub stream_id: U256,
    pub payer: Address,
    /// The creator receiving the stream.
    pub receiver: Address,
    pub rate_per_second: U256,
    pub rate_per_minute: U256,
    /// Current maximum payable amount.
    pub deposit: U256,
    pub start_time: U256,
    pub is_active: bool,

    // Settlement, populated once stopped.
    pub end_time: Option<u64>,
    pub duration: Option<U256>,
    pub total_paid: Option<U256>,
    pub refunded: Option<U256>,

    // Provenance.
    pub created_at_block: u64,
    pub created_at_timestamp: u64,
    pub stopped_at_block: Option<u64>,
    pub stopped_at_timestamp: Option<u64>,
}

impl Stream {
    /// Set both rate fields from a per-second rate.
    pub fn set_rate(&mut self, rate_per_second: U256) {
        self.rate_per_second = rate_per_second;
        self.rate_per_minute = per_minute(rate_per_second);
    }
}

// ─── EventRecord ─────────────────────────────────────────────────────────────

/// Immutable, one-per-occurrence audit row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub meta: EventMeta,
    pub event: ContractEvent,
}

impl EventRecord {
    /// Snapshot a logged event. Returns `None` for unrecognized logs, which
    /// are never recorded.
    pub fn from_logged(logged: &LoggedEvent) -> Option<Self> {
        logged.event.kind()?;
        Some(Self {
            id: logged.meta.id(),
            meta: logged.meta,
            event: logged.event.clone(),
        })
    }

    pub fn kind(&self) -> Option<EventKind> {
        self.event.kind()
    }
}

// ─── Anomalies ───────────────────────────────────────────────────────────────

/// A consistency fault detected while folding the event log.
///
/// These indicate a missed or mis-ordered upstream delivery. They never stop
/// the pipeline; they are persisted for later reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Anomaly {
    /// A handler expected an existing stream and found none.
    MissingStream { kind: EventKind, stream_id: U256 },
    /// A second stop for a stream that is already inactive.
    StreamAlreadyStopped { stream_id: U256 },
    /// A create for a stream id that already exists.
    StreamAlreadyExists { stream_id: U256 },
    /// A stop would have pushed `activeStreamCount` below zero.
    ActiveCountUnderflow { creator: Address },
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingStream { kind, stream_id } => {
                write!(f, "{kind} references unknown stream {stream_id}")
            }
            Self::StreamAlreadyStopped { stream_id } => {
                write!(f, "stream {stream_id} already stopped")
            }
            Self::StreamAlreadyExists { stream_id } => {
                write!(f, "stream {stream_id} already exists")
            }
            Self::ActiveCountUnderflow { creator } => {
                write!(f, "active stream count of {creator} would go below zero")
            }
        }
    }
}

/// An anomaly together with the log that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnomalyRecord {
    pub event_id: EventId,
    pub meta: EventMeta,
    pub anomaly: Anomaly,
}
