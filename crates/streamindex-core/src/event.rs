//! Typed StreamPayment contract events.
//!
//! The contract emits a fixed set of events; each one is a variant of the
//! closed [`ContractEvent`] sum type. Logs that cannot be decoded into one of
//! them become [`ContractEvent::Unrecognized`] so dispatch stays an
//! exhaustive `match` and nothing is ever cast blindly.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::EventMeta;

// ─── Event payloads ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamCreated {
    pub stream_id: U256,
    pub payer: Address,
    pub receiver: Address,
    pub rate_per_second: U256,
    pub max_deposit: U256,
    pub start_time: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamExtended {
    pub stream_id: U256,
    pub additional_deposit: U256,
    /// Absolute deposit after the extension; applied verbatim.
    pub new_total_deposit: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStopped {
    pub stream_id: U256,
    pub total_paid: U256,
    pub refunded: U256,
    pub duration: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateChangeProposed {
    pub stream_id: U256,
    pub old_rate: U256,
    pub new_rate: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateChangeAccepted {
    pub stream_id: U256,
    pub old_rate: U256,
    pub new_rate: U256,
    pub settled_amount: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateChangeCancelled {
    pub stream_id: U256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarningsWithdrawn {
    pub creator: Address,
    pub amount: U256,
}

/// Shared by `OwnershipTransferStarted` and `OwnershipTransferred`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipChange {
    pub previous_owner: Address,
    pub new_owner: Address,
}

/// Shared by `Paused` and `Unpaused`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PauseToggle {
    pub admin: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformFeeUpdated {
    pub old_fee: U256,
    pub new_fee: U256,
}

/// A log the decoder could not turn into a known event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unrecognized {
    /// topics[0] of the log, if it had one.
    pub topic0: Option<B256>,
    /// Why decoding failed.
    pub reason: String,
}

// ─── ContractEvent ───────────────────────────────────────────────────────────

/// Every event the StreamPayment contract can emit, plus `Unrecognized`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "params")]
pub enum ContractEvent {
    StreamCreated(StreamCreated),
    StreamExtended(StreamExtended),
    StreamStopped(StreamStopped),
    RateChangeProposed(RateChangeProposed),
    RateChangeAccepted(RateChangeAccepted),
    RateChangeCancelled(RateChangeCancelled),
    EarningsWithdrawn(EarningsWithdrawn),
    OwnershipTransferStarted(OwnershipChange),
    OwnershipTransferred(OwnershipChange),
    Paused(PauseToggle),
    Unpaused(PauseToggle),
    PlatformFeeUpdated(PlatformFeeUpdated),
    Unrecognized(Unrecognized),
}

impl ContractEvent {
    /// The record kind, or `None` for an unrecognized log.
    pub fn kind(&self) -> Option<EventKind> {
        Some(match self {
            Self::StreamCreated(_) => EventKind::StreamCreated,
            Self::StreamExtended(_) => EventKind::StreamExtended,
            Self::StreamStopped(_) => EventKind::StreamStopped,
            Self::RateChangeProposed(_) => EventKind::RateChangeProposed,
            Self::RateChangeAccepted(_) => EventKind::RateChangeAccepted,
            Self::RateChangeCancelled(_) => EventKind::RateChangeCancelled,
            Self::EarningsWithdrawn(_) => EventKind::EarningsWithdrawn,
            Self::OwnershipTransferStarted(_) => EventKind::OwnershipTransferStarted,
            Self::OwnershipTransferred(_) => EventKind::OwnershipTransferred,
            Self::Paused(_) => EventKind::Paused,
            Self::Unpaused(_) => EventKind::Unpaused,
            Self::PlatformFeeUpdated(_) => EventKind::PlatformFeeUpdated,
            Self::Unrecognized(_) => return None,
        })
    }

    /// The stream this event refers to, if any.
    pub fn stream_id(&self) -> Option<U256> {
        match self {
            Self::StreamCreated(e) => Some(e.stream_id),
            Self::StreamExtended(e) => Some(e.stream_id),
            Self::StreamStopped(e) => Some(e.stream_id),
            Self::RateChangeProposed(e) => Some(e.stream_id),
            Self::RateChangeAccepted(e) => Some(e.stream_id),
            Self::RateChangeCancelled(e) => Some(e.stream_id),
            _ => None,
        }
    }

    /// The creator this event refers to directly, if any.
    pub fn creator(&self) -> Option<Address> {
        match self {
            Self::StreamCreated(e) => Some(e.receiver),
            Self::EarningsWithdrawn(e) => Some(e.creator),
            _ => None,
        }
    }

    /// The event parameters as a JSON object (denormalised record snapshot).
    pub fn params_json(&self) -> serde_json::Value {
        serde_json::to_value(self)
            .ok()
            .and_then(|mut v| v.get_mut("params").map(serde_json::Value::take))
            .unwrap_or(serde_json::Value::Null)
    }
}

// ─── EventKind ───────────────────────────────────────────────────────────────

/// Fieldless tag of a recognised event; one immutable record table per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    StreamCreated,
    StreamExtended,
    StreamStopped,
    RateChangeProposed,
    RateChangeAccepted,
    RateChangeCancelled,
    EarningsWithdrawn,
    OwnershipTransferStarted,
    OwnershipTransferred,
    Paused,
    Unpaused,
    PlatformFeeUpdated,
}

impl EventKind {
    pub const ALL: [EventKind; 12] = [
        Self::StreamCreated,
        Self::StreamExtended,
        Self::StreamStopped,
        Self::RateChangeProposed,
        Self::RateChangeAccepted,
        Self::RateChangeCancelled,
        Self::EarningsWithdrawn,
        Self::OwnershipTransferStarted,
        Self::OwnershipTransferred,
        Self::Paused,
        Self::Unpaused,
        Self::PlatformFeeUpdated,
    ];

    /// The contract-side event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StreamCreated => "StreamCreated",
            Self::StreamExtended => "StreamExtended",
            Self::StreamStopped => "StreamStopped",
            Self::RateChangeProposed => "RateChangeProposed",
            Self::RateChangeAccepted => "RateChangeAccepted",
            Self::RateChangeCancelled => "RateChangeCancelled",
            Self::EarningsWithdrawn => "EarningsWithdrawn",
            Self::OwnershipTransferStarted => "OwnershipTransferStarted",
            Self::OwnershipTransferred => "OwnershipTransferred",
            Self::Paused => "Paused",
            Self::Unpaused => "Unpaused",
            Self::PlatformFeeUpdated => "PlatformFeeUpdated",
        }
    }

    /// Storage table name for records of this kind.
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::StreamCreated => "stream_created",
            Self::StreamExtended => "stream_extended",
            Self::StreamStopped => "stream_stopped",
            Self::RateChangeProposed => "rate_change_proposed",
            Self::RateChangeAccepted => "rate_change_accepted",
            Self::RateChangeCancelled => "rate_change_cancelled",
            Self::EarningsWithdrawn => "earnings_withdrawn",
            Self::OwnershipTransferStarted => "ownership_transfer_started",
            Self::OwnershipTransferred => "ownership_transferred",
            Self::Paused => "paused",
            Self::Unpaused => "unpaused",
            Self::PlatformFeeUpdated => "platform_fee_updated",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── LoggedEvent ─────────────────────────────────────────────────────────────

/// A decoded event together with the metadata of the log that carried it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub meta: EventMeta,
    pub event: ContractEvent,
}

impl LoggedEvent {
    pub fn new(meta: EventMeta, event: ContractEvent) -> Self {
        Self { meta, event }
    }
}
