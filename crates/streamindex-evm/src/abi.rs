//! The StreamPayment event ABI.
//!
//! One [`EventAbi`] per event the contract emits. The fingerprint of an
//! event is the keccak256 hash of its canonical signature string, e.g.:
//!   keccak256("StreamCreated(uint256,address,address,uint256,uint256,uint256)")
//!
//! For raw logs, topics[0] IS the fingerprint; indexed params follow in
//! topics[1..] and the remaining params are ABI-encoded in `data`.

use alloy_core::dyn_abi::DynSolType;
use alloy_primitives::B256;
use std::str::FromStr;
use tiny_keccak::{Hasher, Keccak};

use streamindex_core::event::EventKind;

/// Solidity type of an event parameter. The contract only uses these two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Uint256,
    Address,
}

impl ParamType {
    pub fn sol_name(&self) -> &'static str {
        match self {
            Self::Uint256 => "uint256",
            Self::Address => "address",
        }
    }

    pub fn to_dyn(self) -> DynSolType {
        match self {
            Self::Uint256 => DynSolType::Uint(256),
            Self::Address => DynSolType::Address,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParamDef {
    pub name: &'static str,
    pub ty: ParamType,
    pub indexed: bool,
}

const fn indexed(name: &'static str, ty: ParamType) -> ParamDef {
    ParamDef {
        name,
        ty,
        indexed: true,
    }
}

const fn data(name: &'static str, ty: ParamType) -> ParamDef {
    ParamDef {
        name,
        ty,
        indexed: false,
    }
}

/// ABI definition of a single contract event.
#[derive(Debug, Clone, Copy)]
pub struct EventAbi {
    pub kind: EventKind,
    pub params: &'static [ParamDef],
}

impl EventAbi {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Canonical signature, e.g. `"StreamExtended(uint256,uint256,uint256)"`.
    pub fn signature(&self) -> String {
        let types: Vec<&str> = self.params.iter().map(|p| p.ty.sol_name()).collect();
        format!("{}({})", self.name(), types.join(","))
    }

    /// topics[0] for this event.
    pub fn topic0(&self) -> B256 {
        keccak256_signature(&self.signature())
    }

    pub fn indexed_params(&self) -> impl Iterator<Item = &ParamDef> {
        self.params.iter().filter(|p| p.indexed)
    }

    pub fn data_params(&self) -> impl Iterator<Item = &ParamDef> {
        self.params.iter().filter(|p| !p.indexed)
    }
}

use ParamType::{Address, Uint256};

/// Every event the StreamPayment contract emits.
pub static STREAM_PAYMENT_EVENTS: [EventAbi; 12] = [
    EventAbi {
        kind: EventKind::StreamCreated,
        params: &[
            indexed("streamId", Uint256),
            indexed("payer", Address),
            indexed("receiver", Address),
            data("ratePerSecond", Uint256),
            data("maxDeposit", Uint256),
            data("startTime", Uint256),
        ],
    },
    EventAbi {
        kind: EventKind::StreamExtended,
        params: &[
            indexed("streamId", Uint256),
            data("additionalDeposit", Uint256),
            data("newTotalDeposit", Uint256),
        ],
    },
    EventAbi {
        kind: EventKind::StreamStopped,
        params: &[
            indexed("streamId", Uint256),
            data("totalPaid", Uint256),
            data("refunded", Uint256),
            data("duration", Uint256),
        ],
    },
    EventAbi {
        kind: EventKind::RateChangeProposed,
        params: &[
            indexed("streamId", Uint256),
            data("oldRate", Uint256),
            data("newRate", Uint256),
        ],
    },
    EventAbi {
        kind: EventKind::RateChangeAccepted,
        params: &[
            indexed("streamId", Uint256),
            data("oldRate", Uint256),
            data("newRate", Uint256),
            data("settledAmount", Uint256),
        ],
    },
    EventAbi {
        kind: EventKind::RateChangeCancelled,
        params: &[indexed("streamId", Uint256)],
    },
    EventAbi {
        kind: EventKind::EarningsWithdrawn,
        params: &[indexed("creator", Address), data("amount", Uint256)],
    },
    EventAbi {
        kind: EventKind::OwnershipTransferStarted,
        params: &[
            indexed("previousOwner", Address),
            indexed("newOwner", Address),
        ],
    },
    EventAbi {
        kind: EventKind::OwnershipTransferred,
        params: &[
            indexed("previousOwner", Address),
            indexed("newOwner", Address),
        ],
    },
    EventAbi {
        kind: EventKind::Paused,
        params: &[data("admin", Address)],
    },
    EventAbi {
        kind: EventKind::Unpaused,
        params: &[data("admin", Address)],
    },
    EventAbi {
        kind: EventKind::PlatformFeeUpdated,
        params: &[data("oldFee", Uint256), data("newFee", Uint256)],
    },
];

/// Look up the ABI entry for an event kind.
pub fn event_abi(kind: EventKind) -> Option<&'static EventAbi> {
    STREAM_PAYMENT_EVENTS.iter().find(|e| e.kind == kind)
}

/// Compute the keccak256 fingerprint of an event signature string.
/// Input: `"EventName(type1,type2,...)"`, the canonical ABI signature.
pub fn keccak256_signature(signature: &str) -> B256 {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(signature.as_bytes());
    hasher.finalize(&mut output);
    B256::from(output)
}

/// Extract the fingerprint directly from a raw log's topics (topics[0]).
/// Returns `None` if topics is empty or the first topic is malformed.
pub fn from_topics(topics: &[String]) -> Option<B256> {
    let first = topics.first()?;
    let hex = first.strip_prefix("0x").unwrap_or(first);
    if hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        B256::from_str(hex).ok()
    } else {
        None
    }
}
