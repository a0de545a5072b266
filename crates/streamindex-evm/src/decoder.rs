//! `EvmDecoder`: raw StreamPayment logs to typed [`ContractEvent`]s.
//!
//! topics[0] selects the [`EventAbi`]; indexed params are decoded from
//! topics[1..] and the rest from `data` as one ABI-encoded tuple. A log that
//! fails any of these steps is never coerced into a known variant: [`decode`]
//! turns it into [`ContractEvent::Unrecognized`] and the handlers skip it.
//!
//! [`decode`]: EvmDecoder::decode

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{Address, B256, U256};
use std::collections::HashMap;
use thiserror::Error;

use streamindex_core::event::{
    ContractEvent, EarningsWithdrawn, EventKind, LoggedEvent, OwnershipChange, PauseToggle,
    PlatformFeeUpdated, RateChangeAccepted, RateChangeCancelled, RateChangeProposed,
    StreamCreated, StreamExtended, StreamStopped, Unrecognized,
};
use streamindex_core::error::IndexerError;
use streamindex_core::types::EventMeta;

use crate::abi::{self, EventAbi, ParamDef, ParamType, STREAM_PAYMENT_EVENTS};
use crate::fetcher::RawLog;

/// Errors that can occur while decoding a single log.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unknown event signature {topic0}")]
    UnknownSignature { topic0: String },

    #[error("{event}: missing topic {index}")]
    MissingTopic { event: &'static str, index: usize },

    #[error("invalid hex in {field}: {reason}")]
    InvalidHex { field: String, reason: String },

    #[error("ABI decode failed: {reason}")]
    AbiDecodeFailed { reason: String },

    #[error("type mismatch for '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        got: String,
    },

    #[error("invalid log metadata: {reason}")]
    InvalidMetadata { reason: String },
}

impl From<DecodeError> for IndexerError {
    fn from(e: DecodeError) -> Self {
        IndexerError::Decode(e.to_string())
    }
}

/// Decoded parameter values keyed by ABI name.
struct Params {
    event: &'static str,
    values: HashMap<&'static str, DynSolValue>,
}

impl Params {
    fn get(&self, name: &'static str) -> Result<&DynSolValue, DecodeError> {
        self.values.get(name).ok_or_else(|| DecodeError::TypeMismatch {
            field: format!("{}.{name}", self.event),
            expected: "a decoded value",
            got: "nothing".into(),
        })
    }

    fn uint(&self, name: &'static str) -> Result<U256, DecodeError> {
        match self.get(name)? {
            DynSolValue::Uint(v, 256) => Ok(*v),
            other => Err(self.mismatch(name, "uint256", other)),
        }
    }

    fn address(&self, name: &'static str) -> Result<Address, DecodeError> {
        match self.get(name)? {
            DynSolValue::Address(a) => Ok(*a),
            other => Err(self.mismatch(name, "address", other)),
        }
    }

    fn mismatch(&self, name: &str, expected: &'static str, got: &DynSolValue) -> DecodeError {
        DecodeError::TypeMismatch {
            field: format!("{}.{name}", self.event),
            expected,
            got: format!("{got:?}"),
        }
    }
}

/// The StreamPayment log decoder.
/// Holds a topic0 → ABI lookup built once from the static event table.
#[derive(Debug, Clone)]
pub struct EvmDecoder {
    by_topic0: HashMap<B256, &'static EventAbi>,
}

impl Default for EvmDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl EvmDecoder {
    pub fn new() -> Self {
        let by_topic0 = STREAM_PAYMENT_EVENTS
            .iter()
            .map(|abi| (abi.topic0(), abi))
            .collect();
        Self { by_topic0 }
    }

    /// Every topic0 this decoder recognises, in ABI table order.
    pub fn topic0_values(&self) -> Vec<B256> {
        STREAM_PAYMENT_EVENTS.iter().map(EventAbi::topic0).collect()
    }

    /// The ABI entry a log's topic0 selects, if any.
    pub fn lookup(&self, topic0: &B256) -> Option<&'static EventAbi> {
        self.by_topic0.get(topic0).copied()
    }

    /// Decode a single raw log into a typed event.
    pub fn decode_event(&self, log: &RawLog) -> Result<ContractEvent, DecodeError> {
        let first = log.topics.first().ok_or(DecodeError::UnknownSignature {
            topic0: "<none>".into(),
        })?;
        let topic0 = parse_word("topics[0]", first)?;
        let abi = self.lookup(&topic0).ok_or_else(|| DecodeError::UnknownSignature {
            topic0: first.clone(),
        })?;

        let indexed: Vec<&ParamDef> = abi.indexed_params().collect();
        if log.topics.len() > indexed.len() + 1 {
            // Same signature, different `indexed` layout: not our contract's event.
            return Err(DecodeError::AbiDecodeFailed {
                reason: format!(
                    "{}: expected {} topics, got {}",
                    abi.name(),
                    indexed.len() + 1,
                    log.topics.len()
                ),
            });
        }

        let mut values = HashMap::with_capacity(abi.params.len());
        for (i, param) in indexed.iter().enumerate() {
            let topic = log.topics.get(i + 1).ok_or(DecodeError::MissingTopic {
                event: abi.name(),
                index: i + 1,
            })?;
            let word = parse_word(&format!("topics[{}]", i + 1), topic)?;
            values.insert(param.name, decode_topic(&word, param.ty)?);
        }

        let data_params: Vec<&ParamDef> = abi.data_params().collect();
        if !data_params.is_empty() {
            let data = parse_bytes("data", &log.data)?;
            values.extend(decode_data(&data, &data_params)?);
        }

        build_event(
            abi.kind,
            &Params {
                event: abi.name(),
                values,
            },
        )
    }

    /// Decode a log together with its position metadata.
    ///
    /// Malformed metadata (block number, log index, tx hash) is an `Err`:
    /// without it the log cannot be ordered or keyed. Anything wrong with the
    /// event itself yields `ContractEvent::Unrecognized`.
    pub fn decode(&self, log: &RawLog, block_timestamp: u64) -> Result<LoggedEvent, DecodeError> {
        let meta = log_meta(log, block_timestamp)?;
        let event = match self.decode_event(log) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(
                    tx = %log.tx_hash,
                    log_index = %log.log_index,
                    error = %e,
                    "log not recognised"
                );
                ContractEvent::Unrecognized(Unrecognized {
                    topic0: abi::from_topics(&log.topics),
                    reason: e.to_string(),
                })
            }
        };
        Ok(LoggedEvent::new(meta, event))
    }
}

/// Parse the position metadata of a log.
pub fn log_meta(log: &RawLog, block_timestamp: u64) -> Result<EventMeta, DecodeError> {
    let invalid = |e: IndexerError| DecodeError::InvalidMetadata {
        reason: e.to_string(),
    };
    Ok(EventMeta {
        block_number: log.block_number_u64().map_err(invalid)?,
        block_timestamp,
        tx_hash: log.tx_hash_b256().map_err(invalid)?,
        log_index: log.log_index_u32().map_err(invalid)?,
    })
}

fn parse_bytes(field: &str, s: &str) -> Result<Vec<u8>, DecodeError> {
    let hex = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(hex).map_err(|e| DecodeError::InvalidHex {
        field: field.to_string(),
        reason: e.to_string(),
    })
}

fn parse_word(field: &str, s: &str) -> Result<B256, DecodeError> {
    let bytes = parse_bytes(field, s)?;
    if bytes.len() != 32 {
        return Err(DecodeError::InvalidHex {
            field: field.to_string(),
            reason: format!("expected 32 bytes, got {}", bytes.len()),
        });
    }
    Ok(B256::from_slice(&bytes))
}

/// Decode one indexed value type from its 32-byte topic word.
fn decode_topic(word: &B256, ty: ParamType) -> Result<DynSolValue, DecodeError> {
    ty.to_dyn()
        .abi_decode(word.as_slice())
        .map_err(|e| DecodeError::AbiDecodeFailed {
            reason: format!("topic decode: {e}"),
        })
}

/// Decode the log data (non-indexed params) as an ABI-encoded tuple.
fn decode_data(
    data: &[u8],
    params: &[&ParamDef],
) -> Result<Vec<(&'static str, DynSolValue)>, DecodeError> {
    let tuple = DynSolType::Tuple(params.iter().map(|p| p.ty.to_dyn()).collect());
    let decoded = tuple
        .abi_decode(data)
        .map_err(|e| DecodeError::AbiDecodeFailed {
            reason: e.to_string(),
        })?;

    let values = match decoded {
        DynSolValue::Tuple(vals) => vals,
        other => vec![other],
    };
    if values.len() != params.len() {
        return Err(DecodeError::AbiDecodeFailed {
            reason: format!("expected {} data values, got {}", params.len(), values.len()),
        });
    }
    Ok(params.iter().map(|p| p.name).zip(values).collect())
}

fn build_event(kind: EventKind, p: &Params) -> Result<ContractEvent, DecodeError> {
    Ok(match kind {
        EventKind::StreamCreated => ContractEvent::StreamCreated(StreamCreated {
            stream_id: p.uint("streamId")?,
            payer: p.address("payer")?,
            receiver: p.address("receiver")?,
            rate_per_second: p.uint("ratePerSecond")?,
            max_deposit: p.uint("maxDeposit")?,
            start_time: p.uint("startTime")?,
        }),
        EventKind::StreamExtended => ContractEvent::StreamExtended(StreamExtended {
            stream_id: p.uint("streamId")?,
            additional_deposit: p.uint("additionalDeposit")?,
            new_total_deposit: p.uint("newTotalDeposit")?,
        }),
        EventKind::StreamStopped => ContractEvent::StreamStopped(StreamStopped {
            stream_id: p.uint("streamId")?,
            total_paid: p.uint("totalPaid")?,
            refunded: p.uint("refunded")?,
            duration: p.uint("duration")?,
        }),
        EventKind::RateChangeProposed => ContractEvent::RateChangeProposed(RateChangeProposed {
            stream_id: p.uint("streamId")?,
            old_rate: p.uint("oldRate")?,
            new_rate: p.uint("newRate")?,
        }),
        EventKind::RateChangeAccepted => ContractEvent::RateChangeAccepted(RateChangeAccepted {
            stream_id: p.uint("streamId")?,
            old_rate: p.uint("oldRate")?,
            new_rate: p.uint("newRate")?,
            settled_amount: p.uint("settledAmount")?,
        }),
        EventKind::RateChangeCancelled => {
            ContractEvent::RateChangeCancelled(RateChangeCancelled {
                stream_id: p.uint("streamId")?,
            })
        }
        EventKind::EarningsWithdrawn => ContractEvent::EarningsWithdrawn(EarningsWithdrawn {
            creator: p.address("creator")?,
            amount: p.uint("amount")?,
        }),
        EventKind::OwnershipTransferStarted => {
            ContractEvent::OwnershipTransferStarted(ownership(p)?)
        }
        EventKind::OwnershipTransferred => ContractEvent::OwnershipTransferred(ownership(p)?),
        EventKind::Paused => ContractEvent::Paused(PauseToggle {
            admin: p.address("admin")?,
        }),
        EventKind::Unpaused => ContractEvent::Unpaused(PauseToggle {
            admin: p.address("admin")?,
        }),
        EventKind::PlatformFeeUpdated => ContractEvent::PlatformFeeUpdated(PlatformFeeUpdated {
            old_fee: p.uint("oldFee")?,
            new_fee: p.uint("newFee")?,
        }),
    })
}

fn ownership(p: &Params) -> Result<OwnershipChange, DecodeError> {
    Ok(OwnershipChange {
        previous_owner: p.address("previousOwner")?,
        new_owner: p.address("newOwner")?,
    })
}
