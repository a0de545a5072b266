//! Shared types for the indexing pipeline.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::fmt;

// ─── EventMeta ───────────────────────────────────────────────────────────────

/// Block / transaction metadata attached to every log by the fetch layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventMeta {
    /// Block number the log was emitted in.
    pub block_number: u64,
    /// Unix timestamp of that block (seconds since epoch).
    pub block_timestamp: u64,
    /// Transaction hash.
    pub tx_hash: B256,
    /// Log index within the block.
    pub log_index: u32,
}

impl EventMeta {
    /// The composite primary key of the immutable record for this log.
    pub fn id(&self) -> EventId {
        EventId {
            tx_hash: self.tx_hash,
            log_index: self.log_index,
        }
    }

    /// The canonical chain position of this log.
    pub fn position(&self) -> EventPosition {
        EventPosition {
            block_number: self.block_number,
            log_index: self.log_index,
        }
    }
}

// ─── EventId ─────────────────────────────────────────────────────────────────

/// Unique id of a physical log occurrence: `(transactionHash, logIndex)`.
///
/// Rendered the way subgraph ids are: the 32 tx-hash bytes followed by the
/// log index as 4 little-endian bytes, hex-encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId {
    pub tx_hash: B256,
    pub log_index: u32,
}

impl EventId {
    pub fn new(tx_hash: B256, log_index: u32) -> Self {
        Self { tx_hash, log_index }
    }

    /// Raw 36-byte id.
    pub fn to_bytes(&self) -> [u8; 36] {
        let mut out = [0u8; 36];
        out[..32].copy_from_slice(self.tx_hash.as_slice());
        out[32..].copy_from_slice(&(self.log_index as i32).to_le_bytes());
        out
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.to_bytes()))
    }
}

// ─── EventPosition ───────────────────────────────────────────────────────────

/// Canonical chain order: ascending block number, then ascending log index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventPosition {
    pub block_number: u64,
    pub log_index: u32,
}

impl fmt::Display for EventPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_number, self.log_index)
    }
}

// ─── EventFilter ─────────────────────────────────────────────────────────────

/// Filter for which logs to fetch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// Only fetch logs from these contract addresses (empty = all addresses).
    pub addresses: Vec<Address>,
    /// Only fetch logs with one of these topic[0] values (empty = all events).
    pub topic0_values: Vec<B256>,
}

impl EventFilter {
    /// Create a filter for a single contract address.
    pub fn address(addr: Address) -> Self {
        Self {
            addresses: vec![addr],
            ..Default::default()
        }
    }

    /// Returns `true` if `address` matches this filter.
    pub fn matches_address(&self, address: &Address) -> bool {
        self.addresses.is_empty() || self.addresses.contains(address)
    }

    /// Returns `true` if `topic0` matches this filter.
    pub fn matches_topic0(&self, topic0: &B256) -> bool {
        self.topic0_values.is_empty() || self.topic0_values.contains(topic0)
    }
}

// ─── Page ────────────────────────────────────────────────────────────────────

/// `first` / `skip` pagination, as used by the history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub first: usize,
    pub skip: usize,
}

impl Page {
    pub fn new(first: usize, skip: usize) -> Self {
        Self { first, skip }
    }

    /// Apply this page to an already-ordered list.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        items.into_iter().skip(self.skip).take(self.first).collect()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self { first: 100, skip: 0 }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(block: u64, log: u32) -> EventMeta {
        EventMeta {
            block_number: block,
            block_timestamp: 1_000,
            tx_hash: B256::repeat_byte(0xab),
            log_index: log,
        }
    }

    #[test]
    fn event_id_concatenates_little_endian_log_index() {
        let id = meta(1, 2).id();
        let s = id.to_string();
        assert!(s.starts_with("0xabab"));
        assert!(s.ends_with("02000000"));
        assert_eq!(s.len(), 2 + 72);
    }

    #[test]
    fn positions_order_by_block_then_log() {
        assert!(meta(10, 5).position() < meta(11, 0).position());
        assert!(meta(10, 1).position() < meta(10, 2).position());
        assert_eq!(meta(10, 1).position().to_string(), "10:1");
    }

    #[test]
    fn event_filter_matches_address() {
        let contract = Address::repeat_byte(0x11);
        let f = EventFilter::address(contract);
        assert!(f.matches_address(&contract));
        assert!(!f.matches_address(&Address::repeat_byte(0x22)));
    }

    #[test]
    fn event_filter_empty_matches_all() {
        let f = EventFilter::default();
        assert!(f.matches_address(&Address::ZERO));
        assert!(f.matches_topic0(&B256::ZERO));
    }

    #[test]
    fn page_skips_then_takes() {
        let page = Page::new(2, 1);
        assert_eq!(page.apply(vec![1, 2, 3, 4]), vec![2, 3]);
        assert!(Page::new(5, 10).apply(vec![1, 2]).is_empty());
    }
}
