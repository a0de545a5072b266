//! EVM block and log fetcher.
//!
//! Uses JSON-RPC `eth_getBlockByNumber` and `eth_getLogs` with range batching
//! to fetch StreamPayment logs during both backfill and live phases.

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use streamindex_core::error::IndexerError;
use streamindex_core::types::{EventFilter, EventPosition};

/// A raw EVM log as returned by `eth_getLogs`.
///
/// Some providers (and recorded fixtures) include `blockTimestamp`; when it
/// is missing the index loop resolves it from the block header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<String>,
    #[serde(rename = "data")]
    pub data: String,
    #[serde(rename = "blockNumber")]
    pub block_number: String,
    #[serde(rename = "blockHash", default)]
    pub block_hash: String,
    #[serde(rename = "blockTimestamp", default, skip_serializing_if = "Option::is_none")]
    pub block_timestamp: Option<String>,
    #[serde(rename = "transactionHash")]
    pub tx_hash: String,
    #[serde(rename = "logIndex")]
    pub log_index: String,
    #[serde(rename = "removed", default)]
    pub removed: Option<bool>,
}

impl RawLog {
    /// Returns the block number as u64.
    pub fn block_number_u64(&self) -> Result<u64, IndexerError> {
        parse_hex_u64(&self.block_number)
    }

    /// Returns the log index as u32.
    pub fn log_index_u32(&self) -> Result<u32, IndexerError> {
        let index = parse_hex_u64(&self.log_index)?;
        u32::try_from(index)
            .map_err(|_| IndexerError::Rpc(format!("logIndex {index} out of range")))
    }

    /// Returns the embedded block timestamp, if the provider sent one.
    pub fn block_timestamp_u64(&self) -> Result<Option<u64>, IndexerError> {
        self.block_timestamp.as_deref().map(parse_hex_u64).transpose()
    }

    pub fn tx_hash_b256(&self) -> Result<B256, IndexerError> {
        B256::from_str(&self.tx_hash)
            .map_err(|e| IndexerError::Rpc(format!("invalid transactionHash '{}': {e}", self.tx_hash)))
    }

    pub fn address(&self) -> Result<Address, IndexerError> {
        Address::from_str(&self.address)
            .map_err(|e| IndexerError::Rpc(format!("invalid address '{}': {e}", self.address)))
    }

    /// `(block_number, log_index)` of this log.
    pub fn position(&self) -> Result<EventPosition, IndexerError> {
        Ok(EventPosition {
            block_number: self.block_number_u64()?,
            log_index: self.log_index_u32()?,
        })
    }

    /// Returns `true` if this log was removed by a reorg.
    pub fn is_removed(&self) -> bool {
        self.removed.unwrap_or(false)
    }
}

/// Minimal block header: what the index loop needs to stamp logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub number: u64,
    pub hash: String,
    pub parent_hash: String,
    pub timestamp: u64,
}

/// Trait for fetching EVM data from a JSON-RPC provider.
#[async_trait]
pub trait EvmRpcClient: Send + Sync {
    async fn get_block_number(&self) -> Result<u64, IndexerError>;
    async fn get_block(&self, number: u64) -> Result<Option<BlockSummary>, IndexerError>;
    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        filter: &EventFilter,
    ) -> Result<Vec<RawLog>, IndexerError>;
}

/// EVM fetcher that wraps an `EvmRpcClient` and adds batching logic.
pub struct EvmFetcher<C> {
    client: C,
}

impl<C: EvmRpcClient> EvmFetcher<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Fetch the current chain head block number.
    pub async fn head_block_number(&self) -> Result<u64, IndexerError> {
        self.client.get_block_number().await
    }

    /// Fetch a block summary by number.
    pub async fn block(&self, number: u64) -> Result<Option<BlockSummary>, IndexerError> {
        self.client.get_block(number).await
    }

    /// Fetch all logs in `[from, to]` matching the filter.
    /// Splits into ranges of at most `max_range` blocks.
    pub async fn logs(
        &self,
        from: u64,
        to: u64,
        filter: &EventFilter,
        max_range: u64,
    ) -> Result<Vec<RawLog>, IndexerError> {
        if to < from {
            return Ok(vec![]);
        }
        let max_range = max_range.max(1);
        if to - from < max_range {
            return self.client.get_logs(from, to, filter).await;
        }
        let mut all_logs = Vec::new();
        let mut start = from;
        while start <= to {
            let end = start.saturating_add(max_range - 1).min(to);
            let chunk = self.client.get_logs(start, end, filter).await?;
            all_logs.extend(chunk);
            if end == u64::MAX {
                break;
            }
            start = end + 1;
        }
        Ok(all_logs)
    }
}

/// Parse a hex-encoded quantity (with or without `0x`) to u64.
pub fn parse_hex_u64(s: &str) -> Result<u64, IndexerError> {
    let hex = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(hex, 16)
        .map_err(|e| IndexerError::Rpc(format!("invalid hex quantity '{s}': {e}")))
}

/// Convert a JSON `eth_getBlockByNumber` response to `BlockSummary`.
pub fn block_from_json(v: &Value) -> Option<BlockSummary> {
    Some(BlockSummary {
        number: parse_hex_u64(v["number"].as_str()?).ok()?,
        hash: v["hash"].as_str()?.to_string(),
        parent_hash: v["parentHash"].as_str()?.to_string(),
        timestamp: parse_hex_u64(v["timestamp"].as_str()?).ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(block: &str, index: &str) -> RawLog {
        RawLog {
            address: format!("{:#x}", Address::repeat_byte(0x11)),
            topics: vec![],
            data: "0x".into(),
            block_number: block.into(),
            block_hash: "0x0".into(),
            block_timestamp: None,
            tx_hash: format!("{}", B256::repeat_byte(0x22)),
            log_index: index.into(),
            removed: None,
        }
    }

    #[test]
    fn parse_hex_u64_basic() {
        assert_eq!(parse_hex_u64("0x1").unwrap(), 1);
        assert_eq!(parse_hex_u64("0xff").unwrap(), 255);
        assert_eq!(parse_hex_u64("1234").unwrap(), 0x1234);
        assert!(parse_hex_u64("0xzz").is_err());
        assert!(parse_hex_u64("").is_err());
    }

    #[test]
    fn raw_log_block_number() {
        let l = log("0x12a05f200", "0x5"); // 5_000_000_000
        assert_eq!(l.block_number_u64().unwrap(), 5_000_000_000);
        assert_eq!(l.log_index_u32().unwrap(), 5);
        assert_eq!(l.tx_hash_b256().unwrap(), B256::repeat_byte(0x22));
        assert_eq!(l.address().unwrap(), Address::repeat_byte(0x11));
        assert!(!l.is_removed());
    }

    #[test]
    fn raw_log_rejects_oversized_log_index() {
        assert!(log("0x1", "0x1ffffffff").log_index_u32().is_err());
    }

    #[test]
    fn raw_log_deserializes_rpc_shape() {
        let json = serde_json::json!({
            "address": "0xb1686a2c0ee7ebcf9aea3883bcb652d39f881727",
            "topics": [],
            "data": "0x",
            "blockNumber": "0x10",
            "blockHash": "0xab",
            "blockTimestamp": "0x6553f100",
            "transactionHash": format!("{}", B256::repeat_byte(1)),
            "logIndex": "0x0",
            "removed": false
        });
        let l: RawLog = serde_json::from_value(json).unwrap();
        assert_eq!(l.block_timestamp_u64().unwrap(), Some(1_700_000_000));
        assert_eq!(l.position().unwrap().block_number, 16);
    }

    #[test]
    fn block_summary_from_json() {
        let v = serde_json::json!({
            "number": "0x10",
            "hash": "0xaa",
            "parentHash": "0xbb",
            "timestamp": "0x64",
            "transactions": []
        });
        let b = block_from_json(&v).unwrap();
        assert_eq!(b.number, 16);
        assert_eq!(b.timestamp, 100);
        assert!(block_from_json(&serde_json::json!({})).is_none());
    }
}
