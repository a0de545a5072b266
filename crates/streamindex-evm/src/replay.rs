//! A recorded chain: an [`EvmRpcClient`] backed by logs and block headers
//! captured ahead of time (an `eth_getLogs` dump, a test fixture).
//!
//! Lets the index loop run offline with the same filtering and batching it
//! uses against a live node.

use alloy_primitives::{Address, B256};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

use streamindex_core::error::IndexerError;
use streamindex_core::types::EventFilter;

use crate::fetcher::{block_from_json, BlockSummary, EvmRpcClient, RawLog};

/// On-disk shape of a recording: either a bare array of logs, or an object
/// carrying the logs plus the block headers used to stamp them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Recording {
    Logs(Vec<RawLog>),
    Full {
        logs: Vec<RawLog>,
        #[serde(default)]
        blocks: Vec<Value>,
    },
}

/// In-memory chain serving recorded logs.
#[derive(Debug, Clone, Default)]
pub struct RecordedChain {
    logs: Vec<RawLog>,
    blocks: BTreeMap<u64, BlockSummary>,
    head: u64,
}

impl RecordedChain {
    pub fn new(logs: Vec<RawLog>) -> Self {
        let mut chain = Self::default();
        for log in logs {
            chain.push_log(log);
        }
        chain
    }

    /// Parse a recording from JSON text.
    pub fn from_json(text: &str) -> Result<Self, IndexerError> {
        let (logs, blocks) = match serde_json::from_str::<Recording>(text)
            .map_err(|e| IndexerError::Decode(format!("invalid log recording: {e}")))?
        {
            Recording::Logs(logs) => (logs, Vec::new()),
            Recording::Full { logs, blocks } => (logs, blocks),
        };
        let mut chain = Self::new(logs);
        for raw in &blocks {
            let block = block_from_json(raw)
                .ok_or_else(|| IndexerError::Decode(format!("invalid block header: {raw}")))?;
            chain.push_block(block);
        }
        Ok(chain)
    }

    pub fn push_log(&mut self, log: RawLog) {
        if let Ok(n) = log.block_number_u64() {
            self.head = self.head.max(n);
        }
        self.logs.push(log);
    }

    pub fn push_block(&mut self, block: BlockSummary) {
        self.head = self.head.max(block.number);
        self.blocks.insert(block.number, block);
    }

    /// Highest block seen in the recording.
    pub fn head(&self) -> u64 {
        self.head
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}

fn log_matches(log: &RawLog, from: u64, to: u64, filter: &EventFilter) -> Result<bool, IndexerError> {
    let n = log.block_number_u64()?;
    if n < from || n > to {
        return Ok(false);
    }
    if !filter.addresses.is_empty() {
        match Address::from_str(&log.address) {
            Ok(a) if filter.matches_address(&a) => {}
            _ => return Ok(false),
        }
    }
    if !filter.topic0_values.is_empty() {
        let topic0 = log.topics.first().and_then(|t| B256::from_str(t).ok());
        match topic0 {
            Some(t) if filter.matches_topic0(&t) => {}
            _ => return Ok(false),
        }
    }
    Ok(true)
}

#[async_trait]
impl EvmRpcClient for RecordedChain {
    async fn get_block_number(&self) -> Result<u64, IndexerError> {
        Ok(self.head)
    }

    async fn get_block(&self, number: u64) -> Result<Option<BlockSummary>, IndexerError> {
        Ok(self.blocks.get(&number).cloned())
    }

    async fn get_logs(
        &self,
        from: u64,
        to: u64,
        filter: &EventFilter,
    ) -> Result<Vec<RawLog>, IndexerError> {
        let mut out = Vec::new();
        for log in &self.logs {
            if log_matches(log, from, to, filter)? {
                out.push(log.clone());
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log(block: u64, address: Address, topic0: B256) -> RawLog {
        RawLog {
            address: format!("{address:#x}"),
            topics: vec![topic0.to_string()],
            data: "0x".into(),
            block_number: format!("{block:#x}"),
            block_hash: String::new(),
            block_timestamp: None,
            tx_hash: B256::repeat_byte(block as u8).to_string(),
            log_index: "0x0".into(),
            removed: None,
        }
    }

    #[tokio::test]
    async fn serves_logs_by_range_and_filter() {
        let contract = Address::repeat_byte(0x11);
        let wanted = B256::repeat_byte(0x01);
        let chain = RecordedChain::new(vec![
            log(5, contract, wanted),
            log(6, Address::repeat_byte(0x22), wanted),
            log(7, contract, B256::repeat_byte(0x02)),
            log(9, contract, wanted),
        ]);
        assert_eq!(chain.get_block_number().await.unwrap(), 9);

        let filter = EventFilter {
            addresses: vec![contract],
            topic0_values: vec![wanted],
        };
        let logs = chain.get_logs(0, 8, &filter).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].block_number, "0x5");

        let all = chain.get_logs(0, 100, &EventFilter::default()).await.unwrap();
        assert_eq!(all.len(), 4);
    }

    #[test]
    fn parses_both_recording_shapes() {
        let bare = r#"[]"#;
        assert!(RecordedChain::from_json(bare).unwrap().is_empty());

        let full = r#"{
            "logs": [],
            "blocks": [{ "number": "0x20", "hash": "0x01", "parentHash": "0x00", "timestamp": "0x64" }]
        }"#;
        let chain = RecordedChain::from_json(full).unwrap();
        assert_eq!(chain.head(), 32);
        assert!(RecordedChain::from_json("{").is_err());
    }
}
