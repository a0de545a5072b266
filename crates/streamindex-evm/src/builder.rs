//! Fluent builder API for creating StreamPayment indexers.
//!
//! # Example
//!
//! ```rust,no_run
//! use streamindex_evm::{IndexerBuilder, Network};
//!
//! let config = IndexerBuilder::new()
//!     .network(Network::BaseSepolia)
//!     .from_block(19_000_000)
//!     .confirmation_depth(12)
//!     .batch_size(500)
//!     .build_config();
//! ```

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use streamindex_core::checkpoint::CheckpointStore;
use streamindex_core::error::IndexerError;
use streamindex_core::indexer::IndexerConfig;
use streamindex_core::store::AggregateStore;

use crate::fetcher::EvmRpcClient;
use crate::index_loop::IndexLoop;

/// Networks the StreamPayment contract is deployed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    PolygonAmoy,
    BaseSepolia,
}

impl Network {
    pub const ALL: [Network; 2] = [Network::PolygonAmoy, Network::BaseSepolia];

    /// Chain slug used in configs and checkpoint keys.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::PolygonAmoy => "polygon-amoy",
            Self::BaseSepolia => "base-sepolia",
        }
    }

    /// EIP-155 chain id.
    pub fn chain_id(&self) -> u64 {
        match self {
            Self::PolygonAmoy => 80_002,
            Self::BaseSepolia => 84_532,
        }
    }

    /// Deployed StreamPayment contract.
    pub fn contract(&self) -> Address {
        match self {
            Self::PolygonAmoy => address!("F739B72738a8D99B6955473E2817d558Ea1fFe10"),
            Self::BaseSepolia => address!("B1686a2c0eE7ebCf9Aea3883BCb652D39F881727"),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Network {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|n| n.slug() == s)
            .ok_or_else(|| IndexerError::Config(format!("unknown network '{s}'")))
    }
}

/// Fluent builder for `IndexerConfig` and the `IndexLoop` that runs it.
#[derive(Default)]
pub struct IndexerBuilder {
    config: IndexerConfig,
}

impl IndexerBuilder {
    pub fn new() -> Self {
        Self {
            config: IndexerConfig::default(),
        }
    }

    /// Start from an existing config (e.g. one loaded from a file).
    pub fn from_config(config: IndexerConfig) -> Self {
        Self { config }
    }

    /// Set the indexer ID (used for checkpoint keys).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.config.id = id.into();
        self
    }

    /// Set the chain slug.
    pub fn chain(mut self, chain: impl Into<String>) -> Self {
        self.config.chain = chain.into();
        self
    }

    /// Set chain slug and contract address for a known deployment.
    pub fn network(mut self, network: Network) -> Self {
        self.config.chain = network.slug().into();
        self.config.contract = network.contract();
        self
    }

    /// Set the StreamPayment contract address.
    pub fn contract(mut self, contract: Address) -> Self {
        self.config.contract = contract;
        self
    }

    /// Set the start block.
    pub fn from_block(mut self, block: u64) -> Self {
        self.config.from_block = block;
        self
    }

    /// Set the end block (for bounded backfill).
    pub fn to_block(mut self, block: u64) -> Self {
        self.config.to_block = Some(block);
        self
    }

    /// Set confirmation depth (blocks behind head before processing).
    pub fn confirmation_depth(mut self, depth: u64) -> Self {
        self.config.confirmation_depth = depth;
        self
    }

    /// Set the number of blocks per `eth_getLogs` batch.
    pub fn batch_size(mut self, size: u64) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set checkpoint save interval (every N blocks).
    pub fn checkpoint_interval(mut self, n: u64) -> Self {
        self.config.checkpoint_interval = n;
        self
    }

    /// Set live mode polling interval in milliseconds.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    /// Enable or disable the duplicate-delivery guard.
    pub fn dedupe_events(mut self, enabled: bool) -> Self {
        self.config.dedupe_events = enabled;
        self
    }

    /// How many recent event ids the duplicate guard remembers.
    pub fn dedupe_window(mut self, size: usize) -> Self {
        self.config.dedupe_window = size;
        self
    }

    /// Build the `IndexerConfig`.
    pub fn build_config(self) -> IndexerConfig {
        self.config
    }

    /// Validate the config and assemble an `IndexLoop` over `client` and `store`.
    pub fn build<C, S>(
        self,
        client: C,
        store: S,
        checkpoints: Box<dyn CheckpointStore>,
    ) -> Result<IndexLoop<C, S>, IndexerError>
    where
        C: EvmRpcClient,
        S: AggregateStore,
    {
        IndexLoop::new(self.config, client, store, checkpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let cfg = IndexerBuilder::new().build_config();
        assert_eq!(cfg.chain, "base-sepolia");
        assert_eq!(cfg.confirmation_depth, 12);
        assert_eq!(cfg.batch_size, 1000);
        assert!(cfg.dedupe_events);
    }

    #[test]
    fn builder_custom() {
        let cfg = IndexerBuilder::new()
            .id("my-indexer")
            .network(Network::PolygonAmoy)
            .from_block(50_000_000)
            .confirmation_depth(32)
            .batch_size(500)
            .dedupe_events(false)
            .build_config();

        assert_eq!(cfg.id, "my-indexer");
        assert_eq!(cfg.chain, "polygon-amoy");
        assert_eq!(cfg.contract, Network::PolygonAmoy.contract());
        assert_eq!(cfg.from_block, 50_000_000);
        assert_eq!(cfg.confirmation_depth, 32);
        assert_eq!(cfg.batch_size, 500);
        assert!(!cfg.dedupe_events);
    }

    #[test]
    fn network_slugs_roundtrip() {
        for n in Network::ALL {
            assert_eq!(n.slug().parse::<Network>().unwrap(), n);
        }
        assert_eq!(Network::BaseSepolia.chain_id(), 84_532);
        assert!("mainnet".parse::<Network>().is_err());
    }
}
