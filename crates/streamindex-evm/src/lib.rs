//! streamindex-evm: StreamPayment ABI decoding, EVM log fetching and the
//! index loop.

pub mod abi;
pub mod builder;
pub mod decoder;
pub mod fetcher;
pub mod index_loop;
pub mod replay;

pub use abi::{keccak256_signature, EventAbi, STREAM_PAYMENT_EVENTS};
pub use builder::{IndexerBuilder, Network};
pub use decoder::{DecodeError, EvmDecoder};
pub use fetcher::{BlockSummary, EvmFetcher, EvmRpcClient, RawLog};
pub use index_loop::IndexLoop;
pub use replay::RecordedChain;
