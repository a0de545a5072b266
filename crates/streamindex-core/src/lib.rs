//! streamindex-core: event-sourced state for the StreamPayment contract.
//!
//! # Architecture
//!
//! ```text
//! LoggedEvent (ordered, deduplicated)
//!     └── StreamIndexer
//!             ├── Deduplicator      (idempotency guard by tx hash + log index)
//!             ├── handler::apply    (one transition per ContractEvent variant)
//!             └── AggregateStore    (one atomic Commit per log: aggregates + record)
//!                     └── query / projection (read side)
//! ```

pub mod checkpoint;
pub mod dedupe;
pub mod entity;
pub mod error;
pub mod event;
pub mod handler;
pub mod indexer;
pub mod ordering;
pub mod projection;
pub mod query;
pub mod store;
pub mod types;

pub use checkpoint::{Checkpoint, CheckpointManager, CheckpointStore};
pub use entity::{Anomaly, AnomalyRecord, Creator, EventRecord, Stream};
pub use error::IndexerError;
pub use event::{ContractEvent, EventKind, LoggedEvent};
pub use handler::{apply, HandlerOutcome};
pub use indexer::{IndexerConfig, IndexerState, IndexerStats, StreamIndexer};
pub use ordering::OrderedEvents;
pub use store::{AggregateStore, Commit, ReadStore};
pub use types::{EventFilter, EventId, EventMeta, EventPosition, Page};
