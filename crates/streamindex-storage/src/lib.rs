//! streamindex-storage: storage backends for StreamIndex aggregates.
//!
//! Backends:
//! - [`memory`]: in-memory (replays, tests, no persistence)
//! - [`sqlite`]: SQLite via `sqlx` (embedded, single-file persistence)

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::InMemoryStore;
