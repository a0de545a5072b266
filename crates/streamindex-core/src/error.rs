//! Error types for the streamindex pipeline.

use thiserror::Error;

/// Errors that can occur during indexing.
///
/// Consistency faults in the event log (a stop for an unknown stream, a
/// duplicate stop, ...) are *not* errors: handlers record them as
/// [`Anomaly`](crate::entity::Anomaly) values and keep going. Only
/// infrastructure failures surface here.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Handler error in '{handler}': {reason}")]
    Handler { handler: String, reason: String },
}

impl IndexerError {
    /// Returns `true` if retrying the same block range may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Rpc(_) | Self::Storage(_))
    }
}

impl From<serde_json::Error> for IndexerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(format!("serialization: {e}"))
    }
}
