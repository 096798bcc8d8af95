//! Error types for strangers-core.

use thiserror::Error;

/// Errors raised while accepting client input.
///
/// Protocol no-ops (unknown message ids, rejoining a missing session,
/// duplicate enqueues) are not errors; they are absorbed by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("message has no id")]
    MissingMessageId,

    #[error("malformed chat payload: {0}")]
    MalformedChat(String),
}

/// Result type alias for strangers-core operations.
pub type Result<T> = std::result::Result<T, Error>;
