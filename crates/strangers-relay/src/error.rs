//! Relay error types.

/// Errors raised by the relay's own plumbing.
///
/// Failures of best-effort collaborators (directory writes, pushes) are
/// logged where they happen and never reach a client.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("push error: {0}")]
    Push(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
