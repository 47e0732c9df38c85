//! Error types shared by the source adapters and the multiplexer.

use thiserror::Error;

/// Transport-level failure reported by a source.
///
/// The multiplexer forwards these verbatim; it never interprets them.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("connection to {endpoint} failed: {detail}")]
    Connect { endpoint: String, detail: String },

    #[error("connection closed: {0}")]
    Closed(String),

    #[error("malformed event payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("transport io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid private connection request: {0}")]
    InvalidCredentials(String),

    #[error("transport error: {0}")]
    Transport(String),
}
