//! Errors surfaced by [`crate::FirehoseMux`] operations.

use firehose_core::SourceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MuxError {
    /// The multiplexer was torn down with `disconnect()`.
    #[error("multiplexer is disconnected")]
    Disconnected,

    #[error(transparent)]
    Source(#[from] SourceError),
}
