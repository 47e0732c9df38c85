//! firehose-source-remote: WebSocket client for the remote firehose.
//!
//! Reconnects with exponential backoff, decodes text and binary frames into
//! raw events, and supports upgrading to a private per-user stream.

pub mod source;
pub mod translate;

pub use source::{PrivateCredentials, RemoteSource, RemoteSourceConfig};
