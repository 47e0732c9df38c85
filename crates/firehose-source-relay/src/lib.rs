//! firehose-source-relay: client for the local relay process.
//!
//! The relay speaks newline-delimited JSON over a Unix socket (or loopback
//! TCP). The adapter reconnects with backoff and pushes connectivity changes.

pub mod endpoint;
pub mod source;
pub mod translate;

pub use endpoint::{InvalidRelayEndpoint, RelayEndpoint};
pub use source::{RelaySource, RelaySourceConfig};
