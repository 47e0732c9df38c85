//! firehose-core: shared types and building blocks for the dual-source
//! event multiplexer: the raw event model, source contracts, subscriber
//! registry, dedupe cache, heartbeat tracker and dedupe-key derivation.

pub mod backoff;
pub mod clock;
pub mod dedupe;
pub mod dedupe_key;
pub mod error;
pub mod heartbeat;
pub mod source;
pub mod subscription;
pub mod types;

pub use error::SourceError;
pub use source::{RemoteStreamSource, StreamSource};
pub use subscription::{
    ErrorHandler, EventHandler, Handler, Listeners, StatusHandler, Subscription,
};
pub use types::{ConnectionStatus, EventPayload, RawEvent, SourceKind};
