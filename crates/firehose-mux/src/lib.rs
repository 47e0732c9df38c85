//! firehose-mux: merges the remote and relay event sources into a single
//! deduplicated, heartbeat-filtered, timestamp-normalized feed and publishes
//! combined connection status.

pub mod config;
pub mod error;
pub mod mux;
pub mod pipeline;

pub use config::{MuxConfig, MuxConfigPatch};
pub use error::MuxError;
pub use mux::FirehoseMux;
pub use pipeline::{MuxEvent, MuxPipeline, MuxStats, Verdict};

pub use firehose_core::types;
