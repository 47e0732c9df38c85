//! Multiplexer configuration.

use std::time::Duration;

use firehose_core::dedupe::{DEFAULT_MAX_ENTRIES, DEFAULT_WINDOW_MS};
use serde::{Deserialize, Serialize};

/// Relay timestamps further than this from "now" are replaced (60 s).
pub const DEFAULT_RELAY_SKEW_TOLERANCE_MS: u64 = 60_000;

/// Period of the unconditional status re-emission (5 s).
pub const DEFAULT_STATUS_INTERVAL_MS: u64 = 5_000;

/// Construction-time configuration for [`crate::FirehoseMux`].
///
/// Values are not validated; they take effect as given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    /// Drop heartbeats delivered by the relay source.
    pub ignore_relay_heartbeats: bool,
    pub dedupe_window_ms: u64,
    pub dedupe_max_entries: usize,
    pub relay_skew_tolerance_ms: u64,
    pub status_interval_ms: u64,
}

impl MuxConfig {
    pub fn status_interval(&self) -> Duration {
        Duration::from_millis(self.status_interval_ms)
    }

    /// Merge a partial update into this configuration.
    pub fn apply(&mut self, patch: &MuxConfigPatch) {
        if let Some(ignore) = patch.ignore_relay_heartbeats {
            self.ignore_relay_heartbeats = ignore;
        }
    }
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            ignore_relay_heartbeats: true,
            dedupe_window_ms: DEFAULT_WINDOW_MS,
            dedupe_max_entries: DEFAULT_MAX_ENTRIES,
            relay_skew_tolerance_ms: DEFAULT_RELAY_SKEW_TOLERANCE_MS,
            status_interval_ms: DEFAULT_STATUS_INTERVAL_MS,
        }
    }
}

/// Partial update for the heartbeat-filtering configuration, applied with
/// [`crate::FirehoseMux::update_config`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuxConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_relay_heartbeats: Option<bool>,
}
