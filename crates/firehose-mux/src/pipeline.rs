//! Per-event pipeline: dedupe → heartbeat filter → timestamp normalization
//! → source tagging.
//!
//! Pure and clock-free: callers pass `now_ms`, so the whole decision path is
//! testable without a runtime.

use firehose_core::dedupe::DedupeCache;
use firehose_core::dedupe_key::dedupe_key;
use firehose_core::heartbeat::HeartbeatTracker;
use firehose_core::types::{RawEvent, SourceKind};
use serde::{Deserialize, Serialize};

use crate::config::{MuxConfig, MuxConfigPatch};

// ─── Output Types ────────────────────────────────────────────────────

/// Event as republished to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MuxEvent {
    /// Normalized event; `timestamp` is always set.
    #[serde(flatten)]
    pub event: RawEvent,
    /// Transport that delivered this copy.
    pub source: SourceKind,
    /// Relay only: the timestamp exactly as delivered, before normalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_original_timestamp: Option<i64>,
}

impl MuxEvent {
    /// Normalized timestamp (epoch ms).
    pub fn timestamp(&self) -> i64 {
        self.event.timestamp.unwrap_or_default()
    }
}

/// Top-level fields written by [`MuxEvent`] next to the flattened event.
const MUX_TAG_FIELDS: [&str; 2] = ["source", "relay_original_timestamp"];

/// Outcome of running one event through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Emit(MuxEvent),
    /// Same business identity seen within the dedupe window.
    Duplicate,
    /// Relay heartbeat while `ignore_relay_heartbeats` is set.
    RelayHeartbeat,
    /// Heartbeat id already tracked.
    RepeatedHeartbeat,
}

/// Running counters, exposed via [`crate::FirehoseMux::stats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuxStats {
    pub received: u64,
    pub emitted: u64,
    pub duplicates_dropped: u64,
    pub heartbeats_dropped: u64,
    pub timestamps_corrected: u64,
}

// ─── Pipeline ───────────────────────────────────────────────────────

#[derive(Debug)]
pub struct MuxPipeline {
    config: MuxConfig,
    dedupe: DedupeCache<String>,
    heartbeats: HeartbeatTracker,
    stats: MuxStats,
}

impl MuxPipeline {
    pub fn new(config: MuxConfig) -> Self {
        Self {
            dedupe: DedupeCache::new(config.dedupe_window_ms, config.dedupe_max_entries),
            heartbeats: HeartbeatTracker::new(),
            stats: MuxStats::default(),
            config,
        }
    }

    /// Run `event` from `origin` through the pipeline at time `now_ms`.
    pub fn process(&mut self, origin: SourceKind, mut event: RawEvent, now_ms: i64) -> Verdict {
        self.stats.received += 1;

        // 1–2. Content-identity dedupe.
        let key = dedupe_key(&event);
        if self.dedupe.seen(key, clamp_now(now_ms)) {
            self.stats.duplicates_dropped += 1;
            return Verdict::Duplicate;
        }

        // 3. Heartbeat filtering, keyed on event_id.
        if event.is_heartbeat() {
            if self.config.ignore_relay_heartbeats && origin == SourceKind::Relay {
                self.stats.heartbeats_dropped += 1;
                return Verdict::RelayHeartbeat;
            }
            if !self.heartbeats.record(&event.event_id) {
                self.stats.heartbeats_dropped += 1;
                return Verdict::RepeatedHeartbeat;
            }
        }

        // 4. Timestamp normalization.
        let relay_original_timestamp = match origin {
            SourceKind::Relay => {
                let original = event.timestamp;
                let trusted = event
                    .effective_timestamp()
                    .filter(|ts| ts.abs_diff(now_ms) <= self.config.relay_skew_tolerance_ms);
                if trusted.is_none() {
                    event.timestamp = Some(now_ms);
                    self.stats.timestamps_corrected += 1;
                }
                original
            }
            SourceKind::Remote => {
                if event.effective_timestamp().is_none() {
                    event.timestamp = Some(now_ms);
                    self.stats.timestamps_corrected += 1;
                }
                None
            }
        };

        // 5. Tag with origin. Our tags replace any upstream fields of the
        // same name.
        for reserved in MUX_TAG_FIELDS {
            event.extra.remove(reserved);
        }
        self.stats.emitted += 1;
        Verdict::Emit(MuxEvent {
            event,
            source: origin,
            relay_original_timestamp,
        })
    }

    pub fn update_config(&mut self, patch: &MuxConfigPatch) {
        self.config.apply(patch);
    }

    pub fn config(&self) -> &MuxConfig {
        &self.config
    }

    pub fn stats(&self) -> MuxStats {
        self.stats
    }

    pub fn dedupe_len(&self) -> usize {
        self.dedupe.len()
    }

    pub fn heartbeat_len(&self) -> usize {
        self.heartbeats.len()
    }

    /// Drop all remembered keys and heartbeat ids.
    pub fn clear(&mut self) {
        self.dedupe.clear();
        self.heartbeats.clear();
    }
}

/// The dedupe cache measures age on an unsigned clock; pre-epoch clocks
/// collapse to zero.
fn clamp_now(now_ms: i64) -> u64 {
    u64::try_from(now_ms).unwrap_or(0)
}

// ─── Tests ───────────────────────────────────────────────────────────
