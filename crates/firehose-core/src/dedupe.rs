//! Bounded, time-windowed "have I seen this key recently?" set.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// Default duplicate window (30 s).
pub const DEFAULT_WINDOW_MS: u64 = 30_000;

/// Default capacity ceiling.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

// ─── DedupeCache ──────────────────────────────────────────────────

/// Remembers keys for `window_ms` and never holds more than `max_entries`.
///
/// Insertion order doubles as age order, so both expiry and capacity
/// eviction pop from the front of `order`. A key re-recorded after expiring
/// leaves a stale entry in `order`; stale entries are recognized by their
/// timestamp no longer matching the live one in `entries`.
#[derive(Debug, Clone)]
pub struct DedupeCache<T> {
    /// Live keys and the time they were recorded.
    entries: HashMap<T, u64>,
    /// `(key, inserted_at_ms)` in insertion order.
    order: VecDeque<(T, u64)>,
    window_ms: u64,
    max_entries: usize,
}

impl<T: Hash + Eq + Clone> DedupeCache<T> {
    /// `max_entries` of zero is treated as one.
    pub fn new(window_ms: u64, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            window_ms,
            max_entries: max_entries.max(1),
        }
    }

    /// Atomic check-and-insert.
    ///
    /// Returns `true` if `key` was recorded within the last `window_ms`.
    /// Otherwise records it at `now_ms` and returns `false`.
    pub fn seen(&mut self, key: T, now_ms: u64) -> bool {
        self.purge_expired(now_ms);

        if let Some(&inserted_at) = self.entries.get(&key) {
            if now_ms.saturating_sub(inserted_at) < self.window_ms {
                return true;
            }
            // Expired but not yet purged (clock went backwards for an
            // older neighbour); fall through and re-record.
            self.entries.remove(&key);
        }

        // Capacity takes precedence over the time window.
        while self.entries.len() >= self.max_entries {
            if !self.evict_oldest() {
                break;
            }
        }

        self.entries.insert(key.clone(), now_ms);
        self.order.push_back((key, now_ms));
        false
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    fn purge_expired(&mut self, now_ms: u64) {
        while let Some((_, inserted_at)) = self.order.front() {
            if now_ms.saturating_sub(*inserted_at) < self.window_ms {
                break;
            }
            self.evict_oldest();
        }
    }

    /// Pop the front of `order`, removing the key from `entries` only if the
    /// entry is still the live one. Returns `false` when `order` is empty.
    fn evict_oldest(&mut self) -> bool {
        let Some((key, inserted_at)) = self.order.pop_front() else {
            return false;
        };
        if self.entries.get(&key) == Some(&inserted_at) {
            self.entries.remove(&key);
        }
        true
    }
}

impl<T: Hash + Eq + Clone> Default for DedupeCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MS, DEFAULT_MAX_ENTRIES)
    }
}

// ─── Tests ────────────────────────────────────────────────────────
