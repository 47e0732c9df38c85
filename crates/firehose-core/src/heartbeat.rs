//! Bounded set of recently seen heartbeat ids.

use std::collections::{HashSet, VecDeque};

/// Size at which the tracker trims itself.
pub const HEARTBEAT_CAP: usize = 100;

/// Number of most recent ids kept after a trim.
pub const HEARTBEAT_TRIM_TO: usize = 50;

/// Recently seen heartbeat `event_id`s, capped at [`HEARTBEAT_CAP`].
///
/// Exceeding the cap trims back to the [`HEARTBEAT_TRIM_TO`] most recently
/// inserted ids in one step rather than evicting one at a time.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatTracker {
    ids: HashSet<String>,
    /// Insertion order, oldest first.
    order: VecDeque<String>,
}

impl HeartbeatTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.ids.contains(event_id)
    }

    /// Record `event_id`. Returns `true` if it was not already tracked.
    pub fn record(&mut self, event_id: &str) -> bool {
        if !self.ids.insert(event_id.to_owned()) {
            return false;
        }
        self.order.push_back(event_id.to_owned());

        if self.order.len() > HEARTBEAT_CAP {
            let excess = self.order.len() - HEARTBEAT_TRIM_TO;
            for id in self.order.drain(..excess) {
                self.ids.remove(&id);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Tracked ids, oldest first.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.ids.clear();
        self.order.clear();
    }
}
