//! Callback registry used by sources and the multiplexer to fan values out
//! to subscribers, plus the [`Subscription`] guard returned on registration.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use crate::error::SourceError;
use crate::types::RawEvent;

/// Shared callback invoked with a borrowed value.
pub type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

pub type EventHandler = Handler<RawEvent>;
pub type ErrorHandler = Handler<SourceError>;
/// Receives the source's new connectivity (`true` = connected).
pub type StatusHandler = Handler<bool>;

// ─── Subscription ─────────────────────────────────────────────────

/// Registration guard. Dropping it (or calling [`Self::unsubscribe`])
/// removes exactly the registration it was returned for.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to release.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

// ─── Listeners ────────────────────────────────────────────────────

struct Registry<T> {
    next_id: u64,
    /// Registration order is delivery order.
    handlers: Vec<(u64, Handler<T>)>,
}

/// Ordered set of handlers for one channel (events, errors or status).
///
/// Emission snapshots the handler list and releases the lock before
/// invoking anything, so a handler may register or unsubscribe re-entrantly.
pub struct Listeners<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T: 'static> Listeners<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                handlers: Vec::new(),
            })),
        }
    }

    pub fn add(&self, handler: Handler<T>) -> Subscription {
        let id = {
            let mut registry = lock(&self.registry);
            let id = registry.next_id;
            registry.next_id = registry.next_id.wrapping_add(1);
            registry.handlers.push((id, handler));
            id
        };

        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        Subscription::new(move || {
            if let Some(registry) = weak.upgrade() {
                lock(&registry).handlers.retain(|(hid, _)| *hid != id);
            }
        })
    }

    /// Invoke every registered handler with `value`. Returns the number of
    /// handlers called.
    pub fn emit(&self, value: &T) -> usize {
        let snapshot: Vec<Handler<T>> = lock(&self.registry)
            .handlers
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in &snapshot {
            handler(value);
        }
        snapshot.len()
    }

    pub fn len(&self) -> usize {
        lock(&self.registry).handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.registry).handlers.clear();
    }
}

impl<T: 'static> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Listeners<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
        }
    }
}

fn lock<T>(registry: &Mutex<Registry<T>>) -> std::sync::MutexGuard<'_, Registry<T>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

// ─── Tests ────────────────────────────────────────────────────────
