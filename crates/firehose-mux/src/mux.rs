//! FirehoseMux: merges the remote and relay sources into one deduplicated,
//! timestamp-normalized feed and publishes combined connectivity.
//!
//! The multiplexer has no worker of its own. Each event is processed inside
//! the source callback that delivered it; the pipeline state sits behind a
//! single mutex so check-and-insert stays atomic when sources call in from
//! different runtime threads. Handlers are always invoked with every
//! internal lock released.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use firehose_core::clock::now_ms;
use firehose_core::{
    ConnectionStatus, Handler, Listeners, RawEvent, RemoteStreamSource, SourceError, SourceKind,
    StreamSource, Subscription,
};
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::{MuxConfig, MuxConfigPatch};
use crate::error::MuxError;
use crate::pipeline::{MuxEvent, MuxPipeline, MuxStats, Verdict};

// ─── Internals ───────────────────────────────────────────────────────

/// Upstream sources plus our registrations on them. Taken (set to `None`)
/// by `disconnect()`.
struct Wiring {
    remote: Arc<dyn RemoteStreamSource>,
    relay: Arc<dyn StreamSource>,
    subscriptions: Vec<Subscription>,
}

struct Inner {
    pipeline: Mutex<MuxPipeline>,
    wiring: Mutex<Option<Wiring>>,
    events: Listeners<MuxEvent>,
    errors: Listeners<SourceError>,
    status: Listeners<ConnectionStatus>,
    /// Cancels the periodic status task.
    shutdown: CancellationToken,
    disconnected: AtomicBool,
}

impl Inner {
    fn pipeline(&self) -> MutexGuard<'_, MuxPipeline> {
        self.pipeline.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wiring(&self) -> MutexGuard<'_, Option<Wiring>> {
        self.wiring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    fn handle_event(&self, origin: SourceKind, event: &RawEvent) {
        if self.is_disconnected() {
            return;
        }

        let verdict = self.pipeline().process(origin, event.clone(), now_ms());
        match verdict {
            Verdict::Emit(out) => {
                if !self.is_disconnected() {
                    self.events.emit(&out);
                }
            }
            dropped => {
                trace!(
                    source = %origin,
                    session_id = %event.session_id,
                    event_id = %event.event_id,
                    verdict = ?dropped,
                    "event dropped"
                );
            }
        }
    }

    fn handle_error(&self, origin: SourceKind, error: &SourceError) {
        if self.is_disconnected() {
            return;
        }
        debug!(source = %origin, "forwarding source error: {error}");
        self.errors.emit(error);
    }

    /// Snapshot both sources' connectivity. Both flags are false once
    /// disconnected.
    fn status(&self) -> ConnectionStatus {
        let (remote, relay) = match self.wiring().as_ref() {
            Some(w) => (Arc::clone(&w.remote), Arc::clone(&w.relay)),
            None => return ConnectionStatus::default(),
        };
        ConnectionStatus {
            remote_connected: remote.is_connected(),
            relay_connected: relay.is_connected(),
        }
    }

    fn emit_status(&self) {
        if self.is_disconnected() {
            return;
        }
        let status = self.status();
        self.status.emit(&status);
    }
}

// ─── FirehoseMux ─────────────────────────────────────────────────────

/// Merged event feed over one remote and one relay source.
///
/// Active from construction until [`Self::disconnect`], which is terminal.
/// Reconnection is entirely the sources' concern.
pub struct FirehoseMux {
    inner: Arc<Inner>,
}

impl FirehoseMux {
    /// Subscribe to both sources and start publishing status.
    ///
    /// The periodic status task is spawned on the current Tokio runtime; when
    /// constructed outside a runtime only push and on-demand status are
    /// available.
    pub fn new(
        remote: Arc<dyn RemoteStreamSource>,
        relay: Arc<dyn StreamSource>,
        config: MuxConfig,
    ) -> Self {
        let status_interval = config.status_interval();
        let inner = Arc::new(Inner {
            pipeline: Mutex::new(MuxPipeline::new(config)),
            wiring: Mutex::new(None),
            events: Listeners::new(),
            errors: Listeners::new(),
            status: Listeners::new(),
            shutdown: CancellationToken::new(),
            disconnected: AtomicBool::new(false),
        });

        let mut subscriptions = Vec::with_capacity(6);
        subscriptions.push(remote.subscribe(event_handler(&inner, SourceKind::Remote)));
        subscriptions.push(remote.on_error(error_handler(&inner, SourceKind::Remote)));
        subscriptions.push(relay.subscribe(event_handler(&inner, SourceKind::Relay)));
        subscriptions.push(relay.on_error(error_handler(&inner, SourceKind::Relay)));
        subscriptions.extend(remote.on_status_change(status_handler(&inner, SourceKind::Remote)));
        subscriptions.extend(relay.on_status_change(status_handler(&inner, SourceKind::Relay)));

        *inner.wiring() = Some(Wiring {
            remote,
            relay,
            subscriptions,
        });

        spawn_status_ticker(&inner, status_interval);
        inner.emit_status();
        info!("firehose mux active");

        Self { inner }
    }

    /// Register a consumer of the merged event feed.
    pub fn subscribe(&self, handler: impl Fn(&MuxEvent) + Send + Sync + 'static) -> Subscription {
        if self.inner.is_disconnected() {
            return Subscription::noop();
        }
        self.inner.events.add(Arc::new(handler))
    }

    /// Register a consumer of errors forwarded from either source.
    pub fn on_error(
        &self,
        handler: impl Fn(&SourceError) + Send + Sync + 'static,
    ) -> Subscription {
        if self.inner.is_disconnected() {
            return Subscription::noop();
        }
        self.inner.errors.add(Arc::new(handler))
    }

    /// Register a consumer of combined connectivity snapshots. The handler
    /// is called with the current snapshot right away.
    pub fn on_status(
        &self,
        handler: impl Fn(&ConnectionStatus) + Send + Sync + 'static,
    ) -> Subscription {
        if self.inner.is_disconnected() {
            return Subscription::noop();
        }
        let handler: Handler<ConnectionStatus> = Arc::new(handler);
        let subscription = self.inner.status.add(Arc::clone(&handler));
        handler(&self.inner.status());
        subscription
    }

    /// Upgrade the remote source to a private per-user stream.
    pub fn connect_private(&self, user_id: &str, token: &str) -> Result<(), MuxError> {
        let remote = self.remote().ok_or(MuxError::Disconnected)?;
        remote.connect_private(user_id, token)?;
        Ok(())
    }

    /// Drop the remote per-user stream, if the remote source supports it.
    pub fn disconnect_user(&self) {
        if let Some(remote) = self.remote() {
            remote.disconnect_user();
        }
    }

    /// Synchronous snapshot; never cached.
    pub fn status(&self) -> ConnectionStatus {
        self.inner.status()
    }

    /// True while at least one source is connected.
    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Merge into the heartbeat-filtering configuration; applies from the
    /// next event on.
    pub fn update_config(&self, patch: MuxConfigPatch) {
        self.inner.pipeline().update_config(&patch);
    }

    pub fn config(&self) -> MuxConfig {
        self.inner.pipeline().config().clone()
    }

    pub fn stats(&self) -> MuxStats {
        self.inner.pipeline().stats()
    }

    pub fn is_disconnected(&self) -> bool {
        self.inner.is_disconnected()
    }

    /// Tear down: release source registrations, stop the status task,
    /// clear caches and subscribers. Subsequent calls are no-ops.
    pub fn disconnect(&self) {
        if self.inner.disconnected.swap(true, Ordering::AcqRel) {
            return;
        }

        let wiring = self.inner.wiring().take();
        if let Some(wiring) = wiring {
            for subscription in wiring.subscriptions {
                subscription.unsubscribe();
            }
        }
        self.inner.shutdown.cancel();
        self.inner.pipeline().clear();
        self.inner.events.clear();
        self.inner.errors.clear();
        self.inner.status.clear();
        info!("firehose mux disconnected");
    }

    fn remote(&self) -> Option<Arc<dyn RemoteStreamSource>> {
        self.inner
            .wiring()
            .as_ref()
            .map(|w| Arc::clone(&w.remote))
    }
}

impl Drop for FirehoseMux {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for FirehoseMux {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirehoseMux")
            .field("disconnected", &self.inner.is_disconnected())
            .field("subscribers", &self.inner.events.len())
            .finish_non_exhaustive()
    }
}

// ─── Source Callbacks ────────────────────────────────────────────────

// Sources only ever hold weak references back into the multiplexer.

fn event_handler(inner: &Arc<Inner>, origin: SourceKind) -> Handler<RawEvent> {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    Arc::new(move |event: &RawEvent| {
        if let Some(inner) = weak.upgrade() {
            inner.handle_event(origin, event);
        }
    })
}

fn error_handler(inner: &Arc<Inner>, origin: SourceKind) -> Handler<SourceError> {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    Arc::new(move |error: &SourceError| {
        if let Some(inner) = weak.upgrade() {
            inner.handle_error(origin, error);
        }
    })
}

fn status_handler(inner: &Arc<Inner>, origin: SourceKind) -> Handler<bool> {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    Arc::new(move |connected: &bool| {
        if let Some(inner) = weak.upgrade() {
            debug!(source = %origin, connected = *connected, "source status changed");
            inner.emit_status();
        }
    })
}

fn spawn_status_ticker(inner: &Arc<Inner>, period: std::time::Duration) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        warn!("no tokio runtime: periodic status emission disabled");
        return;
    };
    if period.is_zero() {
        warn!("status interval is zero: periodic status emission disabled");
        return;
    }

    let weak = Arc::downgrade(inner);
    let cancel = inner.shutdown.clone();
    handle.spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let Some(inner) = weak.upgrade() else { break };
                    inner.emit_status();
                }
            }
        }
    });
}
