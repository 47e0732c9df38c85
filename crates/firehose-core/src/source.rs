//! Contracts the multiplexer expects from its upstream sources.

use crate::error::SourceError;
use crate::subscription::{ErrorHandler, EventHandler, StatusHandler, Subscription};

/// An independently connected stream of [`crate::types::RawEvent`]s.
///
/// Implementations own their transport and their reconnect policy; callers
/// only observe events, errors and connectivity.
pub trait StreamSource: Send + Sync {
    /// Register a handler for every raw event received from the transport.
    fn subscribe(&self, handler: EventHandler) -> Subscription;

    /// Register a handler for transport errors.
    fn on_error(&self, handler: ErrorHandler) -> Subscription;

    fn is_connected(&self) -> bool;

    /// Push notification of connectivity changes. `None` when the source
    /// only supports polling via [`Self::is_connected`].
    fn on_status_change(&self, _handler: StatusHandler) -> Option<Subscription> {
        None
    }
}

/// The remote source additionally supports a user-scoped connection.
pub trait RemoteStreamSource: StreamSource {
    /// Upgrade to a private per-user stream authenticated by `token`.
    fn connect_private(&self, user_id: &str, token: &str) -> Result<(), SourceError>;

    /// Drop the per-user stream. No-op for sources without one.
    fn disconnect_user(&self) {}
}
