use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use firehose_core::backoff::{Backoff, DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF};
use firehose_core::{
    ErrorHandler, EventHandler, Listeners, RawEvent, RemoteStreamSource, SourceError,
    StatusHandler, StreamSource, Subscription,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_util::sync::CancellationToken;

use crate::translate::{Decoded, decode_binary_frame, decode_frame};

// ─── Configuration ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSourceConfig {
    /// `ws://` or `wss://` endpoint of the firehose.
    pub url: String,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RemoteSourceConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

/// Identity for the private per-user stream.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateCredentials {
    pub user_id: String,
    pub token: String,
}

impl std::fmt::Debug for PrivateCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateCredentials")
            .field("user_id", &self.user_id)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl PrivateCredentials {
    fn validate(user_id: &str, token: &str) -> Result<Self, SourceError> {
        if user_id.trim().is_empty() {
            return Err(SourceError::InvalidCredentials("empty user id".into()));
        }
        if token.trim().is_empty() {
            return Err(SourceError::InvalidCredentials("empty token".into()));
        }
        HeaderValue::from_str(&bearer(token)).map_err(|_| {
            SourceError::InvalidCredentials("token is not a valid header value".into())
        })?;
        Ok(Self {
            user_id: user_id.to_owned(),
            token: token.to_owned(),
        })
    }
}

// ─── Shared State ───────────────────────────────────────────────────

/// State reachable from both the public handle and the connection task.
struct Shared {
    events: Listeners<RawEvent>,
    errors: Listeners<SourceError>,
    status: Listeners<bool>,
    connected: AtomicBool,
    cancel: CancellationToken,
}

impl Shared {
    /// Status listeners only hear about actual transitions. Once shut down
    /// the source never reports itself connected again.
    fn set_connected(&self, connected: bool) {
        if connected && self.cancel.is_cancelled() {
            return;
        }
        if self.connected.swap(connected, Ordering::AcqRel) != connected {
            self.status.emit(&connected);
        }
    }

    fn report(&self, error: SourceError) {
        self.errors.emit(&error);
    }

    fn deliver(&self, decoded: Decoded) {
        for item in decoded {
            match item {
                Ok(event) => {
                    self.events.emit(&event);
                }
                Err(e) => {
                    tracing::warn!("remote source: malformed event: {e}");
                    self.report(SourceError::Decode(e));
                }
            }
        }
    }
}

// ─── RemoteSource ───────────────────────────────────────────────────

/// WebSocket client for the remote firehose.
///
/// Construct, register handlers, then [`Self::start`] inside a Tokio
/// runtime. The connection task retries with exponential backoff until
/// [`Self::shutdown`] (or drop).
pub struct RemoteSource {
    shared: Arc<Shared>,
    config: RemoteSourceConfig,
    credentials: watch::Sender<Option<PrivateCredentials>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteSource {
    pub fn new(config: RemoteSourceConfig) -> Self {
        let (credentials, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                events: Listeners::new(),
                errors: Listeners::new(),
                status: Listeners::new(),
                connected: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
            config,
            credentials,
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RemoteSourceConfig {
        &self.config
    }

    /// Spawn the connection task on the current runtime. Calling it again
    /// while the task is alive does nothing.
    pub fn start(&self) -> Result<(), SourceError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| SourceError::Transport(format!("no tokio runtime: {e}")))?;
        if self.shared.cancel.is_cancelled() {
            return Err(SourceError::Closed("remote source was shut down".into()));
        }

        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Ok(());
        }

        let worker = Worker {
            shared: Arc::clone(&self.shared),
            url: self.config.url.clone(),
            backoff: Backoff::new(self.config.initial_backoff, self.config.max_backoff),
            credentials: self.credentials.subscribe(),
        };
        *task = Some(handle.spawn(worker.run()));
        tracing::info!(url = %self.config.url, "remote source: started");
        Ok(())
    }

    /// Stop the connection task. Terminal.
    pub fn shutdown(&self) {
        self.shared.cancel.cancel();
        self.shared.connected.store(false, Ordering::Release);
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }

    /// Identity currently requested for the connection, if any.
    pub fn private_credentials(&self) -> Option<PrivateCredentials> {
        self.credentials.borrow().clone()
    }
}

impl Drop for RemoteSource {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for RemoteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteSource")
            .field("url", &self.config.url)
            .field("connected", &self.is_connected())
            .field("private", &self.credentials.borrow().is_some())
            .finish_non_exhaustive()
    }
}

impl StreamSource for RemoteSource {
    fn subscribe(&self, handler: EventHandler) -> Subscription {
        self.shared.events.add(handler)
    }

    fn on_error(&self, handler: ErrorHandler) -> Subscription {
        self.shared.errors.add(handler)
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    fn on_status_change(&self, handler: StatusHandler) -> Option<Subscription> {
        Some(self.shared.status.add(handler))
    }
}

impl RemoteStreamSource for RemoteSource {
    /// Validates synchronously; the reconnect under the new identity happens
    /// on the connection task.
    fn connect_private(&self, user_id: &str, token: &str) -> Result<(), SourceError> {
        let credentials = PrivateCredentials::validate(user_id, token)?;
        let changed = self.credentials.send_if_modified(|current| {
            if current.as_ref() == Some(&credentials) {
                return false;
            }
            *current = Some(credentials);
            true
        });
        if changed {
            tracing::info!(user_id, "remote source: switching to private stream");
        }
        Ok(())
    }

    fn disconnect_user(&self) {
        if self.credentials.send_if_modified(|current| current.take().is_some()) {
            tracing::info!("remote source: leaving private stream");
        }
    }
}

// ─── Connection Task ────────────────────────────────────────────────

/// Why a live connection ended without an error.
#[derive(Debug, PartialEq, Eq)]
enum ListenEnd {
    /// The server closed the stream.
    Closed,
    /// The requested identity changed; reconnect right away.
    IdentityChanged,
    Shutdown,
}

struct Worker {
    shared: Arc<Shared>,
    url: String,
    backoff: Backoff,
    credentials: watch::Receiver<Option<PrivateCredentials>>,
}

impl Worker {
    async fn run(mut self) {
        let cancel = self.shared.cancel.clone();
        loop {
            let result = tokio::select! {
                () = cancel.cancelled() => break,
                result = self.connect_and_listen() => result,
            };
            self.shared.set_connected(false);

            match result {
                Ok(ListenEnd::Shutdown) => break,
                Ok(ListenEnd::IdentityChanged) => {
                    self.backoff.reset();
                    continue;
                }
                Ok(ListenEnd::Closed) => {
                    tracing::info!(url = %self.url, "remote source: connection closed by server");
                    self.backoff.reset();
                }
                Err(e) => {
                    let failures = self.backoff.record_failure();
                    if self.backoff.is_quiet() {
                        tracing::debug!(consecutive_failures = failures, "remote source: {e}");
                    } else {
                        tracing::warn!(consecutive_failures = failures, "remote source: {e}");
                    }
                    self.shared.report(e);
                }
            }

            let delay = self.backoff.next_delay();
            tokio::select! {
                () = cancel.cancelled() => break,
                changed = self.credentials.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.backoff.reset();
                }
                () = tokio::time::sleep(delay) => {
                    tracing::debug!(
                        url = %self.url,
                        ?delay,
                        consecutive_failures = self.backoff.consecutive_failures(),
                        "remote source: reconnecting"
                    );
                }
            }
        }
        tracing::info!("remote source: stopped");
    }

    /// One connection attempt: handshake, then read frames until the stream
    /// ends or the identity changes.
    async fn connect_and_listen(&mut self) -> Result<ListenEnd, SourceError> {
        let identity = self.credentials.borrow_and_update().clone();
        let request = build_request(&self.url, identity.as_ref())?;

        let (ws_stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| SourceError::Connect {
                endpoint: self.url.clone(),
                detail: e.to_string(),
            })?;
        tracing::info!(
            url = %self.url,
            private = identity.is_some(),
            "remote source: connected"
        );
        self.backoff.reset();
        self.shared.set_connected(true);

        let (mut write, mut read) = ws_stream.split();
        loop {
            tokio::select! {
                changed = self.credentials.changed() => {
                    if changed.is_err() {
                        return Ok(ListenEnd::Shutdown);
                    }
                    if let Err(e) = write.send(Message::Close(None)).await {
                        tracing::debug!("remote source: close on identity change failed: {e}");
                    }
                    return Ok(ListenEnd::IdentityChanged);
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.shared.deliver(decode_frame(&text)),
                    Some(Ok(Message::Binary(bytes))) => {
                        self.shared.deliver(decode_binary_frame(&bytes));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(frame) = frame {
                            tracing::debug!(code = u16::from(frame.code), reason = %frame.reason, "remote source: close frame");
                        }
                        return Ok(ListenEnd::Closed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(SourceError::Transport(e.to_string())),
                    None => return Ok(ListenEnd::Closed),
                },
            }
        }
    }
}

// ─── Request Building ───────────────────────────────────────────────

fn build_request(
    url: &str,
    identity: Option<&PrivateCredentials>,
) -> Result<Request, SourceError> {
    let target = match identity {
        Some(identity) => {
            let separator = if url.contains('?') { '&' } else { '?' };
            format!(
                "{url}{separator}user_id={}",
                encode_query_value(&identity.user_id)
            )
        }
        None => url.to_owned(),
    };

    let mut request = target
        .as_str()
        .into_client_request()
        .map_err(|e| SourceError::Connect {
            endpoint: url.to_owned(),
            detail: e.to_string(),
        })?;

    if let Some(identity) = identity {
        let value = HeaderValue::from_str(&bearer(&identity.token)).map_err(|_| {
            SourceError::InvalidCredentials("token is not a valid header value".into())
        })?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }
    Ok(request)
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

/// Percent-encode everything outside the RFC 3986 unreserved set.
fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_encoding() {
        assert_eq!(encode_query_value("user-1_a.b~"), "user-1_a.b~");
        assert_eq!(encode_query_value("a b&c=d"), "a%20b%26c%3Dd");
        assert_eq!(encode_query_value("é"), "%C3%A9");
    }

    #[test]
    fn public_request_has_no_auth() {
        let request = build_request("ws://127.0.0.1:9000/firehose", None).expect("request");
        assert_eq!(request.uri().to_string(), "ws://127.0.0.1:9000/firehose");
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn private_request_carries_user_and_bearer() {
        let identity = PrivateCredentials {
            user_id: "u 1".into(),
            token: "tok".into(),
        };
        let request =
            build_request("ws://127.0.0.1:9000/firehose?v=2", Some(&identity)).expect("request");
        assert_eq!(
            request.uri().to_string(),
            "ws://127.0.0.1:9000/firehose?v=2&user_id=u%201"
        );
        assert_eq!(
            request.headers().get(AUTHORIZATION).expect("auth header"),
            "Bearer tok"
        );
    }

    #[test]
    fn bad_url_is_connect_error() {
        let err = build_request("not a url", None).expect_err("invalid");
        assert!(matches!(err, SourceError::Connect { .. }));
    }

    #[test]
    fn credentials_validation() {
        assert!(PrivateCredentials::validate("u", "t").is_ok());
        for (user, token) in [("", "t"), ("  ", "t"), ("u", ""), ("u", "bad\ntoken")] {
            let err = PrivateCredentials::validate(user, token).expect_err("invalid");
            assert!(matches!(err, SourceError::InvalidCredentials(_)), "{user:?}/{token:?}");
        }
    }

    #[test]
    fn debug_redacts_token() {
        let identity = PrivateCredentials {
            user_id: "u1".into(),
            token: "secret".into(),
        };
        let debug = format!("{identity:?}");
        assert!(debug.contains("u1"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn connect_private_is_recorded_and_cleared() {
        let source = RemoteSource::new(RemoteSourceConfig::new("ws://127.0.0.1:1"));
        source.connect_private("u1", "tok").expect("valid");
        assert_eq!(
            source.private_credentials().map(|c| c.user_id),
            Some("u1".to_owned())
        );
        source.disconnect_user();
        assert!(source.private_credentials().is_none());
    }

    #[test]
    fn start_requires_runtime() {
        let source = RemoteSource::new(RemoteSourceConfig::new("ws://127.0.0.1:1"));
        assert!(matches!(source.start(), Err(SourceError::Transport(_))));
        assert!(!source.is_connected());
    }
}
