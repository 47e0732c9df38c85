use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use firehose_core::backoff::{Backoff, DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF};
use firehose_core::{
    ErrorHandler, EventHandler, Listeners, RawEvent, SourceError, StatusHandler, StreamSource,
    Subscription,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::{TcpStream, UnixStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::endpoint::RelayEndpoint;
use crate::translate::decode_line;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySourceConfig {
    pub endpoint: RelayEndpoint,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RelaySourceConfig {
    pub fn new(endpoint: RelayEndpoint) -> Self {
        Self {
            endpoint,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

struct Shared {
    events: Listeners<RawEvent>,
    errors: Listeners<SourceError>,
    status: Listeners<bool>,
    connected: AtomicBool,
    cancel: CancellationToken,
}

impl Shared {
    fn set_connected(&self, connected: bool) {
        if connected && self.cancel.is_cancelled() {
            return;
        }
        if self.connected.swap(connected, Ordering::AcqRel) != connected {
            self.status.emit(&connected);
        }
    }
}

/// Line-oriented client for the local relay.
///
/// Same lifecycle as the remote adapter: register handlers, [`Self::start`]
/// inside a Tokio runtime, [`Self::shutdown`] when done.
pub struct RelaySource {
    shared: Arc<Shared>,
    config: RelaySourceConfig,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RelaySource {
    pub fn new(config: RelaySourceConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                events: Listeners::new(),
                errors: Listeners::new(),
                status: Listeners::new(),
                connected: AtomicBool::new(false),
                cancel: CancellationToken::new(),
            }),
            config,
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &RelaySourceConfig {
        &self.config
    }

    pub fn start(&self) -> Result<(), SourceError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| SourceError::Transport(format!("no tokio runtime: {e}")))?;
        if self.shared.cancel.is_cancelled() {
            return Err(SourceError::Closed("relay source was shut down".into()));
        }

        let mut task = self.task.lock().unwrap_or_else(PoisonError::into_inner);
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Ok(());
        }

        let worker = Worker {
            shared: Arc::clone(&self.shared),
            endpoint: self.config.endpoint.clone(),
            backoff: Backoff::new(self.config.initial_backoff, self.config.max_backoff),
        };
        *task = Some(handle.spawn(worker.run()));
        tracing::info!(endpoint = %self.config.endpoint, "relay source: started");
        Ok(())
    }

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
}

impl Drop for RelaySource {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for RelaySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelaySource")
            .field("endpoint", &self.config.endpoint)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl StreamSource for RelaySource {
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

// ─── Connection Task ────────────────────────────────────────────────

type RelayStream = Box<dyn AsyncRead + Send + Unpin>;

struct Worker {
    shared: Arc<Shared>,
    endpoint: RelayEndpoint,
    backoff: Backoff,
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
                Ok(()) => {
                    tracing::info!(endpoint = %self.endpoint, "relay source: relay closed the connection");
                    self.backoff.reset();
                }
                Err(e) => {
                    let failures = self.backoff.record_failure();
                    if self.backoff.is_quiet() {
                        tracing::debug!(consecutive_failures = failures, "relay source: {e}");
                    } else {
                        tracing::warn!(consecutive_failures = failures, "relay source: {e}");
                    }
                    self.shared.errors.emit(&e);
                }
            }

            let delay = self.backoff.next_delay();
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(delay) => {
                    tracing::debug!(
                        endpoint = %self.endpoint,
                        ?delay,
                        consecutive_failures = self.backoff.consecutive_failures(),
                        "relay source: reconnecting"
                    );
                }
            }
        }
        tracing::info!("relay source: stopped");
    }

    /// Connect, then deliver one event per line until EOF.
    async fn connect_and_listen(&mut self) -> Result<(), SourceError> {
        let stream = open(&self.endpoint)
            .await
            .map_err(|e| SourceError::Connect {
                endpoint: self.endpoint.to_string(),
                detail: e.to_string(),
            })?;
        tracing::info!(endpoint = %self.endpoint, "relay source: connected");
        self.backoff.reset();
        self.shared.set_connected(true);

        let mut lines = BufReader::new(stream).lines();
        while let Some(line) = lines.next_line().await? {
            match decode_line(&line) {
                None => {}
                Some(Ok(event)) => {
                    self.shared.events.emit(&event);
                }
                Some(Err(e)) => {
                    tracing::warn!("relay source: failed to parse line: {e}, line: {line}");
                    self.shared.errors.emit(&SourceError::Decode(e));
                }
            }
        }
        Ok(())
    }
}

async fn open(endpoint: &RelayEndpoint) -> std::io::Result<RelayStream> {
    Ok(match endpoint {
        RelayEndpoint::Unix(path) => Box::new(UnixStream::connect(path).await?),
        RelayEndpoint::Tcp(addr) => Box::new(TcpStream::connect(addr.as_str()).await?),
    })
}
