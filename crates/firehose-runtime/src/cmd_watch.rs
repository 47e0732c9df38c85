//! `firehose watch`: stream merged events to stdout as NDJSON.

use std::io::{self, Write};
use std::sync::Mutex;

use firehose_core::ConnectionStatus;
use firehose_mux::MuxEvent;

use crate::app::App;
use crate::cli::ConnectionOpts;
use crate::signal::shutdown_signal;

/// Entry point for `firehose watch`. Runs until ctrl-c or SIGTERM.
pub async fn cmd_watch(opts: &ConnectionOpts) -> anyhow::Result<()> {
    let mut subscriptions = Vec::new();
    let app = App::start(opts, |mux| {
        subscriptions.push(mux.subscribe(|event| {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            if let Err(e) = write_event(&mut out, event) {
                tracing::debug!("stdout write failed: {e}");
            }
        }));

        let last = Mutex::new(None::<ConnectionStatus>);
        subscriptions.push(mux.on_status(move |status| {
            let mut last = last.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if status_changed(&mut last, *status) {
                tracing::info!(
                    remote = status.remote_connected,
                    relay = status.relay_connected,
                    "connection status"
                );
            }
        }));

        subscriptions.push(mux.on_error(|error| {
            tracing::debug!("source error: {error}");
        }));
    })?;

    let signal = shutdown_signal().await;

    let stats = app.mux.stats();
    drop(subscriptions);
    app.shutdown();
    tracing::info!(
        received = stats.received,
        emitted = stats.emitted,
        duplicates = stats.duplicates_dropped,
        heartbeats = stats.heartbeats_dropped,
        "watch finished"
    );
    signal
}

/// One event per line.
fn write_event<W: Write>(out: &mut W, event: &MuxEvent) -> io::Result<()> {
    serde_json::to_writer(&mut *out, event)?;
    out.write_all(b"\n")?;
    out.flush()
}

/// Record `status`; true when it differs from the previous snapshot.
fn status_changed(last: &mut Option<ConnectionStatus>, status: ConnectionStatus) -> bool {
    if *last == Some(status) {
        return false;
    }
    *last = Some(status);
    true
}
