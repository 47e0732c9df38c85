//! `firehose probe`: one-shot connectivity check.

use std::time::Duration;

use firehose_core::ConnectionStatus;
use firehose_mux::MuxStats;
use serde::Serialize;

use crate::app::App;
use crate::cli::{ConnectionOpts, ProbeOpts};

#[derive(Debug, Serialize)]
struct ProbeReport {
    connected: bool,
    status: ConnectionStatus,
    stats: MuxStats,
}

/// Entry point for `firehose probe`. Returns whether any source connected.
pub async fn cmd_probe(conn: &ConnectionOpts, opts: &ProbeOpts) -> anyhow::Result<bool> {
    let app = App::start(conn, |_| {})?;
    tokio::time::sleep(Duration::from_millis(opts.wait_ms)).await;

    let report = build_report(app.mux.status(), app.mux.stats());
    app.shutdown();

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.connected)
}

fn build_report(status: ConnectionStatus, stats: MuxStats) -> ProbeReport {
    ProbeReport {
        connected: status.is_connected(),
        status,
        stats,
    }
}
