//! Explicit wiring of sources and multiplexer for one process.

use std::sync::Arc;

use anyhow::Context;
use firehose_mux::{FirehoseMux, MuxConfig};
use firehose_source_relay::{RelaySource, RelaySourceConfig};
use firehose_source_remote::{RemoteSource, RemoteSourceConfig};

use crate::cli::{ConnectionOpts, default_relay_endpoint};

pub struct App {
    pub mux: FirehoseMux,
    remote: Arc<RemoteSource>,
    relay: Arc<RelaySource>,
}

impl App {
    /// Build both sources and the multiplexer, then start the connection
    /// tasks. `wire` runs after the multiplexer exists but before any source
    /// connects, so subscribers registered there see every event.
    pub fn start(opts: &ConnectionOpts, wire: impl FnOnce(&FirehoseMux)) -> anyhow::Result<Self> {
        let remote_url = opts
            .remote_url
            .clone()
            .context("remote URL required (--remote-url or FIREHOSE_REMOTE_URL)")?;
        let relay_endpoint = opts.relay.clone().unwrap_or_else(default_relay_endpoint);

        let remote = Arc::new(RemoteSource::new(RemoteSourceConfig::new(remote_url)));
        let relay = Arc::new(RelaySource::new(RelaySourceConfig::new(relay_endpoint)));
        let mux = FirehoseMux::new(remote.clone(), relay.clone(), mux_config(opts));
        wire(&mux);

        if let (Some(user_id), Some(token)) = (&opts.user_id, &opts.token) {
            mux.connect_private(user_id, token)
                .context("private stream credentials rejected")?;
        }
        remote.start().context("starting remote source")?;
        relay.start().context("starting relay source")?;

        tracing::info!(
            remote = %remote.config().url,
            relay = %relay.config().endpoint,
            "firehose started"
        );
        Ok(Self { mux, remote, relay })
    }

    /// Tear down in reverse order of construction.
    pub fn shutdown(self) {
        self.mux.disconnect();
        self.remote.shutdown();
        self.relay.shutdown();
        tracing::info!("firehose stopped");
    }
}

fn mux_config(opts: &ConnectionOpts) -> MuxConfig {
    MuxConfig {
        ignore_relay_heartbeats: !opts.keep_relay_heartbeats,
        dedupe_window_ms: opts.dedupe_window_ms,
        dedupe_max_entries: opts.dedupe_max_entries,
        ..MuxConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::cli::Cli;

    fn opts(args: &[&str]) -> ConnectionOpts {
        let mut argv = vec!["firehose", "watch"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("parse").connection
    }

    #[test]
    fn mux_config_from_flags() {
        let config = mux_config(&opts(&["--keep-relay-heartbeats", "--dedupe-window-ms", "500"]));
        assert!(!config.ignore_relay_heartbeats);
        assert_eq!(config.dedupe_window_ms, 500);
        assert_eq!(config.dedupe_max_entries, 10_000);
    }

    #[test]
    fn missing_remote_url_is_an_error() {
        let mut o = opts(&[]);
        o.remote_url = None;
        assert!(App::start(&o, |_| {}).is_err());
    }

    #[tokio::test]
    async fn starts_and_shuts_down_without_peers() {
        let o = opts(&["--remote-url", "ws://127.0.0.1:1/firehose", "--relay", "127.0.0.1:1"]);
        let app = App::start(&o, |_| {}).expect("start");
        assert!(!app.mux.is_disconnected());
        let mux_status = app.mux.status();
        assert!(!mux_status.is_connected());
        app.shutdown();
    }
}
