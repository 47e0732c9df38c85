//! CLI definition using clap derive.

use clap::{Args, Parser, Subcommand};
use firehose_source_relay::RelayEndpoint;

#[derive(Parser, Debug)]
#[command(name = "firehose", about = "Merged remote + relay event firehose")]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionOpts,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream merged events to stdout as NDJSON until interrupted
    Watch,
    /// Connect, wait, print status and stats; exit 0 if any source connected
    Probe(ProbeOpts),
}

#[derive(Args, Debug, Clone)]
pub struct ConnectionOpts {
    /// Remote firehose WebSocket URL
    #[arg(long, env = "FIREHOSE_REMOTE_URL", global = true)]
    pub remote_url: Option<String>,

    /// Relay endpoint: unix:/path, /path, or host:port
    /// (default: $XDG_RUNTIME_DIR/firehose/relay.sock)
    #[arg(long, env = "FIREHOSE_RELAY", global = true)]
    pub relay: Option<RelayEndpoint>,

    /// Upgrade the remote connection to this user's private stream
    #[arg(long, env = "FIREHOSE_USER_ID", global = true, requires = "token")]
    pub user_id: Option<String>,

    #[arg(long, env = "FIREHOSE_TOKEN", global = true, hide_env_values = true, requires = "user_id")]
    pub token: Option<String>,

    /// Pass relay heartbeats through instead of dropping them
    #[arg(long, global = true)]
    pub keep_relay_heartbeats: bool,

    /// Dedupe window in milliseconds
    #[arg(long, default_value = "30000", global = true)]
    pub dedupe_window_ms: u64,

    /// Maximum number of remembered event keys
    #[arg(long, default_value = "10000", global = true)]
    pub dedupe_max_entries: usize,
}

#[derive(Args, Debug, Clone)]
pub struct ProbeOpts {
    /// How long to wait for connections before reporting
    #[arg(long, default_value = "2000")]
    pub wait_ms: u64,
}

/// Default relay socket, per-user like other runtime sockets.
pub fn default_relay_endpoint() -> RelayEndpoint {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return RelayEndpoint::Unix(format!("{dir}/firehose/relay.sock").into());
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    RelayEndpoint::Unix(format!("/tmp/firehose-{user}/relay.sock").into())
}
