//! firehose: runtime binary for the merged remote + relay event feed.

use clap::Parser;

mod app;
mod cli;
mod cmd_probe;
mod cmd_watch;
mod signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // stdout carries event output; logs go to stderr.
    let filter = std::env::var("FIREHOSE_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        cli::Command::Watch => {
            cmd_watch::cmd_watch(&args.connection).await?;
        }
        cli::Command::Probe(opts) => {
            let connected = cmd_probe::cmd_probe(&args.connection, &opts).await?;
            if !connected {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
