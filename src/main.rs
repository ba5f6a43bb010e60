//! SparkKV - A Small In-Memory Key-Value Server
//!
//! This is the main entry point for the SparkKV server.
//! It sets up logging, binds the listener and serves until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use sparkkv::{Config, Server};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "sparkkv", version, about = "In-memory key-value server speaking RESP")]
struct Cli {
    #[command(flatten)]
    config: Config,
}

fn print_banner(config: &Config) {
    println!(
        r#"
SparkKV v{} - In-Memory Key-Value Server
──────────────────────────────────────────
Server started on {}
Ready to accept connections.

Use Ctrl+C to shutdown.
"#,
        sparkkv::VERSION,
        config.bind_address()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Cli { config } = Cli::parse();

    // RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let addr = config.bind_address();
    let server = Server::bind(addr.as_str())
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    print_banner(&config);

    let storage = Arc::clone(server.storage());
    let conn_stats = Arc::clone(server.stats());

    tokio::select! {
        _ = server.run() => {}
        result = signal::ctrl_c() => match result {
            Ok(()) => info!("Shutdown signal received, stopping server..."),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        },
    }

    let stats = storage.stats();
    info!(
        keys = stats.keys,
        gets = stats.get_ops,
        sets = stats.set_ops,
        dels = stats.del_ops,
        expired = stats.expired,
        connections = conn_stats.connections_accepted.load(Ordering::Relaxed),
        commands = conn_stats.commands_processed.load(Ordering::Relaxed),
        "Server shutdown complete"
    );
    Ok(())
}
