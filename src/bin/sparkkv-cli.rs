//! Interactive client for SparkKV.
//!
//! Reads one command per line, sends it as a request array and prints the
//! reply. Type `quit` or `exit` to leave.

use anyhow::Context;
use clap::Parser;
use sparkkv::{Client, ClientError, Config};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const PROMPT: &str = "sparkkv> ";

#[derive(Debug, Parser)]
#[command(name = "sparkkv-cli", version, about = "Interactive SparkKV client")]
struct Cli {
    #[command(flatten)]
    config: Config,
}

fn prompt() -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(PROMPT.as_bytes())?;
    stdout.flush()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Cli { config } = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let addr = config.bind_address();
    let mut client = Client::connect(addr.as_str())
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;
    info!(server = %addr, "Connected");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        prompt()?;

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            // stdin closed
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read input: {}", e);
                continue;
            }
        };

        let args: Vec<&str> = line.split_whitespace().collect();
        let Some(first) = args.first() else {
            continue;
        };

        if first.eq_ignore_ascii_case("quit") || first.eq_ignore_ascii_case("exit") {
            println!("Goodbye!");
            break;
        }

        match client.send(&args[..]).await {
            Ok(reply) => println!("{}", reply),
            Err(ClientError::ConnectionClosed) => {
                warn!(server = %addr, "Connection closed by server");
                break;
            }
            Err(e) => warn!("Request failed: {}", e),
        }
    }

    Ok(())
}
