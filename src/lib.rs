//! # SparkKV - A Small In-Memory Key-Value Server
//!
//! SparkKV stores byte-string values under byte-string keys, with optional
//! per-key expiry, and speaks the RESP wire format over TCP. Three commands
//! are supported: `GET`, `SET` and `DEL`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              SparkKV                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│  Command    │                  │
//! │  │ (Listener)  │    │  Handler    │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │  ┌─────────────┐    ┌──────────────────────────────────────────────┐   │
//! │  │   RESP      │    │              StorageEngine                   │   │
//! │  │   Parser    │    │  ┌────────┐ ┌────────┐ ┌────────┐ ┌────────┐ │   │
//! │  │             │    │  │Shard 0 │ │Shard 1 │ │Shard 2 │ │...N    │ │   │
//! │  └─────────────┘    │  │RwLock  │ │RwLock  │ │RwLock  │ │shards  │ │   │
//! │                     │  └────────┘ └────────┘ └────────┘ └────────┘ │   │
//! │                     └──────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use sparkkv::Server;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let server = Server::bind("127.0.0.1:3000").await?;
//!     server.run().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `GET key`
//! - `SET key value [NX|XX] [GET] [EX seconds]`
//! - `DEL key [key ...]`
//!
//! Command names and option keywords are case-insensitive.
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP encoder and incremental decoder
//! - [`storage`]: Sharded store with lazy expiry
//! - [`commands`]: Command dispatch and `SET` option parsing
//! - [`connection`]: Per-client read/execute/reply loop
//! - [`server`]: Listener and accept loop
//! - [`client`]: Request/response client used by `sparkkv-cli`
//! - [`config`]: Host and port settings
//!
//! ## Expiry
//!
//! Expired keys are removed lazily, when a command touches them. GET and SET
//! treat a key whose expiry instant has been reached as absent. DEL works on
//! raw presence: it removes such a key and counts it.

pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-export commonly used types for convenience
pub use client::{Client, ClientError};
pub use commands::{CommandError, CommandHandler};
pub use config::Config;
pub use connection::{handle_connection, ConnectionStats};
pub use protocol::{ParseError, RespParser, RespValue};
pub use server::Server;
pub use storage::StorageEngine;

/// The default port SparkKV listens on
pub const DEFAULT_PORT: u16 = 3000;

/// The default host SparkKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of SparkKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
