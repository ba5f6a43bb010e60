//! Per-Client Connection Loop
//!
//! The [`server`](crate::server) accepts sockets and hands each one to
//! [`handle_connection`] on a fresh Tokio task. From there the
//! [`ConnectionHandler`] owns the socket:
//!
//! ```text
//!   socket ──read──> BytesMut ──parse_command──> Vec<Bytes>
//!                                                    │
//!                                          CommandHandler::execute
//!                                                    │
//!   socket <──write+flush── BufWriter <──serialize── RespValue
//! ```
//!
//! Framing errors close the socket without a reply. Command errors are
//! ordinary replies and the loop continues.
//!
//! Counters for every connection are collected in one shared
//! [`ConnectionStats`].

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler, ConnectionStats};
