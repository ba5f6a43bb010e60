//! TCP Server
//!
//! Binds the listening socket and runs the accept loop. Every accepted
//! connection gets its own Tokio task and a [`CommandHandler`] pointing at the
//! one shared [`StorageEngine`].

use crate::commands::CommandHandler;
use crate::connection::{handle_connection, ConnectionStats};
use crate::storage::StorageEngine;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{debug, error, info};

/// A bound server, ready to accept connections.
///
/// # Example
///
/// ```no_run
/// use sparkkv::Server;
///
/// # async fn start() -> std::io::Result<()> {
/// let server = Server::bind("127.0.0.1:3000").await?;
/// server.run().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    storage: Arc<StorageEngine>,
    stats: Arc<ConnectionStats>,
}

impl Server {
    /// Binds the listener with a fresh, empty store.
    ///
    /// A bind failure is returned to the caller; the server cannot start
    /// without its socket.
    pub async fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        Self::with_storage(addr, Arc::new(StorageEngine::new())).await
    }

    /// Binds the listener around an existing store.
    pub async fn with_storage(
        addr: impl ToSocketAddrs,
        storage: Arc<StorageEngine>,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "Listening");

        Ok(Self {
            listener,
            storage,
            stats: Arc::new(ConnectionStats::new()),
        })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// The store shared by all connections.
    pub fn storage(&self) -> &Arc<StorageEngine> {
        &self.storage
    }

    /// Connection counters shared by all connections.
    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    /// Accepts connections forever.
    ///
    /// A failed accept is logged and the loop carries on.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(client = %addr, "Accepted connection");

                    let handler = CommandHandler::new(Arc::clone(&self.storage));
                    let stats = Arc::clone(&self.stats);

                    tokio::spawn(async move {
                        handle_connection(stream, addr, handler, stats).await;
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}
