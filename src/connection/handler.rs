//! Connection Handler
//!
//! One [`ConnectionHandler`] per client. It reads whatever the socket has,
//! answers every complete request found at the front of the buffer, then
//! reads again. A request split across reads waits in the buffer; several
//! requests in one read are answered one after another, in order.
//!
//! The loop ends when:
//!
//! - the client closes the socket between requests (`Ok`)
//! - the client closes the socket mid-request ([`ConnectionError::UnexpectedEof`])
//! - a request is malformed ([`ConnectionError::ParseError`]); no reply is sent
//! - a read or write fails ([`ConnectionError::IoError`])

use crate::commands::CommandHandler;
use crate::protocol::{parser::MAX_BULK_SIZE, ParseError, RespParser, RespValue};
use bytes::{Buf, Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tracing::{debug, error, info, trace, warn};

/// Upper bound on buffered, not yet decoded input
const MAX_BUFFER_SIZE: usize = MAX_BULK_SIZE + 64 * 1024;

/// Read buffer capacity at connect time
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Counters shared by every connection of one server.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Connections ever opened
    pub connections_accepted: AtomicU64,
    /// Connections open right now
    pub active_connections: AtomicU64,
    /// Requests executed, including rejected ones
    pub commands_processed: AtomicU64,
    /// Bytes received from clients
    pub bytes_read: AtomicU64,
    /// Bytes of replies sent
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn command_processed(&self) {
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// The read/execute/reply loop for one client.
///
/// Generic over the transport so the same loop serves a `TcpStream` in
/// production and an in-memory stream in tests.
pub struct ConnectionHandler<S> {
    /// The client stream, writes buffered until each reply is flushed
    stream: BufWriter<S>,

    /// Peer address, logged as `client`
    addr: SocketAddr,

    /// Bytes read but not yet decoded
    buffer: BytesMut,

    /// The command handler (shared store behind it)
    command_handler: CommandHandler,

    /// Request decoder
    parser: RespParser,

    stats: Arc<ConnectionStats>,
}

impl<S> ConnectionHandler<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps `stream` and counts the connection as open.
    pub fn new(
        stream: S,
        addr: SocketAddr,
        command_handler: CommandHandler,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            command_handler,
            parser: RespParser::new(),
            stats,
        }
    }

    /// Runs the connection loop until the client disconnects or an error
    /// ends the connection.
    ///
    /// A clean disconnect between requests is `Ok(())`. Malformed or
    /// truncated framing is an error and no reply is sent for it.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => info!(client = %self.addr, "Client disconnected"),
            Err(ConnectionError::IoError(io_err))
                if io_err.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection closed on error"),
        }

        self.stats.connection_closed();
        result
    }

    /// Answers buffered requests, then reads more, until EOF or an error.
    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            while let Some(args) = self.try_parse_command()? {
                let response = self.command_handler.execute(&args);
                self.stats.command_processed();

                self.send_response(&response).await?;
            }

            if !self.read_more_data().await? {
                return Ok(());
            }
        }
    }

    /// Attempts to take one complete request off the front of the buffer.
    fn try_parse_command(&mut self) -> Result<Option<Vec<Bytes>>, ConnectionError> {
        match self.parser.parse_command(&self.buffer) {
            Ok(Some((args, consumed))) => {
                self.buffer.advance(consumed);
                trace!(
                    client = %self.addr,
                    consumed = consumed,
                    remaining = self.buffer.len(),
                    "Parsed command"
                );
                Ok(Some(args))
            }
            Ok(None) => {
                trace!(
                    client = %self.addr,
                    buffered = self.buffer.len(),
                    "Incomplete command, need more data"
                );
                Ok(None)
            }
            Err(e) => Err(ConnectionError::ParseError(e)),
        }
    }

    /// Appends the next chunk from the socket to the buffer.
    ///
    /// Returns `false` when the client closed the connection between
    /// requests.
    async fn read_more_data(&mut self) -> Result<bool, ConnectionError> {
        if self.buffer.len() >= MAX_BUFFER_SIZE {
            error!(
                client = %self.addr,
                size = self.buffer.len(),
                "Buffer size limit exceeded"
            );
            return Err(ConnectionError::BufferFull);
        }

        // Ensure we have some capacity
        if self.buffer.capacity() - self.buffer.len() < 1024 {
            self.buffer.reserve(INITIAL_BUFFER_SIZE);
        }

        let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;

        if n == 0 {
            return if self.buffer.is_empty() {
                Ok(false)
            } else {
                Err(ConnectionError::UnexpectedEof)
            };
        }

        self.stats.bytes_read(n);
        trace!(client = %self.addr, bytes = n, "Read data");

        Ok(true)
    }

    /// Writes one reply and flushes it.
    async fn send_response(&mut self, response: &RespValue) -> Result<(), ConnectionError> {
        let bytes = response.serialize();
        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        self.stats.bytes_written(bytes.len());
        trace!(
            client = %self.addr,
            bytes = bytes.len(),
            "Sent response"
        );
        Ok(())
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Socket read or write failed
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Malformed request framing
    #[error("Parse error: {0}")]
    ParseError(#[from] ParseError),

    /// The stream ended in the middle of a request
    #[error("Unexpected end of stream")]
    UnexpectedEof,

    /// More undecoded input than the largest legal request
    #[error("Buffer size limit exceeded")]
    BufferFull,
}

/// Serves a TCP client until it disconnects. Errors are already logged by
/// [`ConnectionHandler::run`].
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    command_handler: CommandHandler,
    stats: Arc<ConnectionStats>,
) {
    let handler = ConnectionHandler::new(stream, addr, command_handler, stats);
    if let Err(e) = handler.run().await {
        debug!(client = %addr, error = %e, "Connection ended with error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StorageEngine;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio_test::io::Builder;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn handler_over<S>(stream: S) -> (ConnectionHandler<S>, Arc<StorageEngine>, Arc<ConnectionStats>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let storage = Arc::new(StorageEngine::new());
        let stats = Arc::new(ConnectionStats::new());
        let handler = ConnectionHandler::new(
            stream,
            test_addr(),
            CommandHandler::new(Arc::clone(&storage)),
            Arc::clone(&stats),
        );
        (handler, storage, stats)
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let stream = Builder::new()
            .read(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n")
            .write(b"+OK\r\n")
            .read(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n")
            .write(b"$3\r\nbar\r\n")
            .read(b"*2\r\n$3\r\nDEL\r\n$3\r\nfoo\r\n")
            .write(b":1\r\n")
            .build();

        let (handler, storage, _) = handler_over(stream);
        handler.run().await.unwrap();
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_command_error_keeps_connection_open() {
        let stream = Builder::new()
            .read(b"*2\r\n$3\r\nSET\r\n$1\r\nk\r\n")
            .write(b"-ERR wrong number of arguments for SET command\r\n")
            .read(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n")
            .write(b"$-1\r\n")
            .build();

        let (handler, _, stats) = handler_over(stream);
        handler.run().await.unwrap();
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn test_request_split_across_reads() {
        let stream = Builder::new()
            .read(b"*3\r\n$3\r\nSET\r\n$1\r")
            .read(b"\nk\r\n$11\r\nhello ")
            .read(b"world\r\n")
            .write(b"+OK\r\n")
            .build();

        let (handler, storage, _) = handler_over(stream);
        handler.run().await.unwrap();
        assert_eq!(storage.get(b"k"), Some(Bytes::from("hello world")));
    }

    #[tokio::test]
    async fn test_several_requests_in_one_read_answered_in_order() {
        let stream = Builder::new()
            .read(b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n*2\r\n$3\r\nGET\r\n$1\r\na\r\n")
            .write(b"+OK\r\n")
            .write(b"$1\r\n1\r\n")
            .build();

        let (handler, _, _) = handler_over(stream);
        handler.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_header_closes_without_reply() {
        let stream = Builder::new().read(b"GET foo\r\n").build();

        let (handler, _, stats) = handler_over(stream);
        let result = handler.run().await;

        assert!(matches!(
            result,
            Err(ConnectionError::ParseError(ParseError::InvalidArrayHeader))
        ));
        assert_eq!(stats.bytes_written.load(Ordering::Relaxed), 0);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_length_mismatch_closes_without_reply() {
        let stream = Builder::new()
            .read(b"*2\r\n$3\r\nGET\r\n$2\r\nfoo\r\n")
            .build();

        let (handler, _, _) = handler_over(stream);
        let result = handler.run().await;
        assert!(matches!(result, Err(ConnectionError::ParseError(_))));
    }

    #[tokio::test]
    async fn test_truncated_request_is_unexpected_eof() {
        // Declares two elements, then the stream ends after one
        let stream = Builder::new().read(b"*2\r\n$3\r\nGET\r\n").build();

        let (handler, _, stats) = handler_over(stream);
        let result = handler.run().await;

        assert!(matches!(result, Err(ConnectionError::UnexpectedEof)));
        assert_eq!(stats.commands_processed.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_write_failure_ends_loop() {
        let stream = Builder::new()
            .read(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n")
            .write_error(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "peer went away",
            ))
            .build();

        let (handler, _, _) = handler_over(stream);
        let result = handler.run().await;
        assert!(matches!(result, Err(ConnectionError::IoError(_))));
    }

    async fn create_test_server() -> (SocketAddr, Arc<StorageEngine>, Arc<ConnectionStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let storage = Arc::new(StorageEngine::new());
        let stats = Arc::new(ConnectionStats::new());

        let storage_clone = Arc::clone(&storage);
        let stats_clone = Arc::clone(&stats);

        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                let handler = CommandHandler::new(Arc::clone(&storage_clone));
                let stats = Arc::clone(&stats_clone);
                tokio::spawn(handle_connection(stream, client_addr, handler, stats));
            }
        });

        (addr, storage, stats)
    }

    #[tokio::test]
    async fn test_tcp_set_get() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"*3\r\n$3\r\nSET\r\n$4\r\nname\r\n$4\r\nAriz\r\n")
            .await
            .unwrap();

        let mut buf = [0u8; 64];
        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"+OK\r\n");

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
            .await
            .unwrap();

        let n = client.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"$4\r\nAriz\r\n");
    }

    #[tokio::test]
    async fn test_tcp_bad_framing_closes_connection() {
        let (addr, _, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"*1\r\n+PING\r\n").await.unwrap();

        // The server closes without writing anything
        let mut buf = [0u8; 64];
        let result = client.read(&mut buf).await;
        assert!(matches!(result, Ok(0) | Err(_)), "got {:?}", result);
    }

    #[tokio::test]
    async fn test_connection_stats() {
        let (addr, _, stats) = create_test_server().await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);

        let mut client = TcpStream::connect(addr).await.unwrap();

        // Give the server time to accept the connection
        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(stats.connections_accepted.load(Ordering::Relaxed), 1);
        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 1);

        client
            .write_all(b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n")
            .await
            .unwrap();
        let mut buf = [0u8; 64];
        let _ = client.read(&mut buf).await.unwrap();

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert!(stats.commands_processed.load(Ordering::Relaxed) >= 1);
        assert!(stats.bytes_read.load(Ordering::Relaxed) > 0);
        assert!(stats.bytes_written.load(Ordering::Relaxed) > 0);

        drop(client);

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(stats.active_connections.load(Ordering::Relaxed), 0);
    }
}
