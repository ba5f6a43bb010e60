//! Request/Response Client
//!
//! A minimal client for talking to a SparkKV server: encode one request,
//! write it, read exactly one reply. Used by the `sparkkv-cli` binary and by
//! the end-to-end tests.

use crate::protocol::{ParseError, RespParser, RespValue};
use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::trace;

/// Errors returned by [`Client`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid reply: {0}")]
    Parse(#[from] ParseError),

    /// The server closed the connection, possibly mid-reply
    #[error("connection closed by server")]
    ConnectionClosed,
}

/// A connection to a SparkKV server.
///
/// # Example
///
/// ```no_run
/// use sparkkv::client::Client;
///
/// # async fn demo() -> Result<(), sparkkv::client::ClientError> {
/// let mut client = Client::connect("127.0.0.1:3000").await?;
/// let reply = client.send(&["SET", "greeting", "hello world"]).await?;
/// println!("{}", reply);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Client {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
    parser: RespParser,
}

impl Client {
    /// Connects to the server at `addr`.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(4096),
            parser: RespParser::new(),
        })
    }

    /// Sends one request and waits for its reply.
    ///
    /// Each argument is sent as its own bulk string, so arguments may contain
    /// spaces.
    pub async fn send<A: AsRef<[u8]>>(&mut self, args: &[A]) -> Result<RespValue, ClientError> {
        let request = RespValue::command(args.iter().map(|a| Bytes::copy_from_slice(a.as_ref())));
        let bytes = request.serialize();

        self.stream.write_all(&bytes).await?;
        self.stream.flush().await?;
        trace!(bytes = bytes.len(), "Sent request");

        self.read_reply().await
    }

    /// Reads exactly one reply.
    pub async fn read_reply(&mut self) -> Result<RespValue, ClientError> {
        loop {
            match self.parser.parse_reply(&self.buffer) {
                Ok(Some((reply, consumed))) => {
                    self.buffer.advance(consumed);
                    return Ok(reply);
                }
                Ok(None) => {}
                Err(e) => {
                    // Nothing after a bad reply can be framed reliably
                    self.buffer.clear();
                    return Err(e.into());
                }
            }

            if self.stream.get_mut().read_buf(&mut self.buffer).await? == 0 {
                return Err(ClientError::ConnectionClosed);
            }
        }
    }
}
