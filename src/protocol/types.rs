//! RESP Reply and Request Types
//!
//! Every value exchanged with a client is a [`RespValue`]. The server only ever
//! sends four kinds of reply, and clients only ever send arrays of bulk strings.
//!
//! ## Wire Format
//!
//! Each value starts with a one-byte type prefix and every line ends in CRLF:
//!
//! - `+OK\r\n` - simple status
//! - `-ERR <message>\r\n` - error
//! - `:<decimal>\r\n` - integer
//! - `$<len>\r\n<bytes>\r\n` - bulk value
//! - `$-1\r\n` - null / not found
//! - `*<count>\r\n` followed by `count` bulk values - a request

use bytes::Bytes;
use std::fmt;

/// Line terminator
pub const CRLF: &[u8] = b"\r\n";

/// First byte of each value kind
pub mod prefix {
    pub const SIMPLE_STRING: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A single RESP value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// Status reply without CRLF in it, e.g. `OK`.
    SimpleString(String),

    /// Error reply. The text includes the `ERR` tag.
    Error(String),

    /// 64-bit signed integer reply.
    Integer(i64),

    /// Binary-safe bulk value.
    BulkString(Bytes),

    /// The null bulk string, `$-1\r\n`.
    Null,

    /// Array of values. Requests are arrays of bulk strings.
    Array(Vec<RespValue>),
}

impl RespValue {
    /// `+OK`
    pub fn ok() -> Self {
        RespValue::SimpleString("OK".to_string())
    }

    /// An error reply carrying `message` verbatim.
    ///
    /// # Example
    /// ```
    /// use sparkkv::protocol::types::RespValue;
    /// let err = RespValue::error("ERR unknown command: FOO");
    /// assert_eq!(err.serialize(), b"-ERR unknown command: FOO\r\n");
    /// ```
    pub fn error(message: impl Into<String>) -> Self {
        RespValue::Error(message.into())
    }

    pub fn integer(n: i64) -> Self {
        RespValue::Integer(n)
    }

    /// A bulk value.
    ///
    /// # Example
    /// ```
    /// use sparkkv::protocol::types::RespValue;
    /// use bytes::Bytes;
    /// let value = RespValue::bulk_string(Bytes::from("Ariz"));
    /// assert_eq!(value.serialize(), b"$4\r\nAriz\r\n");
    /// ```
    pub fn bulk_string(data: impl Into<Bytes>) -> Self {
        RespValue::BulkString(data.into())
    }

    /// The not-found reply, `$-1`.
    pub fn null() -> Self {
        RespValue::Null
    }

    /// Builds a request: an array with one bulk string per argument.
    ///
    /// # Example
    /// ```
    /// use sparkkv::protocol::types::RespValue;
    /// let request = RespValue::command(["GET", "name"]);
    /// assert_eq!(request.serialize(), b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
    /// ```
    pub fn command<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Bytes>,
    {
        RespValue::Array(
            args.into_iter()
                .map(|arg| RespValue::BulkString(arg.into()))
                .collect(),
        )
    }

    /// Encodes the value into its wire bytes.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len_hint());
        self.write_to(&mut out);
        out
    }

    /// Appends the wire bytes of this value to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            RespValue::SimpleString(text) => put_line(out, prefix::SIMPLE_STRING, text.as_bytes()),
            RespValue::Error(message) => put_line(out, prefix::ERROR, message.as_bytes()),
            RespValue::Integer(n) => put_line(out, prefix::INTEGER, n.to_string().as_bytes()),
            RespValue::BulkString(data) => {
                put_line(out, prefix::BULK_STRING, data.len().to_string().as_bytes());
                out.extend_from_slice(data);
                out.extend_from_slice(CRLF);
            }
            RespValue::Null => put_line(out, prefix::BULK_STRING, b"-1"),
            RespValue::Array(items) => {
                put_line(out, prefix::ARRAY, items.len().to_string().as_bytes());
                items.iter().for_each(|item| item.write_to(out));
            }
        }
    }

    /// Rough encoded size, used to size the output buffer once.
    fn encoded_len_hint(&self) -> usize {
        match self {
            RespValue::BulkString(data) => data.len() + 16,
            RespValue::Array(items) => 16 + items.iter().map(Self::encoded_len_hint).sum::<usize>(),
            _ => 32,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RespValue::Null)
    }
}

/// Writes `<tag><body>\r\n`.
fn put_line(out: &mut Vec<u8>, tag: u8, body: &[u8]) {
    out.push(tag);
    out.extend_from_slice(body);
    out.extend_from_slice(CRLF);
}

/// Renders a reply the way a terminal client shows it.
impl fmt::Display for RespValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RespValue::SimpleString(s) => write!(f, "{}", s),
            RespValue::Error(s) => write!(f, "(error) {}", s),
            RespValue::Integer(n) => write!(f, "(integer) {}", n),
            RespValue::BulkString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            RespValue::Null => write!(f, "(nil)"),
            RespValue::Array(values) => {
                if values.is_empty() {
                    return write!(f, "(empty array)");
                }
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, v)?;
                }
                Ok(())
            }
        }
    }
}
