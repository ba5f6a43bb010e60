//! Incremental RESP Parser
//!
//! The parser works on whatever bytes have been buffered so far and never
//! blocks. Both entry points return:
//!
//! - `Ok(Some((value, consumed)))` - a complete message, `consumed` bytes long
//! - `Ok(None)` - the message is incomplete, read more and try again
//! - `Err(ParseError)` - the framing is invalid and cannot be recovered
//!
//! The caller owns the buffer. After a successful parse it advances the buffer by
//! `consumed`; on `Ok(None)` it reads more data; on an error it drops the
//! connection, because nothing after a bad header can be trusted.
//!
//! Requests are arrays of bulk strings ([`RespParser::parse_command`]). Replies
//! are a single status, error, integer or bulk value ([`RespParser::parse_reply`]).

use crate::protocol::types::{prefix, RespValue, CRLF};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur during RESP parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// A reply started with a byte that is not a known type prefix
    #[error("unknown prefix: {0:#04x}")]
    UnknownPrefix(u8),

    /// A request did not start with `*`
    #[error("invalid array header")]
    InvalidArrayHeader,

    /// A request element did not start with `$`
    #[error("invalid bulk length header")]
    InvalidBulkHeader,

    /// A length or integer field is not a decimal number
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid UTF-8 in a header, status or error line
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string length is negative (but not -1 for null)
    #[error("invalid bulk string length: {0}")]
    InvalidBulkLength(i64),

    /// Array length is negative
    #[error("invalid array length: {0}")]
    InvalidArrayLength(i64),

    /// Protocol violation (missing CRLF, etc.)
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The message exceeds maximum allowed size
    #[error("message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Upper bound on capacity reserved up front for a request's argument list.
const PREALLOC_ARGS: usize = 64;

/// A RESP parser for requests and replies.
///
/// # Example
///
/// ```
/// use sparkkv::protocol::RespParser;
/// use bytes::Bytes;
///
/// let parser = RespParser::new();
/// let (args, consumed) = parser
///     .parse_command(b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n")
///     .unwrap()
///     .unwrap();
/// assert_eq!(args, vec![Bytes::from("GET"), Bytes::from("name")]);
/// assert_eq!(consumed, 23);
/// ```
#[derive(Debug, Clone)]
pub struct RespParser {
    /// Largest bulk payload accepted before the input is rejected
    max_bulk_size: usize,
}

impl Default for RespParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RespParser {
    /// Creates a new parser instance.
    pub fn new() -> Self {
        Self {
            max_bulk_size: MAX_BULK_SIZE,
        }
    }

    /// Creates a parser with a custom bulk size limit.
    pub fn with_max_bulk_size(max_bulk_size: usize) -> Self {
        Self { max_bulk_size }
    }

    /// Decodes one request: `*<count>\r\n` then `count` × `$<len>\r\n<bytes>\r\n`.
    ///
    /// Returns the argument tokens in order. Elements are passed through as
    /// discrete tokens, so an argument may itself contain spaces.
    pub fn parse_command(&self, buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }
        if buf[0] != prefix::ARRAY {
            return Err(ParseError::InvalidArrayHeader);
        }

        let (count, mut consumed) = match read_integer_line(buf, 1)? {
            Some(header) => header,
            None => return Ok(None),
        };
        if count < 0 {
            return Err(ParseError::InvalidArrayLength(count));
        }
        let count = count as usize;

        let mut args = Vec::with_capacity(count.min(PREALLOC_ARGS));
        for _ in 0..count {
            if consumed >= buf.len() {
                return Ok(None);
            }
            if buf[consumed] != prefix::BULK_STRING {
                return Err(ParseError::InvalidBulkHeader);
            }

            let (len, data_start) = match read_integer_line(buf, consumed + 1)? {
                Some(header) => header,
                None => return Ok(None),
            };
            if len < 0 {
                return Err(ParseError::InvalidBulkLength(len));
            }

            match self.read_bulk_payload(buf, data_start, len as usize)? {
                Some((data, next)) => {
                    args.push(data);
                    consumed = next;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((args, consumed)))
    }

    /// Decodes one reply from the server.
    ///
    /// `+`, `-` and `:` lines come back as [`RespValue::SimpleString`],
    /// [`RespValue::Error`] and [`RespValue::Integer`]; `$` as a
    /// [`RespValue::BulkString`], or [`RespValue::Null`] for `$-1`.
    ///
    /// The prefix byte is not kept in the text: the variant records the
    /// reply kind, and `serialize` puts the prefix back.
    pub fn parse_reply(&self, buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
        if buf.is_empty() {
            return Ok(None);
        }

        match buf[0] {
            prefix::SIMPLE_STRING => Ok(read_text_line(buf, 1)?
                .map(|(s, consumed)| (RespValue::SimpleString(s), consumed))),
            prefix::ERROR => {
                Ok(read_text_line(buf, 1)?.map(|(s, consumed)| (RespValue::Error(s), consumed)))
            }
            prefix::INTEGER => {
                Ok(read_integer_line(buf, 1)?.map(|(n, consumed)| (RespValue::Integer(n), consumed)))
            }
            prefix::BULK_STRING => {
                let (len, data_start) = match read_integer_line(buf, 1)? {
                    Some(header) => header,
                    None => return Ok(None),
                };
                if len == -1 {
                    return Ok(Some((RespValue::Null, data_start)));
                }
                if len < 0 {
                    return Err(ParseError::InvalidBulkLength(len));
                }
                Ok(self
                    .read_bulk_payload(buf, data_start, len as usize)?
                    .map(|(data, consumed)| (RespValue::BulkString(data), consumed)))
            }
            other => Err(ParseError::UnknownPrefix(other)),
        }
    }

    /// Reads `len` payload bytes starting at `start` plus the trailing CRLF.
    fn read_bulk_payload(
        &self,
        buf: &[u8],
        start: usize,
        len: usize,
    ) -> ParseResult<Option<(Bytes, usize)>> {
        if len > self.max_bulk_size {
            return Err(ParseError::MessageTooLarge {
                size: len,
                max: self.max_bulk_size,
            });
        }

        let end = start + len;
        if buf.len() < end + CRLF.len() {
            return Ok(None);
        }
        if &buf[end..end + CRLF.len()] != CRLF {
            return Err(ParseError::ProtocolError(
                "bulk string missing trailing CRLF".to_string(),
            ));
        }

        Ok(Some((Bytes::copy_from_slice(&buf[start..end]), end + CRLF.len())))
    }
}

/// Reads the line starting at `start` as UTF-8 text.
///
/// Returns the text and the offset just past its CRLF.
fn read_text_line(buf: &[u8], start: usize) -> ParseResult<Option<(String, usize)>> {
    match find_crlf(&buf[start..]) {
        Some(pos) => {
            let line = std::str::from_utf8(&buf[start..start + pos])
                .map_err(|e| ParseError::InvalidUtf8(e.to_string()))?;
            Ok(Some((line.to_string(), start + pos + CRLF.len())))
        }
        None => Ok(None),
    }
}

/// Reads the line starting at `start` as a signed decimal integer.
fn read_integer_line(buf: &[u8], start: usize) -> ParseResult<Option<(i64, usize)>> {
    match read_text_line(buf, start)? {
        Some((line, consumed)) => {
            let n = line
                .parse::<i64>()
                .map_err(|_| ParseError::InvalidInteger(line))?;
            Ok(Some((n, consumed)))
        }
        None => Ok(None),
    }
}

/// Finds the position of CRLF in the buffer.
///
/// Returns the position of `\r` if found, or None if CRLF is not present.
#[inline]
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}

/// Parses a single request with a default parser.
pub fn parse_command(buf: &[u8]) -> ParseResult<Option<(Vec<Bytes>, usize)>> {
    RespParser::new().parse_command(buf)
}

/// Parses a single reply with a default parser.
pub fn parse_reply(buf: &[u8]) -> ParseResult<Option<(RespValue, usize)>> {
    RespParser::new().parse_reply(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<Bytes> {
        items.iter().map(|s| Bytes::from(s.to_string())).collect()
    }

    #[test]
    fn test_parse_get_command() {
        let input = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
        let (parsed, consumed) = parse_command(input).unwrap().unwrap();
        assert_eq!(parsed, args(&["GET", "name"]));
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn test_parse_set_command_with_options() {
        let input = b"*6\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n$2\r\nNX\r\n$2\r\nEX\r\n$2\r\n10\r\n";
        let (parsed, _) = parse_command(input).unwrap().unwrap();
        assert_eq!(parsed, args(&["SET", "k", "v", "NX", "EX", "10"]));
    }

    #[test]
    fn test_parse_argument_with_spaces_and_crlf() {
        let input = b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$7\r\na b\r\nc \r\n";
        let (parsed, _) = parse_command(input).unwrap().unwrap();
        assert_eq!(parsed[2], Bytes::from("a b\r\nc "));
    }

    #[test]
    fn test_parse_empty_array() {
        let (parsed, consumed) = parse_command(b"*0\r\n").unwrap().unwrap();
        assert!(parsed.is_empty());
        assert_eq!(consumed, 4);
    }

    #[test]
    fn test_parse_command_leaves_trailing_bytes() {
        let input = b"*1\r\n$3\r\nGET\r\n*1\r\n";
        let (_, consumed) = parse_command(input).unwrap().unwrap();
        assert_eq!(consumed, 13);
    }

    #[test]
    fn test_parse_command_incomplete() {
        let full = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
        for cut in 0..full.len() {
            assert_eq!(
                parse_command(&full[..cut]).unwrap(),
                None,
                "prefix of length {} should be incomplete",
                cut
            );
        }
    }

    #[test]
    fn test_parse_command_missing_array_prefix() {
        assert_eq!(
            parse_command(b"GET name\r\n"),
            Err(ParseError::InvalidArrayHeader)
        );
    }

    #[test]
    fn test_parse_command_missing_bulk_prefix() {
        assert_eq!(
            parse_command(b"*1\r\n+GET\r\n"),
            Err(ParseError::InvalidBulkHeader)
        );
    }

    #[test]
    fn test_parse_command_non_integer_lengths() {
        assert!(matches!(
            parse_command(b"*x\r\n"),
            Err(ParseError::InvalidInteger(_))
        ));
        assert!(matches!(
            parse_command(b"*1\r\n$abc\r\nGET\r\n"),
            Err(ParseError::InvalidInteger(_))
        ));
    }

    #[test]
    fn test_parse_command_negative_lengths() {
        assert_eq!(
            parse_command(b"*-1\r\n"),
            Err(ParseError::InvalidArrayLength(-1))
        );
        assert_eq!(
            parse_command(b"*1\r\n$-1\r\n"),
            Err(ParseError::InvalidBulkLength(-1))
        );
    }

    #[test]
    fn test_parse_command_length_mismatch() {
        // Declared 2 bytes, 3 sent: the terminator lands in the wrong place
        assert!(matches!(
            parse_command(b"*1\r\n$2\r\nGET\r\n"),
            Err(ParseError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_parse_command_too_large() {
        let parser = RespParser::with_max_bulk_size(4);
        assert_eq!(
            parser.parse_command(b"*1\r\n$5\r\n"),
            Err(ParseError::MessageTooLarge { size: 5, max: 4 })
        );
    }

    #[test]
    fn test_parse_reply_status_error_integer() {
        assert_eq!(
            parse_reply(b"+OK\r\n").unwrap(),
            Some((RespValue::ok(), 5))
        );
        assert_eq!(
            parse_reply(b"-ERR unknown command: FOO\r\n").unwrap(),
            Some((RespValue::error("ERR unknown command: FOO"), 27))
        );
        assert_eq!(
            parse_reply(b":2\r\n").unwrap(),
            Some((RespValue::integer(2), 4))
        );
    }

    #[test]
    fn test_parse_reply_bulk_and_null() {
        assert_eq!(
            parse_reply(b"$3\r\nbar\r\n").unwrap(),
            Some((RespValue::bulk_string(Bytes::from("bar")), 9))
        );
        assert_eq!(
            parse_reply(b"$0\r\n\r\n").unwrap(),
            Some((RespValue::bulk_string(Bytes::new()), 6))
        );
        assert_eq!(parse_reply(b"$-1\r\n").unwrap(), Some((RespValue::Null, 5)));
    }

    #[test]
    fn test_parse_reply_incomplete() {
        assert_eq!(parse_reply(b"").unwrap(), None);
        assert_eq!(parse_reply(b"+OK").unwrap(), None);
        assert_eq!(parse_reply(b"$3\r\nba").unwrap(), None);
    }

    #[test]
    fn test_parse_reply_unknown_prefix() {
        assert_eq!(parse_reply(b"?what\r\n"), Err(ParseError::UnknownPrefix(b'?')));
    }

    #[test]
    fn test_encoded_replies_parse_back() {
        let replies = [
            RespValue::ok(),
            RespValue::error("ERR syntax error near: FOO"),
            RespValue::integer(7),
            RespValue::bulk_string(Bytes::from("value")),
            RespValue::null(),
        ];
        for reply in replies {
            let wire = reply.serialize();
            let (parsed, consumed) = parse_reply(&wire).unwrap().unwrap();
            assert_eq!(parsed, reply);
            assert_eq!(consumed, wire.len());
        }
    }

    #[test]
    fn test_encoded_command_parses_back() {
        let wire = RespValue::command(["SET", "user:101", "Ariz", "GET"]).serialize();
        let (parsed, consumed) = parse_command(&wire).unwrap().unwrap();
        assert_eq!(parsed, args(&["SET", "user:101", "Ariz", "GET"]));
        assert_eq!(consumed, wire.len());
    }

    #[test]
    fn test_binary_safe_bulk_string() {
        let input = b"*1\r\n$5\r\nhel\x00o\r\n";
        let (parsed, _) = parse_command(input).unwrap().unwrap();
        assert_eq!(parsed[0], Bytes::from(&b"hel\x00o"[..]));
    }
}
