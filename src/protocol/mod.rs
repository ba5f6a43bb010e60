//! RESP Protocol Implementation
//!
//! The subset of the Redis Serialization Protocol spoken by SparkKV.
//!
//! ## Modules
//!
//! - `types`: the `RespValue` enum and its wire encoding
//! - `parser`: incremental decoding of requests and replies
//!
//! ## Example
//!
//! ```
//! use sparkkv::protocol::{parse_command, RespValue};
//! use bytes::Bytes;
//!
//! // Decoding a request
//! let data = b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n";
//! let (args, consumed) = parse_command(data).unwrap().unwrap();
//! assert_eq!(args[1], Bytes::from("name"));
//! assert_eq!(consumed, data.len());
//!
//! // Encoding a reply
//! let response = RespValue::bulk_string(Bytes::from("Ariz"));
//! assert_eq!(response.serialize(), b"$4\r\nAriz\r\n");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_command, parse_reply, ParseError, ParseResult, RespParser};
pub use types::RespValue;
