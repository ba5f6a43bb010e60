//! Command Handler
//!
//! Turns a decoded request (verb + argument tokens) into a store operation and
//! a reply. Every failure a client can cause here is a [`CommandError`], sent
//! back as `-ERR <message>`; the connection stays open afterwards.
//!
//! ## Supported Commands
//!
//! - `GET key` - value, or null if absent or expired
//! - `SET key value [NX|XX] [GET] [EX seconds]` - see [`CommandHandler`] for
//!   the evaluation order
//! - `DEL key [key ...]` - number of keys removed
//!
//! Verbs are case-insensitive.

use crate::commands::SetOptions;
use crate::protocol::RespValue;
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::trace;

/// Errors reported to the client as an error reply.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    EmptyCommand,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("wrong number of arguments for {0} command")]
    WrongArity(&'static str),

    #[error("syntax error: EX requires seconds")]
    ExRequiresSeconds,

    #[error("invalid expire time in SET command")]
    InvalidExpireTime,

    #[error("syntax error near: {0}")]
    SyntaxErrorNear(String),

    #[error("syntax error: NX and XX options at the same time are not compatible")]
    NxXxIncompatible,
}

impl CommandError {
    /// The wire form of this error: `-ERR <message>`.
    pub fn to_resp(&self) -> RespValue {
        RespValue::error(format!("ERR {}", self))
    }
}

type CommandResult = Result<RespValue, CommandError>;

/// Executes commands against the shared storage engine.
///
/// Cloning is cheap; each connection gets its own clone.
///
/// # SET evaluation
///
/// Options are parsed completely before the store is touched. Then, holding
/// the key's lock:
///
/// 1. the current entry is fetched (expired entries are removed first);
/// 2. if NX is set and the key exists, or XX is set and it does not, nothing
///    is written and the reply is the prior value when GET was requested and
///    the key existed, null otherwise;
/// 3. the new value and TTL are installed;
/// 4. the reply is the prior value (or null) when GET was requested, `OK`
///    otherwise.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    /// Creates a new command handler with the given storage engine.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Executes a command and returns the reply to send back.
    ///
    /// `args[0]` is the verb; the remaining tokens are its arguments.
    pub fn execute(&self, args: &[Bytes]) -> RespValue {
        match self.dispatch(args) {
            Ok(reply) => reply,
            Err(e) => {
                trace!(error = %e, "Command rejected");
                e.to_resp()
            }
        }
    }

    /// Dispatches a command to its handler.
    fn dispatch(&self, args: &[Bytes]) -> CommandResult {
        let (verb, rest) = args.split_first().ok_or(CommandError::EmptyCommand)?;
        let name = String::from_utf8_lossy(verb);

        trace!(command = %name, args = rest.len(), "Executing command");

        match name.to_ascii_uppercase().as_str() {
            "GET" => self.cmd_get(rest),
            "SET" => self.cmd_set(rest),
            "DEL" => self.cmd_del(rest),
            _ => Err(CommandError::UnknownCommand(name.into_owned())),
        }
    }

    /// GET key
    fn cmd_get(&self, args: &[Bytes]) -> CommandResult {
        let [key] = args else {
            return Err(CommandError::WrongArity("GET"));
        };

        Ok(bulk_or_null(self.storage.get(key)))
    }

    /// SET key value [NX|XX] [GET] [EX seconds]
    fn cmd_set(&self, args: &[Bytes]) -> CommandResult {
        let [key, value, options @ ..] = args else {
            return Err(CommandError::WrongArity("SET"));
        };

        let opts = SetOptions::parse(options)?;
        let expires_at = opts.expires_at(Instant::now())?;

        let mut guard = self.storage.lock_key(key.clone());
        let prior = guard.get();
        let exists = prior.is_some();

        if (opts.nx && exists) || (opts.xx && !exists) {
            return Ok(if opts.get {
                bulk_or_null(prior)
            } else {
                RespValue::null()
            });
        }

        guard.set_value(value.clone(), expires_at);

        if opts.get {
            Ok(bulk_or_null(prior))
        } else {
            Ok(RespValue::ok())
        }
    }

    /// DEL key [key ...]
    ///
    /// Counts raw presence: an expired entry nobody has touched yet is still
    /// removed and counted.
    fn cmd_del(&self, args: &[Bytes]) -> CommandResult {
        if args.is_empty() {
            return Err(CommandError::WrongArity("DEL"));
        }

        let deleted = args.iter().filter(|key| self.storage.delete(key)).count();
        Ok(RespValue::integer(deleted as i64))
    }
}

fn bulk_or_null(value: Option<Bytes>) -> RespValue {
    match value {
        Some(v) => RespValue::bulk_string(v),
        None => RespValue::null(),
    }
}
