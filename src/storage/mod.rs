//! Storage Engine Module
//!
//! The in-memory store shared by all connections: a sharded map from key to
//! value with an optional expiry instant, expired lazily on access.
//!
//! ## Features
//!
//! - **Sharded Storage**: 64 independent shards reduce lock contention
//! - **TTL Support**: Entries may carry an absolute expiry instant
//! - **Lazy Expiry**: Expired keys are removed when read, written or checked
//! - **Per-key critical sections**: [`KeyGuard`] for check-then-write sequences
//!
//! ## Example
//!
//! ```
//! use sparkkv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::sync::Arc;
//!
//! let engine = Arc::new(StorageEngine::new());
//!
//! // SET key value NX, as one critical section
//! let mut guard = engine.lock_key(Bytes::from("name"));
//! if !guard.exists_fresh() {
//!     guard.set_value(Bytes::from("Ariz"), None);
//! }
//! drop(guard);
//!
//! assert_eq!(engine.get(b"name"), Some(Bytes::from("Ariz")));
//! ```

pub mod engine;

pub use engine::{Entry, KeyGuard, StorageEngine, StorageStats};
