//! Thread-Safe Storage Engine with Lazy Expiry
//!
//! This module implements the single shared store behind every connection:
//! a map from key to value with an optional expiry instant.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: The map is split into shards, each behind its own lock.
//! 2. **Lazy Expiry**: An expired entry is removed the moment it is read, written
//!    or checked for existence. Nothing sweeps in the background.
//! 3. **No raw map access**: Callers only see the four store operations. Multi-step
//!    sequences on one key go through a [`KeyGuard`], which holds the shard lock.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐           │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │           │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │           │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │           │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Keys are distributed across shards using a hash function, so writers to
//! different keys rarely contend.

use bytes::Bytes;
use parking_lot::{RwLock, RwLockWriteGuard};
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Number of shards for the storage engine.
const NUM_SHARDS: usize = 64;

/// A value plus the instant it stops being visible, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: Bytes,
    /// `None` never expires
    pub expires_at: Option<Instant>,
}

impl Entry {
    pub fn new(value: Bytes, expires_at: Option<Instant>) -> Self {
        Self { value, expires_at }
    }

    /// Expired once `now` reaches the expiry instant.
    #[inline]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }
}

type ShardMap = HashMap<Bytes, Entry>;

/// A single shard containing a portion of the key-value pairs.
#[derive(Debug, Default)]
struct Shard {
    data: RwLock<ShardMap>,
}

/// Operation counters, read with [`StorageEngine::stats`].
#[derive(Debug, Default)]
struct Counters {
    get: AtomicU64,
    set: AtomicU64,
    del: AtomicU64,
    expired: AtomicU64,
}

/// A point-in-time copy of the engine's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    pub keys: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    pub del_ops: u64,
    pub expired: u64,
}

/// The key-value store shared by every connection.
///
/// Wrap it in an `Arc` and hand a clone to each connection task. All
/// operations take `&self` and lock internally.
///
/// # Example
///
/// ```
/// use sparkkv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::{Duration, Instant};
///
/// let engine = StorageEngine::new();
///
/// engine.set_value(Bytes::from("name"), Bytes::from("Ariz"), None);
/// assert_eq!(engine.get(b"name"), Some(Bytes::from("Ariz")));
///
/// let expires_at = Instant::now() + Duration::from_secs(60);
/// engine.set_value(Bytes::from("session"), Bytes::from("abc123"), Some(expires_at));
/// assert!(engine.exists_fresh(b"session"));
///
/// assert!(engine.delete(b"name"));
/// assert_eq!(engine.get(b"name"), None);
/// ```
pub struct StorageEngine {
    /// Sharded storage for reduced lock contention
    shards: Vec<Shard>,
    counters: Counters,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("keys", &self.len())
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    /// Creates a new, empty storage engine.
    pub fn new() -> Self {
        let shards = (0..NUM_SHARDS).map(|_| Shard::default()).collect();

        Self {
            shards,
            counters: Counters::default(),
        }
    }

    /// Determines which shard a key belongs to.
    #[inline]
    fn shard_index(&self, key: &[u8]) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % NUM_SHARDS
    }

    /// Gets the shard for a given key.
    #[inline]
    fn get_shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Locks the shard holding `key` for an exclusive multi-step sequence.
    ///
    /// Every other operation on any key of the same shard waits until the
    /// guard is dropped, so a check-then-write through the guard cannot
    /// interleave with another writer to the same key.
    pub fn lock_key(&self, key: Bytes) -> KeyGuard<'_> {
        let data = self.get_shard(&key).data.write();
        KeyGuard {
            key,
            data,
            counters: &self.counters,
        }
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. An expired
    /// entry is removed before returning.
    pub fn get(&self, key: &[u8]) -> Option<Bytes> {
        self.counters.get.fetch_add(1, Ordering::Relaxed);

        let shard = self.get_shard(key);

        // Read lock first: the common case is a live key or a miss
        {
            let data = shard.data.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: take the write lock and re-check, another writer may have
        // replaced the entry in between
        let mut data = shard.data.write();
        fetch_fresh(&mut data, key, &self.counters).map(|entry| entry.value.clone())
    }

    /// Installs `value` under `key`, replacing any existing entry and its TTL.
    pub fn set_value(&self, key: Bytes, value: Bytes, expires_at: Option<Instant>) {
        self.counters.set.fetch_add(1, Ordering::Relaxed);

        let mut data = self.get_shard(&key).data.write();
        data.insert(key, Entry::new(value, expires_at));
    }

    /// Deletes a key, expired or not.
    ///
    /// # Returns
    ///
    /// Returns `true` if an entry was removed.
    pub fn delete(&self, key: &[u8]) -> bool {
        self.counters.del.fetch_add(1, Ordering::Relaxed);

        let mut data = self.get_shard(key).data.write();
        data.remove(key).is_some()
    }

    /// Checks whether a live entry exists for `key`.
    ///
    /// Same lazy expiry as [`get`](Self::get): an expired entry is removed
    /// and reported as absent.
    pub fn exists_fresh(&self, key: &[u8]) -> bool {
        let shard = self.get_shard(key);
        {
            let data = shard.data.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired() => return true,
                Some(_) => {}
                None => return false,
            }
        }

        let mut data = shard.data.write();
        fetch_fresh(&mut data, key, &self.counters).is_some()
    }

    /// Returns the number of stored entries, including expired entries that
    /// have not been touched since they expired.
    pub fn len(&self) -> u64 {
        self.shards.iter().map(|s| s.data.read().len() as u64).sum()
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.data.read().is_empty())
    }

    /// Returns operation statistics.
    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.len(),
            get_ops: self.counters.get.load(Ordering::Relaxed),
            set_ops: self.counters.set.load(Ordering::Relaxed),
            del_ops: self.counters.del.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
        }
    }
}

/// Looks up `key`, removing it first if it has expired.
fn fetch_fresh<'a>(data: &'a mut ShardMap, key: &[u8], counters: &Counters) -> Option<&'a Entry> {
    if data.get(key).is_some_and(Entry::is_expired) {
        data.remove(key);
        counters.expired.fetch_add(1, Ordering::Relaxed);
        return None;
    }
    data.get(key)
}

/// Exclusive access to one key for the duration of a multi-step operation.
///
/// Obtained from [`StorageEngine::lock_key`]. The shard stays write-locked
/// until the guard is dropped.
pub struct KeyGuard<'a> {
    key: Bytes,
    data: RwLockWriteGuard<'a, ShardMap>,
    counters: &'a Counters,
}

impl KeyGuard<'_> {
    /// Same as [`StorageEngine::get`], under the held lock.
    pub fn get(&mut self) -> Option<Bytes> {
        self.counters.get.fetch_add(1, Ordering::Relaxed);
        fetch_fresh(&mut self.data, &self.key, self.counters).map(|entry| entry.value.clone())
    }

    /// Same as [`StorageEngine::exists_fresh`], under the held lock.
    pub fn exists_fresh(&mut self) -> bool {
        fetch_fresh(&mut self.data, &self.key, self.counters).is_some()
    }

    /// Same as [`StorageEngine::set_value`], under the held lock.
    pub fn set_value(&mut self, value: Bytes, expires_at: Option<Instant>) {
        self.counters.set.fetch_add(1, Ordering::Relaxed);
        self.data.insert(self.key.clone(), Entry::new(value, expires_at));
    }

    /// Same as [`StorageEngine::delete`], under the held lock.
    pub fn delete(&mut self) -> bool {
        self.counters.del.fetch_add(1, Ordering::Relaxed);
        self.data.remove(&self.key).is_some()
    }
}
