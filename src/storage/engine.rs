//! Thread-Safe Storage Engine with Expiry Support
//!
//! The single source of truth for cache state. Every value carries the instant
//! it was written and an optional time-to-live; a value is never handed out
//! without checking that TTL first.
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
//! A key always hashes to the same shard, so every write to it is serialized
//! by that shard's lock and readers never see a half-written [`Entry`].
//! Different keys usually land on different shards and proceed in parallel.
//!
//! ## Lazy Expiry
//!
//! `get`, `exists` and `keys` remove any expired entry they run into. Nothing
//! else is required to reclaim memory; the optional sweeper in
//! [`crate::storage::expiry`] only speeds that up.

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Number of shards for the storage engine.
const NUM_SHARDS: usize = 64;

/// A stored value with its creation time and optional TTL.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The payload
    pub value: Bytes,
    /// When the value was written
    pub created_at: Instant,
    /// Lifetime measured from `created_at` (None = never expires)
    pub ttl: Option<Duration>,
}

impl Entry {
    pub fn new(value: Bytes, ttl: Option<Duration>) -> Self {
        Self {
            value,
            created_at: Instant::now(),
            ttl,
        }
    }

    /// Absolute expiry instant, if any. A TTL past the clock's range never expires.
    pub fn expires_at(&self) -> Option<Instant> {
        self.ttl.and_then(|ttl| self.created_at.checked_add(ttl))
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    #[inline]
    fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at().is_some_and(|exp| now >= exp)
    }
}

#[derive(Debug, Default)]
struct Shard {
    data: RwLock<HashMap<Bytes, Entry>>,
}

/// The key-value store shared by every connection.
///
/// Wrap it in an `Arc` and hand clones to the dispatcher; all methods take
/// `&self` and synchronize internally.
///
/// # Example
///
/// ```
/// use emberkv::storage::StorageEngine;
/// use bytes::Bytes;
/// use std::time::Duration;
///
/// let engine = StorageEngine::new();
///
/// engine.set(Bytes::from("name"), Bytes::from("Ariz"), None);
/// assert_eq!(engine.get(&Bytes::from("name")), Some(Bytes::from("Ariz")));
///
/// engine.set(Bytes::from("session"), Bytes::from("abc"), Some(Duration::from_secs(60)));
/// assert_eq!(engine.len(), 2);
/// ```
pub struct StorageEngine {
    shards: Vec<Shard>,

    /// Keys currently held, including expired ones nobody has touched yet
    key_count: AtomicU64,

    /// Expired entries removed so far, lazily or by the sweeper
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("key_count", &self.key_count.load(Ordering::Relaxed))
            .field("expired_count", &self.expired_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Shard::default()).collect(),
            key_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    fn record_evictions(&self, n: u64) {
        if n > 0 {
            self.key_count.fetch_sub(n, Ordering::Relaxed);
            self.expired_count.fetch_add(n, Ordering::Relaxed);
        }
    }

    /// Inserts or replaces a key. Value and TTL are both replaced.
    ///
    /// Returns `true` if no live value existed for the key.
    pub fn set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) -> bool {
        let mut data = self.shard(&key).data.write();

        match data.insert(key, Entry::new(value, ttl)) {
            Some(previous) if previous.is_expired() => {
                self.expired_count.fetch_add(1, Ordering::Relaxed);
                true
            }
            Some(_) => false,
            None => {
                self.key_count.fetch_add(1, Ordering::Relaxed);
                true
            }
        }
    }

    /// Returns the value for a key, or `None` if it is absent or expired.
    ///
    /// An expired entry is removed as part of this call.
    pub fn get(&self, key: &Bytes) -> Option<Bytes> {
        let shard = self.shard(key);

        // Fast path under the read lock
        {
            let data = shard.data.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired - re-check under the write lock, a SET may have raced us
        let mut data = shard.data.write();
        match data.get(key) {
            Some(entry) if entry.is_expired() => {
                data.remove(key);
                self.record_evictions(1);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Removes a key. Returns `true` if a live value was removed.
    pub fn delete(&self, key: &Bytes) -> bool {
        let mut data = self.shard(key).data.write();

        match data.remove(key) {
            Some(entry) if entry.is_expired() => {
                self.record_evictions(1);
                false
            }
            Some(_) => {
                self.key_count.fetch_sub(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Checks whether a live value exists for the key.
    pub fn exists(&self, key: &Bytes) -> bool {
        self.get(key).is_some()
    }

    /// Returns every live key for `"*"`; any other pattern matches nothing.
    ///
    /// Expired entries met during the scan are removed.
    pub fn keys(&self, pattern: &str) -> Vec<Bytes> {
        if pattern != "*" {
            return Vec::new();
        }

        let mut result = Vec::new();
        for shard in &self.shards {
            let now = Instant::now();
            let has_expired = {
                let data = shard.data.read();
                let mut has_expired = false;
                for (key, entry) in data.iter() {
                    if entry.is_expired_at(now) {
                        has_expired = true;
                    } else {
                        result.push(key.clone());
                    }
                }
                has_expired
            };

            if has_expired {
                let mut data = shard.data.write();
                let before = data.len();
                data.retain(|_, entry| !entry.is_expired_at(now));
                self.record_evictions((before - data.len()) as u64);
            }
        }

        result
    }

    /// Approximate number of keys, possibly counting expired keys that have
    /// not been touched since they expired.
    pub fn len(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total expired entries removed so far.
    pub fn expired_count(&self) -> u64 {
        self.expired_count.load(Ordering::Relaxed)
    }

    /// Removes every expired entry from all shards.
    ///
    /// Only the background sweeper calls this. Returns the number removed.
    pub fn cleanup_expired(&self) -> u64 {
        let mut cleaned = 0u64;

        for shard in &self.shards {
            let mut data = shard.data.write();
            let before = data.len();
            let now = Instant::now();
            data.retain(|_, entry| !entry.is_expired_at(now));
            cleaned += (before - data.len()) as u64;
        }

        self.record_evictions(cleaned);
        cleaned
    }
}
