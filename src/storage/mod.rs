//! Storage Engine Module
//!
//! A thread-safe, sharded key-value store with per-entry TTL, plus an opt-in
//! background sweeper.
//!
//! - **Sharded Storage**: 64 independent shards reduce lock contention
//! - **RwLock**: Multiple concurrent readers, exclusive writers
//! - **Lazy Expiry**: Expired keys are removed by the access that finds them
//! - **Active Expiry**: Optional sweeper for keys nobody reads again
//!
//! ## Example
//!
//! ```
//! use emberkv::storage::StorageEngine;
//! use bytes::Bytes;
//! use std::time::Duration;
//!
//! let engine = StorageEngine::new();
//! engine.set(Bytes::from("name"), Bytes::from("Ariz"), None);
//! engine.set(
//!     Bytes::from("session"),
//!     Bytes::from("token123"),
//!     Some(Duration::from_secs(3600)),
//! );
//! assert_eq!(engine.keys("*").len(), 2);
//! ```

pub mod engine;
pub mod expiry;

pub use engine::{Entry, StorageEngine};
pub use expiry::{ExpiryConfig, ExpirySweeper};
