//! # EmberKV - A Minimal Redis-Compatible In-Memory Cache
//!
//! EmberKV speaks the RESP request protocol over TCP, keeps string keys in a
//! sharded in-memory map with optional per-key TTL, and can seed its key space
//! at startup from an RDB snapshot file.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              EmberKV                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ TCP Server  │───>│ Connection  │───>│ Dispatcher  │──> ServerConfig  │
//! │  │ (serve)     │    │  Handler    │    │             │                  │
//! │  └─────────────┘    └──────┬──────┘    └──────┬──────┘                  │
//! │                            │                  │                         │
//! │                            ▼                  ▼                         │
//! │                     ┌─────────────┐   ┌──────────────────────────────┐  │
//! │                     │ FrameReader │   │        StorageEngine         │  │
//! │                     │  + Command  │   │  ┌────────┐ ┌────────┐       │  │
//! │                     └─────────────┘   │  │Shard 0 │ │...63   │       │  │
//! │                                       │  │RwLock  │ │RwLock  │       │  │
//! │                                       │  └────────┘ └────────┘       │  │
//! │                                       └──────────────▲───────────────┘  │
//! │                                                      │ startup only     │
//! │                                       ┌──────────────┴───────────────┐  │
//! │                                       │   snapshot::load_file        │  │
//! │                                       └──────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use emberkv::{server, Dispatcher, ServerConfig, StorageEngine};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::new(Some("/tmp".into()), Some("dump.rdb".into()));
//!     let storage = Arc::new(StorageEngine::new());
//!
//!     if let Some(path) = config.snapshot_path() {
//!         let _ = emberkv::snapshot::load_file(&path, &storage);
//!     }
//!
//!     let dispatcher = Dispatcher::new(storage, Arc::new(config));
//!     let listener = TcpListener::bind("127.0.0.1:6379").await?;
//!     server::serve(listener, dispatcher, tokio::signal::ctrl_c()).await;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Commands
//!
//! - `PING [message]`, `ECHO message`
//! - `SET key value [PX milliseconds | EX seconds]`, `GET key`
//! - `DEL key [key ...]`, `EXISTS key [key ...]`, `DBSIZE`
//! - `KEYS *`
//! - `CONFIG GET parameter [parameter ...]` (`dir`, `dbfilename`)
//!
//! ## Module Overview
//!
//! - [`protocol`]: request framing, command decoding, reply encoding
//! - [`storage`]: thread-safe storage engine with TTL support
//! - [`snapshot`]: RDB snapshot loading
//! - [`commands`]: the command table and dispatcher
//! - [`connection`]: per-client read/dispatch/reply loop
//! - [`server`]: the accept loop
//! - [`config`]: read-only configuration map
//!
//! ## Expiry
//!
//! Expired keys are removed lazily, by the `GET`, `EXISTS` or `KEYS` that
//! finds them. A background sweeper can be enabled with `--active-expiry` to
//! reclaim keys nobody reads again.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;
pub mod snapshot;
pub mod storage;

pub use commands::{CommandError, Dispatcher};
pub use config::ServerConfig;
pub use connection::{handle_connection, ConnectionError, ConnectionHandler};
pub use protocol::{Command, FrameReader, ProtocolError, RespValue};
pub use snapshot::{LoadReport, SnapshotError};
pub use storage::{ExpiryConfig, ExpirySweeper, StorageEngine};

/// The default port EmberKV listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host EmberKV binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of EmberKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
