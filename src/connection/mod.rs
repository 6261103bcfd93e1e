//! Connection Handler Module
//!
//! Manages individual client connections. Each accepted client is served by
//! its own async task.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (server.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept() + spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 ConnectionHandler                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Read bytes  │───>│ FrameReader │───>│ Dispatcher  │     │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘     │
//! │                                               ▼             │
//! │                                      ┌─────────────┐        │
//! │                                      │ Send reply  │        │
//! │                                      └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **Pipelining**: several commands in one read are answered in order
//! - **Fragmentation**: a command split across reads is reassembled
//! - **Isolation**: a malformed request closes only its own connection

pub mod handler;

pub use handler::{handle_connection, ConnectionError, ConnectionHandler};
