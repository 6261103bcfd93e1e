//! Command Dispatch Module
//!
//! Receives decoded [`crate::protocol::Command`]s, runs them against the
//! storage engine or the configuration map, and returns the reply.
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  FrameReader    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   Dispatcher    │  (this module)
//! │                 │
//! │  - Lookup       │
//! │  - Arity        │
//! │  - Execute      │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ StorageEngine   │  (storage module)
//! └─────────────────┘
//! ```

pub mod error;
pub mod handler;

pub use error::CommandError;
pub use handler::{CommandResult, CommandSpec, Dispatcher};
