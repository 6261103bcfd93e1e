//! RDB Snapshot Loading
//!
//! At startup EmberKV can seed its key space from an RDB dump. The file is a
//! sequence of sections introduced by one-byte opcodes:
//!
//! ```text
//! HEADER ─> (METADATA)* ─> SELECT_DB ─> (RESIZE_DB ─> (KEY_VALUE)*)* ─> EOF
//!
//! "REDIS0011"                  9-byte magic + version
//! FA <name> <value>            metadata, skipped
//! FE <index>                   database selector
//! FB <total> <with-expiry>     hash table size hints
//! [FC <u64 ms> | FD <u32 s>]   optional absolute expiry
//! 00 <key> <value>             string entry
//! FF <8-byte checksum>         end of file
//! ```
//!
//! ## Modules
//!
//! - `reader`: byte cursor, length and string encodings
//! - `parser`: the section state machine, yielding [`SnapshotRecord`]s
//! - `loader`: merges records into the [`crate::storage::StorageEngine`]
//!
//! ## Failure Model
//!
//! A bad header or unreadable file aborts the load. An entry stored with an
//! unsupported string encoding is skipped and loading continues. Structural
//! damage further in stops the load, keeping everything read before it. In
//! every case the server still starts.

pub mod loader;
pub mod parser;
pub mod reader;

use std::path::PathBuf;
use thiserror::Error;

pub use loader::{load_bytes, load_file, LoadReport};
pub use parser::{SnapshotParser, SnapshotRecord};
pub use reader::{Field, SnapshotReader};

/// Section and entry opcodes.
pub mod opcode {
    pub const IDLE: u8 = 0xF8;
    pub const FREQ: u8 = 0xF9;
    pub const AUX: u8 = 0xFA;
    pub const RESIZE_DB: u8 = 0xFB;
    pub const EXPIRE_MS: u8 = 0xFC;
    pub const EXPIRE_SECS: u8 = 0xFD;
    pub const SELECT_DB: u8 = 0xFE;
    pub const EOF: u8 = 0xFF;

    /// Value type of a plain string entry
    pub const TYPE_STRING: u8 = 0x00;
}

/// Magic bytes at the start of every snapshot.
pub const MAGIC: &[u8] = b"REDIS";

/// Magic plus four ASCII version digits.
pub const HEADER_LEN: usize = 9;

/// Errors raised while reading a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("cannot read snapshot {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid snapshot header: {0}")]
    InvalidHeader(String),

    /// Ran out of bytes before the EOF marker
    #[error("snapshot truncated at offset {offset}: {needed} more bytes needed")]
    Truncated { offset: usize, needed: usize },

    #[error("unexpected opcode {opcode:#04x} at offset {offset} ({context})")]
    UnexpectedOpcode {
        opcode: u8,
        offset: usize,
        context: &'static str,
    },

    /// Non-string entry; its length cannot be known without decoding it
    #[error("unsupported value type {value_type:#04x} at offset {offset}")]
    UnsupportedValueType { value_type: u8, offset: usize },

    #[error("invalid length encoding {byte:#04x} at offset {offset}")]
    InvalidLength { byte: u8, offset: usize },

    /// A string form the loader does not decode; the entry was skipped
    #[error("unsupported string encoding at offset {offset}: {kind}")]
    UnsupportedEncoding { offset: usize, kind: &'static str },
}

impl SnapshotError {
    /// True if parsing can carry on past this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SnapshotError::UnsupportedEncoding { .. })
    }
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;
