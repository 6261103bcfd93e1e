//! Snapshot Section Parser
//!
//! [`SnapshotParser`] walks the opcode stream and yields one
//! [`SnapshotRecord`] per string entry. It is an iterator of
//! `Result<SnapshotRecord, SnapshotError>`:
//!
//! - `Some(Ok(record))` - an entry of the loaded database
//! - `Some(Err(e))` with `e.is_recoverable()` - one entry was skipped, keep going
//! - `Some(Err(e))` otherwise - the stream is damaged; the iterator ends after it
//! - `None` - EOF marker reached (or a previous error ended the stream)
//!
//! Only the first database selected in the file is loaded. Entries of any
//! later database with a different index are read and dropped.

use crate::snapshot::reader::{Field, SnapshotReader};
use crate::snapshot::{opcode, SnapshotError, SnapshotResult, HEADER_LEN, MAGIC};
use bytes::Bytes;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace};

/// One decoded key/value entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub key: Bytes,
    pub value: Bytes,
    /// Absolute expiry (None = never expires)
    pub expire_at: Option<SystemTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// After the header, before any database selector
    Preamble,
    /// Inside a database section
    Database { loading: bool },
    /// EOF marker consumed
    Done,
    /// Stopped on a non-recoverable error
    Failed,
}

/// Streaming parser over an in-memory snapshot.
#[derive(Debug)]
pub struct SnapshotParser {
    reader: SnapshotReader,
    version: u32,
    state: State,
    primary_db: Option<u64>,
    checksum: Option<u64>,
}

impl SnapshotParser {
    /// Validates the header and positions the parser on the first section.
    pub fn new(data: Bytes) -> SnapshotResult<Self> {
        let mut reader = SnapshotReader::new(data);
        let header = reader.read_bytes(HEADER_LEN).map_err(|_| {
            SnapshotError::InvalidHeader(format!("file shorter than {} bytes", HEADER_LEN))
        })?;

        let (magic, version) = header.split_at(MAGIC.len());
        if magic != MAGIC {
            return Err(SnapshotError::InvalidHeader(format!(
                "bad magic {:?}",
                String::from_utf8_lossy(magic)
            )));
        }
        if !version.iter().all(u8::is_ascii_digit) {
            return Err(SnapshotError::InvalidHeader(format!(
                "bad version {:?}",
                String::from_utf8_lossy(version)
            )));
        }
        // Four ASCII digits always fit
        let version = version
            .iter()
            .fold(0u32, |acc, d| acc * 10 + u32::from(d - b'0'));

        debug!(version = version, "Snapshot header accepted");

        Ok(Self {
            reader,
            version,
            state: State::Preamble,
            primary_db: None,
            checksum: None,
        })
    }

    /// Format version from the header.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Checksum from the EOF trailer, once reached. Never verified.
    pub fn checksum(&self) -> Option<u64> {
        self.checksum
    }

    /// True once the EOF marker has been consumed.
    pub fn is_complete(&self) -> bool {
        self.state == State::Done
    }

    /// Advances through sections until the next record or EOF.
    fn step(&mut self) -> SnapshotResult<Option<SnapshotRecord>> {
        loop {
            let offset = self.reader.offset();
            let op = self.reader.read_u8()?;

            match (op, self.state) {
                (opcode::EOF, _) => {
                    self.finish();
                    return Ok(None);
                }
                (opcode::AUX, _) => self.skip_metadata()?,
                (opcode::SELECT_DB, _) => self.select_db()?,
                (_, State::Preamble) => {
                    return Err(SnapshotError::UnexpectedOpcode {
                        opcode: op,
                        offset,
                        context: "before database selector",
                    })
                }
                (opcode::RESIZE_DB, _) => {
                    let total = self.reader.read_length()?;
                    let expiring = self.reader.read_length()?;
                    trace!(total = total, expiring = expiring, "Hash table size hint");
                }
                (opcode::EXPIRE_MS, _) => {
                    let ms = self.reader.read_u64_le()?;
                    let expire_at = UNIX_EPOCH.checked_add(Duration::from_millis(ms));
                    let value_type = self.read_value_type()?;
                    if let Some(record) = self.read_entry(value_type, expire_at)? {
                        return Ok(Some(record));
                    }
                }
                (opcode::EXPIRE_SECS, _) => {
                    let secs = self.reader.read_u32_le()?;
                    let expire_at = UNIX_EPOCH.checked_add(Duration::from_secs(u64::from(secs)));
                    let value_type = self.read_value_type()?;
                    if let Some(record) = self.read_entry(value_type, expire_at)? {
                        return Ok(Some(record));
                    }
                }
                (opcode::IDLE, _) | (opcode::FREQ, _) => self.skip_hint(op)?,
                (value_type, _) => {
                    if let Some(record) = self.read_entry(value_type, None)? {
                        return Ok(Some(record));
                    }
                }
            }
        }
    }

    fn finish(&mut self) {
        // Version 5+ files carry an 8-byte checksum; older ones end here.
        self.checksum = self.reader.read_u64_le().ok();
        self.state = State::Done;
        debug!(
            checksum = ?self.checksum,
            trailing = self.reader.remaining(),
            "Snapshot EOF reached"
        );
    }

    fn skip_metadata(&mut self) -> SnapshotResult<()> {
        let name = self.reader.read_string()?;
        let value = self.reader.read_string()?;

        if let (Field::Decoded(name), Field::Decoded(value)) = (&name, &value) {
            trace!(
                name = %String::from_utf8_lossy(name),
                value = %String::from_utf8_lossy(value),
                "Skipping snapshot metadata"
            );
        }
        Ok(())
    }

    fn select_db(&mut self) -> SnapshotResult<()> {
        let index = self.reader.read_length()?;
        let primary = *self.primary_db.get_or_insert(index);
        let loading = primary == index;

        if loading {
            debug!(db = index, "Loading database section");
        } else {
            debug!(db = index, loaded_db = primary, "Ignoring extra database section");
        }
        self.state = State::Database { loading };
        Ok(())
    }

    /// LRU idle time and LFU frequency hints carry no data we keep.
    fn skip_hint(&mut self, op: u8) -> SnapshotResult<()> {
        if op == opcode::IDLE {
            self.reader.read_length()?;
        } else {
            self.reader.read_u8()?;
        }
        Ok(())
    }

    /// Reads the value type after an expiry, skipping any eviction hints.
    fn read_value_type(&mut self) -> SnapshotResult<u8> {
        loop {
            let op = self.reader.read_u8()?;
            match op {
                opcode::IDLE | opcode::FREQ => self.skip_hint(op)?,
                _ => return Ok(op),
            }
        }
    }

    fn read_entry(
        &mut self,
        value_type: u8,
        expire_at: Option<SystemTime>,
    ) -> SnapshotResult<Option<SnapshotRecord>> {
        // The type byte has already been consumed
        let offset = self.reader.offset() - 1;

        if value_type != opcode::TYPE_STRING {
            return Err(SnapshotError::UnsupportedValueType { value_type, offset });
        }

        // Both fields are always read so a skipped key still leaves the
        // cursor on the next entry.
        let key = self.reader.read_string()?;
        let value = self.reader.read_string()?;

        let (key, value) = match (key, value) {
            (Field::Decoded(key), Field::Decoded(value)) => (key, value),
            (Field::Skipped(e), _) | (_, Field::Skipped(e)) => return Err(e),
        };

        if self.state != (State::Database { loading: true }) {
            trace!(key = %String::from_utf8_lossy(&key), "Dropping entry of ignored database");
            return Ok(None);
        }

        Ok(Some(SnapshotRecord {
            key,
            value,
            expire_at,
        }))
    }
}

impl Iterator for SnapshotParser {
    type Item = SnapshotResult<SnapshotRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if matches!(self.state, State::Done | State::Failed) {
            return None;
        }

        match self.step() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => None,
            Err(e) => {
                if !e.is_recoverable() {
                    self.state = State::Failed;
                }
                Some(Err(e))
            }
        }
    }
}
