//! Applies snapshot records to the storage engine.

use crate::snapshot::{SnapshotError, SnapshotParser, SnapshotResult};
use crate::storage::StorageEngine;
use bytes::Bytes;
use std::path::Path;
use std::time::SystemTime;
use tracing::{info, warn};

/// Outcome of a snapshot load that got past the header.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Format version from the header
    pub version: u32,
    /// Records inserted into the store
    pub loaded: u64,
    /// Records discarded because their deadline had already passed
    pub expired: u64,
    /// Skipped records and the error that ended the load, if any
    pub errors: Vec<SnapshotError>,
    /// Checksum from the trailer, if present (not verified)
    pub checksum: Option<u64>,
}

impl LoadReport {
    /// True if the EOF marker was reached with nothing skipped.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Reads `path` and loads its contents into `engine`.
///
/// Returns `Err` only when the file cannot be read or its header is invalid;
/// in that case nothing has been inserted.
pub fn load_file(path: &Path, engine: &StorageEngine) -> SnapshotResult<LoadReport> {
    let data = std::fs::read(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    info!(path = %path.display(), size = data.len(), "Loading snapshot");

    let report = load_bytes(Bytes::from(data), engine, SystemTime::now())?;

    info!(
        version = report.version,
        loaded = report.loaded,
        expired = report.expired,
        errors = report.errors.len(),
        "Snapshot loaded"
    );
    Ok(report)
}

/// Loads an in-memory snapshot, judging expiry against `now`.
pub fn load_bytes(
    data: Bytes,
    engine: &StorageEngine,
    now: SystemTime,
) -> SnapshotResult<LoadReport> {
    let mut parser = SnapshotParser::new(data)?;
    let mut report = LoadReport {
        version: parser.version(),
        ..Default::default()
    };

    for item in parser.by_ref() {
        let record = match item {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Snapshot record not loaded");
                report.errors.push(e);
                continue;
            }
        };

        let ttl = match record.expire_at {
            None => None,
            Some(at) => match at.duration_since(now) {
                Ok(remaining) if !remaining.is_zero() => Some(remaining),
                // Deadline at or before now
                _ => {
                    report.expired += 1;
                    continue;
                }
            },
        };

        engine.set(record.key, record.value, ttl);
        report.loaded += 1;
    }

    report.checksum = parser.checksum();
    Ok(report)
}
