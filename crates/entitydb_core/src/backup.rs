//! Point-in-time backup and restore (spec §4.7, `SPEC_FULL.md` §4 "backup
//! ships as a library function, not a CLI").
//!
//! Unlike a segment-log store, a unified `.edb` file already *is* the
//! durable state in its entirety — header, tag history, and embedded WAL
//! all live in one append-only byte stream. A backup is therefore a
//! checkpointed, byte-exact copy of that stream rather than a replayed
//! log of individual records: checkpoint first so the header's entity
//! index snapshot is current, then copy every byte up to that point.
//! Restoring is the same operation in reverse — write the bytes back out
//! and open them as an ordinary repository, which replays whatever WAL
//! tail the backup captured exactly as crash recovery would.

use crate::config::Config;
use crate::error::CoreResult;
use crate::repository::Repository;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

/// Describes a completed backup.
#[derive(Debug, Clone, Copy)]
pub struct BackupMetadata {
    /// Wall-clock time the backup was taken, in nanoseconds since the
    /// Unix epoch.
    pub timestamp_nanos: i64,
    /// Size of the backed-up file, in bytes.
    pub size: u64,
}

/// Checkpoints `repo` and copies its backing file to `destination`.
///
/// `destination` must not already exist. This only supports
/// file-backed repositories (`Repository::open`, not
/// `Repository::open_with_backend` over an in-memory backend), since an
/// in-memory database has no file to copy.
///
/// # Errors
///
/// Returns an error if the checkpoint fails, `destination` already
/// exists, or the underlying copy fails.
pub fn backup(repo: &Repository, destination: &Path) -> CoreResult<BackupMetadata> {
    if destination.exists() {
        return Err(crate::error::CoreError::invalid(format!(
            "backup destination {} already exists",
            destination.display()
        )));
    }

    repo.checkpoint()?;
    let size = repo.reader().size()?;
    let bytes = repo.reader().read_at(0, size as usize)?;

    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(destination, &bytes)?;

    let timestamp_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
        .unwrap_or(0);

    info!(bytes = size, destination = %destination.display(), "backup complete");
    Ok(BackupMetadata { timestamp_nanos, size })
}

/// Restores a backup taken by [`backup`] into a fresh repository.
///
/// `config.database_path()` must not already exist; this is a restore
/// into a new location, not an in-place overwrite of a live database.
///
/// # Errors
///
/// Returns an error if `source` cannot be read, the target path already
/// has a database file, or the restored bytes fail to open (a
/// truncated or corrupt backup surfaces the same errors
/// `Repository::open` would for any other damaged file).
pub fn restore(source: &Path, config: Config) -> CoreResult<Repository> {
    let target = config.database_path();
    if target.exists() {
        return Err(crate::error::CoreError::invalid(format!(
            "restore target {} already exists",
            target.display()
        )));
    }

    std::fs::create_dir_all(&config.data_path)?;
    let bytes = std::fs::read(source)?;
    std::fs::write(&target, &bytes)?;

    info!(source = %source.display(), target = %target.display(), "restoring backup");
    Repository::open(config)
}
