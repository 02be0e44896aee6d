//! Error taxonomy for EntityDB core operations.
//!
//! Mirrors the repository error contract: `Invalid`, `NotFound`, `IDExists`,
//! `Busy`, `IOError`, `Corrupt`, `Cancelled`, plus the diagnostic variants
//! needed to carry an entity ID, file offset, or field name back to the
//! caller.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors produced by the entity repository and its components.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Caller-supplied entity or tag was malformed.
    #[error("invalid input: {message}")]
    Invalid {
        /// Description of what was invalid.
        message: String,
    },

    /// The requested entity ID is not present in the live index.
    #[error("entity not found: {id}")]
    NotFound {
        /// The entity ID that was not found.
        id: String,
    },

    /// `Create` was called with an ID that already has a live entry.
    #[error("entity already exists: {id}")]
    IDExists {
        /// The colliding entity ID.
        id: String,
    },

    /// The writer's backpressure queue is saturated.
    #[error("writer busy, retry with backoff")]
    Busy,

    /// Underlying storage backend failure.
    #[error("storage error: {0}")]
    Storage(#[from] entitydb_storage::StorageError),

    /// Binary format codec failure.
    #[error("codec error: {0}")]
    Codec(#[from] entitydb_codec::CodecError),

    /// Unwrapped I/O failure (locking, directory creation, split-file migration).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A checksum, magic, or offset invariant was violated.
    #[error("corrupt record at offset {offset:?} ({field}): {message}")]
    Corrupt {
        /// Byte offset of the offending record, if known.
        offset: Option<u64>,
        /// Name of the field that failed validation.
        field: String,
        /// Human-readable description.
        message: String,
    },

    /// Operation was cancelled before its WAL entry was fsynced.
    #[error("operation cancelled before commit")]
    Cancelled,

    /// The WAL contains a mid-log entry that fails its checksum; this is
    /// fatal and distinct from a truncated tail entry, which is discarded.
    #[error("WAL corruption at offset {offset}: {message}")]
    WalCorruption {
        /// Byte offset of the bad WAL entry.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// The repository is closed; no further operations are accepted.
    #[error("repository is closed")]
    Closed,
}

impl CoreError {
    /// Builds a [`CoreError::Invalid`].
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Builds a [`CoreError::NotFound`].
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Builds a [`CoreError::IDExists`].
    pub fn id_exists(id: impl Into<String>) -> Self {
        Self::IDExists { id: id.into() }
    }

    /// Builds a [`CoreError::Corrupt`] with a known offset.
    pub fn corrupt_at(offset: u64, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            offset: Some(offset),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Builds a [`CoreError::Corrupt`] without a known offset.
    pub fn corrupt(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Corrupt {
            offset: None,
            field: field.into(),
            message: message.into(),
        }
    }

    /// Builds a [`CoreError::WalCorruption`].
    pub fn wal_corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::WalCorruption {
            offset,
            message: message.into(),
        }
    }

    /// Returns `true` if this error represents single-entity corruption
    /// that the repository may be able to recover from via the WAL.
    #[must_use]
    pub const fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}
