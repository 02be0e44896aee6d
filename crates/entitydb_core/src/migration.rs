//! One-shot migration of legacy split-file databases into the unified
//! `.edb` format (spec §6: "older split-file layouts (separate `.ebf`,
//! `.wal`, `.idx`) are accepted for one major version for migration and
//! converted on first open").
//!
//! The wire shape of a single index entry never changed across the
//! split/unified boundary — only where the index region lives did — so a
//! legacy `.idx` file is just a concatenation of
//! [`entitydb_codec::IndexEntry`] records, each pointing at an offset
//! within the sibling `.ebf` payload file. Rather than copy that index
//! verbatim (its offsets are relative to a file that no longer exists
//! standalone), every live entry is replayed as a synthetic `Create`
//! record into the unified file's own WAL region. `Repository::open`'s
//! ordinary WAL-replay recovery path then rebuilds the directory, so this
//! module doesn't have to duplicate that logic.

use crate::entity::EntityId;
use crate::error::{CoreError, CoreResult};
use crate::repository::now_nanos;
use crate::wal::{self, WalOp, WalRecord};
use entitydb_codec::{FileHeader, IndexEntry, INDEX_ENTRY_SIZE};
use entitydb_storage::{FileBackend, StorageBackend};
use std::path::{Path, PathBuf};
use tracing::info;

/// The sibling files a legacy, pre-unified-format installation would have
/// used for a database named `stem` (e.g. `entities.ebf`, `.wal`, `.idx`).
pub struct LegacyLayout {
    /// Raw entity payload records.
    pub ebf: PathBuf,
    /// Legacy write-ahead log, appended verbatim after migrated records.
    pub wal: PathBuf,
    /// Legacy entity index, a flat array of `IndexEntry` records.
    pub idx: PathBuf,
}

impl LegacyLayout {
    /// Builds the expected legacy sibling paths for `stem` within `dir`.
    #[must_use]
    pub fn for_stem(dir: &Path, stem: &str) -> Self {
        Self {
            ebf: dir.join(format!("{stem}.ebf")),
            wal: dir.join(format!("{stem}.wal")),
            idx: dir.join(format!("{stem}.idx")),
        }
    }

    /// True if a legacy payload file is present — enough to attempt a
    /// migration even if the sibling `.idx`/`.wal` are missing or empty.
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.ebf.exists()
    }
}

/// Converts a legacy split-file database into a unified `.edb` file at
/// `target`. `target` must not already exist.
///
/// # Errors
///
/// Returns an error if any legacy file cannot be read, an index or
/// payload record fails to decode, or the target file cannot be written.
pub fn convert(layout: &LegacyLayout, target: &Path) -> CoreResult<()> {
    let ebf = std::fs::read(&layout.ebf)?;
    let idx = if layout.idx.exists() {
        std::fs::read(&layout.idx)?
    } else {
        Vec::new()
    };

    let mut backend = FileBackend::open(target)?;
    let now = now_nanos();
    backend.append(&FileHeader::new_empty(now).encode())?;
    backend.flush()?;
    backend.sync()?;

    let mut migrated = 0u64;
    for chunk in idx.chunks_exact(INDEX_ENTRY_SIZE) {
        let entry = IndexEntry::decode(chunk)?;
        if entry.is_tombstoned() {
            continue;
        }

        let start = usize::try_from(entry.offset)
            .map_err(|_| CoreError::corrupt("legacy_idx", "offset overflows usize"))?;
        let end = start
            .checked_add(entry.size as usize)
            .ok_or_else(|| CoreError::corrupt("legacy_idx", "entry size overflows"))?;
        if end > ebf.len() {
            return Err(CoreError::corrupt_at(
                entry.offset,
                "legacy_idx",
                "entry extends past end of .ebf",
            ));
        }
        let payload = &ebf[start..end];
        // Validate before re-wrapping: a legacy payload is already an
        // `EntityRecord` encoding, so this is the same checksum check the
        // reader would perform on first access after migration.
        entitydb_codec::EntityRecord::decode(payload)?;

        let record = WalRecord {
            id: EntityId::from_string(entry.id.clone()),
            op: WalOp::Create,
            payload: Some(payload.to_vec()),
        };
        wal::append_and_sync(&mut backend, record)?;
        migrated += 1;
    }

    if layout.wal.exists() {
        let legacy_wal = std::fs::read(&layout.wal)?;
        if !legacy_wal.is_empty() {
            backend.append(&legacy_wal)?;
            backend.flush()?;
            backend.sync()?;
        }
    }

    info!(
        migrated,
        ebf = %layout.ebf.display(),
        target = %target.display(),
        "converted legacy split-file database to unified format"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::entity::EntityId;
    use crate::repository::Repository;
    use entitydb_codec::{EntityRecord, HEADER_SIZE};
    use tempfile::tempdir;

    #[test]
    fn is_present_false_without_ebf() {
        let dir = tempdir().unwrap();
        let layout = LegacyLayout::for_stem(dir.path(), "entities");
        assert!(!layout.is_present());
    }

    #[test]
    fn converts_legacy_layout_into_openable_unified_file() {
        let dir = tempdir().unwrap();
        let layout = LegacyLayout::for_stem(dir.path(), "entities");

        let record = EntityRecord {
            modified_nanos: 42,
            tags: vec!["42|type:legacy".to_string()],
            content: Some(b"hi".to_vec()),
        };
        let encoded = record.encode().unwrap();
        std::fs::write(&layout.ebf, &encoded).unwrap();

        let entry = IndexEntry {
            id: "legacy-1".to_string(),
            offset: 0,
            size: u32::try_from(encoded.len()).unwrap(),
            flags: 0,
        };
        std::fs::write(&layout.idx, entry.encode().unwrap()).unwrap();

        let target = dir.path().join("entities.edb");
        convert(&layout, &target).unwrap();
        assert!(target.metadata().unwrap().len() > HEADER_SIZE as u64);

        let repo = Repository::open(Config::new().data_path(dir.path()).database_filename("entities.edb")).unwrap();
        let fetched = repo.get_by_id(&EntityId::from_string("legacy-1")).unwrap();
        assert_eq!(fetched.content, Some(b"hi".to_vec()));
        assert!(fetched.has_current_tag("type:legacy"));
    }

    #[test]
    fn tombstoned_legacy_entries_are_not_migrated() {
        let dir = tempdir().unwrap();
        let layout = LegacyLayout::for_stem(dir.path(), "entities");

        let record = EntityRecord {
            modified_nanos: 1,
            tags: vec!["1|type:legacy".to_string()],
            content: None,
        };
        let encoded = record.encode().unwrap();
        std::fs::write(&layout.ebf, &encoded).unwrap();

        let entry = IndexEntry {
            id: "legacy-1".to_string(),
            offset: 0,
            size: u32::try_from(encoded.len()).unwrap(),
            flags: entitydb_codec::FLAG_TOMBSTONE,
        };
        std::fs::write(&layout.idx, entry.encode().unwrap()).unwrap();

        let target = dir.path().join("entities.edb");
        convert(&layout, &target).unwrap();

        let repo = Repository::open(Config::new().data_path(dir.path()).database_filename("entities.edb")).unwrap();
        assert!(repo.get_by_id(&EntityId::from_string("legacy-1")).is_err());
    }
}
