//! Single-producer writer: encode, append to the WAL, fsync (spec §4.4).
//!
//! The writer owns nothing about the tag index or cache — those are the
//! repository's job, carried out under its write lock once the write here
//! has returned durably. All this type does is turn a normalized entity
//! mutation into bytes on disk and report back where they landed.

use crate::entity::{Entity, EntityId, Tag};
use crate::error::CoreResult;
use crate::wal::{self, WalEntry, WalOp, WalRecord};
use entitydb_codec::EntityRecord;
use entitydb_storage::StorageBackend;
use parking_lot::RwLock;
use std::sync::Arc;

/// Everything the repository needs to update its index after a durable
/// write: where the payload landed and how large it is.
pub struct WriteOutcome {
    /// The raw WAL scan result (envelope + payload offsets).
    pub entry: WalEntry,
    /// Encoded length of the `EntityRecord` payload, for the index entry's
    /// `size` field. `0` for `Delete`.
    pub payload_len: u32,
}

/// Appends entity mutations to the WAL, one at a time.
#[derive(Clone)]
pub struct Writer {
    backend: Arc<RwLock<Box<dyn StorageBackend>>>,
}

impl Writer {
    /// Wraps a shared backend handle.
    #[must_use]
    pub fn new(backend: Arc<RwLock<Box<dyn StorageBackend>>>) -> Self {
        Self { backend }
    }

    /// Serializes `tags`/`content` into an `EntityRecord`, appends a
    /// `Create` or `Update` WAL record, and fsyncs.
    ///
    /// # Errors
    ///
    /// Returns [`entitydb_codec::CodecError`]-derived errors if a tag
    /// exceeds the length limit, or a storage error if the append fails.
    pub fn write_upsert(
        &self,
        id: &EntityId,
        op: WalOp,
        modified_nanos: i64,
        tags: &[Tag],
        content: Option<Vec<u8>>,
    ) -> CoreResult<WriteOutcome> {
        let record = EntityRecord {
            modified_nanos,
            tags: tags.iter().map(Tag::to_persisted).collect(),
            content,
        };
        let payload = record.encode()?;
        let payload_len = u32::try_from(payload.len())
            .map_err(|_| crate::error::CoreError::invalid("entity payload exceeds 4 GiB"))?;

        let wal_record = WalRecord {
            id: id.clone(),
            op,
            payload: Some(payload),
        };

        let mut backend = self.backend.write();
        let entry = wal::append_and_sync(backend.as_mut(), wal_record)?;

        Ok(WriteOutcome { entry, payload_len })
    }

    /// Appends a `Delete` (tombstone) WAL record and fsyncs.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the append fails.
    pub fn write_delete(&self, id: &EntityId) -> CoreResult<WriteOutcome> {
        let wal_record = WalRecord {
            id: id.clone(),
            op: WalOp::Delete,
            payload: None,
        };
        let mut backend = self.backend.write();
        let entry = wal::append_and_sync(backend.as_mut(), wal_record)?;
        Ok(WriteOutcome {
            entry,
            payload_len: 0,
        })
    }
}

/// Assembles the full [`Entity`] view that will be indexed/cached after a
/// successful write, given the record fields that were just persisted.
pub fn assemble_entity(
    id: EntityId,
    tags: Vec<Tag>,
    content: Option<Vec<u8>>,
    created_at: i64,
    updated_at: i64,
) -> Entity {
    Entity {
        id,
        tags,
        content,
        created_at,
        updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use entitydb_storage::InMemoryBackend;

    fn writer() -> Writer {
        let backend: Box<dyn StorageBackend> = Box::new(InMemoryBackend::new());
        Writer::new(Arc::new(RwLock::new(backend)))
    }

    #[test]
    fn write_upsert_then_delete() {
        let w = writer();
        let id = EntityId::from_string("e1");
        let tags = vec![Tag::new(1, "type:demo")];
        let outcome = w
            .write_upsert(&id, WalOp::Create, 1, &tags, Some(b"hi".to_vec()))
            .unwrap();
        assert!(outcome.payload_len > 0);
        assert!(outcome.entry.payload_offset > 0 || outcome.entry.payload_offset == 0);

        let delete_outcome = w.write_delete(&id).unwrap();
        assert_eq!(delete_outcome.payload_len, 0);
    }
}
