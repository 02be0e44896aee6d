//! Entity index entries: the dense array that maps entity IDs to their
//! payload location.

use crate::error::{CodecError, CodecResult};

/// Width, in bytes, of the zero-padded entity ID field within an index entry.
pub const ID_WIDTH: usize = 36;

/// Size of an encoded [`IndexEntry`], in bytes: 36 (id) + 8 (offset) + 4 (size) + 4 (flags).
pub const INDEX_ENTRY_SIZE: usize = ID_WIDTH + 8 + 4 + 4;

/// Set when the entity has been deleted; the payload remains on disk
/// until compaction but is hidden from reads.
pub const FLAG_TOMBSTONE: u32 = 0b0000_0001;

/// Set when the referenced payload is stored compressed.
///
/// The file format reserves this bit; EntityDB does not currently write
/// compressed payloads (spec treats the tag-dictionary/compression path as
/// optional), but a conforming reader must not choke on it being set.
pub const FLAG_COMPRESSED: u32 = 0b0000_0010;

/// A single entry in the entity index region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Entity identifier, up to [`ID_WIDTH`] bytes of UTF-8.
    pub id: String,
    /// Byte offset of the entity's payload in the payload region.
    pub offset: u64,
    /// Size in bytes of the entity's payload.
    pub size: u32,
    /// Flag bits ([`FLAG_TOMBSTONE`], [`FLAG_COMPRESSED`]).
    pub flags: u32,
}

impl IndexEntry {
    /// Returns `true` if this entry's [`FLAG_TOMBSTONE`] bit is set.
    #[must_use]
    pub const fn is_tombstoned(&self) -> bool {
        self.flags & FLAG_TOMBSTONE != 0
    }

    /// Returns a copy of this entry with the tombstone flag set.
    #[must_use]
    pub fn tombstoned(mut self) -> Self {
        self.flags |= FLAG_TOMBSTONE;
        self
    }

    /// Encodes the entry into its fixed [`INDEX_ENTRY_SIZE`]-byte form.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::IdTooLong`] if `id` does not fit in
    /// [`ID_WIDTH`] bytes of UTF-8.
    pub fn encode(&self) -> CodecResult<[u8; INDEX_ENTRY_SIZE]> {
        let id_bytes = self.id.as_bytes();
        if id_bytes.len() > ID_WIDTH {
            return Err(CodecError::IdTooLong {
                len: id_bytes.len(),
                max: ID_WIDTH,
            });
        }

        let mut buf = [0u8; INDEX_ENTRY_SIZE];
        buf[0..id_bytes.len()].copy_from_slice(id_bytes);
        buf[ID_WIDTH..ID_WIDTH + 8].copy_from_slice(&self.offset.to_le_bytes());
        buf[ID_WIDTH + 8..ID_WIDTH + 12].copy_from_slice(&self.size.to_le_bytes());
        buf[ID_WIDTH + 12..ID_WIDTH + 16].copy_from_slice(&self.flags.to_le_bytes());
        Ok(buf)
    }

    /// Decodes an entry from a buffer of at least [`INDEX_ENTRY_SIZE`] bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] if `buf` is too short, or
    /// [`CodecError::InvalidUtf8`] if the padded ID field is not valid UTF-8.
    pub fn decode(buf: &[u8]) -> CodecResult<Self> {
        if buf.len() < INDEX_ENTRY_SIZE {
            return Err(CodecError::Truncated {
                offset: 0,
                needed: INDEX_ENTRY_SIZE,
                field: "index_entry",
            });
        }

        let id_field = &buf[0..ID_WIDTH];
        let id_len = id_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(ID_WIDTH);
        let id = std::str::from_utf8(&id_field[..id_len])
            .map_err(|_| CodecError::InvalidUtf8 { field: "id" })?
            .to_string();

        let offset = u64::from_le_bytes(buf[ID_WIDTH..ID_WIDTH + 8].try_into().unwrap());
        let size = u32::from_le_bytes(buf[ID_WIDTH + 8..ID_WIDTH + 12].try_into().unwrap());
        let flags = u32::from_le_bytes(buf[ID_WIDTH + 12..ID_WIDTH + 16].try_into().unwrap());

        Ok(Self {
            id,
            offset,
            size,
            flags,
        })
    }
}
