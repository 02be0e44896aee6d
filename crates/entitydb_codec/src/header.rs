//! The 64-byte file header.
//!
//! Every `.edb` file starts with a fixed-size, little-endian header that
//! makes the file self-describing: magic, version, the offsets and sizes
//! of the tag-dictionary and entity-index regions, the live entity count,
//! and the last-modified timestamp.

use crate::error::{CodecError, CodecResult};

/// Magic bytes identifying an EntityDB file: `"EBDF"`.
pub const MAGIC: u32 = 0x4542_4446;

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

/// Size of the encoded header, in bytes.
pub const HEADER_SIZE: usize = 64;

/// The fixed-size header at offset 0 of an EntityDB file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Format version this file was written with.
    pub version: u32,
    /// Total size of the file, in bytes, as of the last flush.
    pub file_size: u64,
    /// Byte offset of the tag-dictionary region (0 if unused).
    pub tag_dict_offset: u64,
    /// Size of the tag-dictionary region, in bytes (0 if unused).
    pub tag_dict_size: u64,
    /// Byte offset of the entity-index region.
    pub entity_index_offset: u64,
    /// Size of the entity-index region, in bytes.
    pub entity_index_size: u64,
    /// Number of live (non-tombstoned) entities.
    pub entity_count: u64,
    /// Nanosecond timestamp of the last mutation.
    pub last_modified_nanos: i64,
}

impl FileHeader {
    /// Builds a fresh header for a newly created, empty database file.
    #[must_use]
    pub fn new_empty(now_nanos: i64) -> Self {
        Self {
            version: FORMAT_VERSION,
            file_size: HEADER_SIZE as u64,
            tag_dict_offset: 0,
            tag_dict_size: 0,
            entity_index_offset: 0,
            entity_index_size: 0,
            entity_count: 0,
            last_modified_nanos: now_nanos,
        }
    }

    /// Encodes the header into its fixed 64-byte on-disk form.
    #[must_use]
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        buf[4..8].copy_from_slice(&self.version.to_le_bytes());
        buf[8..16].copy_from_slice(&self.file_size.to_le_bytes());
        buf[16..24].copy_from_slice(&self.tag_dict_offset.to_le_bytes());
        buf[24..32].copy_from_slice(&self.tag_dict_size.to_le_bytes());
        buf[32..40].copy_from_slice(&self.entity_index_offset.to_le_bytes());
        buf[40..48].copy_from_slice(&self.entity_index_size.to_le_bytes());
        buf[48..56].copy_from_slice(&self.entity_count.to_le_bytes());
        buf[56..64].copy_from_slice(&self.last_modified_nanos.to_le_bytes());
        buf
    }

    /// Decodes a header from a 64-byte buffer.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] if `buf` is shorter than
    /// [`HEADER_SIZE`], [`CodecError::BadMagic`] if the magic bytes don't
    /// match, or [`CodecError::UnsupportedVersion`] if the version is newer
    /// than this build understands.
    pub fn decode(buf: &[u8]) -> CodecResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(CodecError::Truncated {
                offset: 0,
                needed: HEADER_SIZE,
                field: "header",
            });
        }

        let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(CodecError::BadMagic {
                expected: MAGIC,
                actual: magic,
            });
        }

        let version = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        if version > FORMAT_VERSION {
            return Err(CodecError::UnsupportedVersion { version });
        }

        Ok(Self {
            version,
            file_size: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            tag_dict_offset: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            tag_dict_size: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
            entity_index_offset: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
            entity_index_size: u64::from_le_bytes(buf[40..48].try_into().unwrap()),
            entity_count: u64::from_le_bytes(buf[48..56].try_into().unwrap()),
            last_modified_nanos: i64::from_le_bytes(buf[56..64].try_into().unwrap()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let header = FileHeader {
            version: FORMAT_VERSION,
            file_size: 12_345,
            tag_dict_offset: 64,
            tag_dict_size: 0,
            entity_index_offset: 1000,
            entity_index_size: 52 * 3,
            entity_count: 3,
            last_modified_nanos: 1_700_000_000_000_000_000,
        };
        let encoded = header.encode();
        assert_eq!(encoded.len(), HEADER_SIZE);
        let decoded = FileHeader::decode(&encoded).unwrap();
        assert_eq!(header, decoded);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        let err = FileHeader::decode(&buf).unwrap_err();
        assert!(matches!(err, CodecError::BadMagic { .. }));
    }

    #[test]
    fn rejects_truncated_buffer() {
        let buf = [0u8; 10];
        let err = FileHeader::decode(&buf).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { .. }));
    }

    #[test]
    fn rejects_future_version() {
        let mut header = FileHeader::new_empty(0);
        header.version = FORMAT_VERSION + 1;
        let encoded = header.encode();
        let err = FileHeader::decode(&encoded).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedVersion { .. }));
    }

    #[test]
    fn new_empty_has_no_entities() {
        let header = FileHeader::new_empty(42);
        assert_eq!(header.entity_count, 0);
        assert_eq!(header.file_size, HEADER_SIZE as u64);
    }
}
