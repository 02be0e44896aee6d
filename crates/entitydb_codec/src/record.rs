//! Entity payload records: the append-only, length-prefixed encoding of an
//! entity's tags and content blob.
//!
//! A record does not carry the entity's ID — that lives in the
//! [`crate::index_entry::IndexEntry`] that points at it. Tags are stored in
//! their persisted temporal form, `"<nanos>|<body>"`, exactly as they are
//! handed to the writer; the codec does not interpret tag bodies.

use crate::crc32::compute_crc32;
use crate::error::{CodecError, CodecResult};

/// Maximum length, in bytes, of a single persisted tag string (including
/// the `nanos|` prefix).
pub const MAX_TAG_LEN: usize = 64 * 1024;

/// An entity's persisted payload: modification time, tags, and content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    /// Nanosecond timestamp of the mutation that produced this record.
    pub modified_nanos: i64,
    /// Tags in persisted temporal form (`"<nanos>|<body>"`), in insertion order.
    pub tags: Vec<String>,
    /// Opaque content blob. `None` means "no content field was ever set",
    /// distinct from `Some(vec![])` which is a legal empty content blob.
    pub content: Option<Vec<u8>>,
}

impl EntityRecord {
    /// Encodes the record to its on-disk byte form.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::TagTooLong`] if any tag exceeds [`MAX_TAG_LEN`],
    /// or [`CodecError::OutOfRange`] if a length does not fit a `u32`.
    pub fn encode(&self) -> CodecResult<Vec<u8>> {
        let tag_count = u32::try_from(self.tags.len())
            .map_err(|_| CodecError::OutOfRange { field: "tag_count" })?;

        let mut buf = Vec::new();
        buf.extend_from_slice(&self.modified_nanos.to_le_bytes());
        buf.extend_from_slice(&tag_count.to_le_bytes());
        buf.extend_from_slice(&u32::from(self.content.is_some()).to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes()); // reserved

        for tag in &self.tags {
            let bytes = tag.as_bytes();
            if bytes.len() > MAX_TAG_LEN {
                return Err(CodecError::TagTooLong {
                    len: bytes.len(),
                    max: MAX_TAG_LEN,
                });
            }
            let len = u32::try_from(bytes.len())
                .map_err(|_| CodecError::OutOfRange { field: "tag_len" })?;
            buf.extend_from_slice(&len.to_le_bytes());
            buf.extend_from_slice(bytes);
        }

        if let Some(content) = &self.content {
            let len = u32::try_from(content.len())
                .map_err(|_| CodecError::OutOfRange { field: "content_len" })?;
            buf.extend_from_slice(&len.to_le_bytes());
            buf.extend_from_slice(content);
            buf.extend_from_slice(&compute_crc32(content).to_le_bytes());
        }

        Ok(buf)
    }

    /// Decodes a record from `buf`, verifying the content checksum.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Truncated`] or [`CodecError::LengthOutOfBounds`]
    /// if the buffer is malformed, [`CodecError::InvalidUtf8`] if a tag is
    /// not valid UTF-8, or [`CodecError::ChecksumMismatch`] if the content
    /// CRC32 does not match.
    pub fn decode(buf: &[u8]) -> CodecResult<Self> {
        let mut cursor = 0usize;

        let modified_nanos = read_i64(buf, &mut cursor, "modified_nanos")?;
        let tag_count = read_u32(buf, &mut cursor, "tag_count")?;
        let has_content = read_u32(buf, &mut cursor, "content_item_count")? != 0;
        let _reserved = read_u32(buf, &mut cursor, "reserved")?;

        let mut tags = Vec::with_capacity(tag_count as usize);
        for _ in 0..tag_count {
            let len = read_u32(buf, &mut cursor, "tag_len")? as usize;
            let bytes = read_slice(buf, &mut cursor, len, "tag_body")?;
            let tag = std::str::from_utf8(bytes)
                .map_err(|_| CodecError::InvalidUtf8 { field: "tag" })?
                .to_string();
            tags.push(tag);
        }

        let content = if has_content {
            let len = read_u32(buf, &mut cursor, "content_len")? as usize;
            let bytes = read_slice(buf, &mut cursor, len, "content")?.to_vec();
            let expected = read_u32(buf, &mut cursor, "content_crc32")?;
            let computed = compute_crc32(&bytes);
            if expected != computed {
                return Err(CodecError::ChecksumMismatch { expected, computed });
            }
            Some(bytes)
        } else {
            None
        };

        Ok(Self {
            modified_nanos,
            tags,
            content,
        })
    }
}

fn read_i64(buf: &[u8], cursor: &mut usize, field: &'static str) -> CodecResult<i64> {
    let bytes = read_slice(buf, cursor, 8, field)?;
    Ok(i64::from_le_bytes(bytes.try_into().unwrap()))
}

fn read_u32(buf: &[u8], cursor: &mut usize, field: &'static str) -> CodecResult<u32> {
    let bytes = read_slice(buf, cursor, 4, field)?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

fn read_slice<'a>(
    buf: &'a [u8],
    cursor: &mut usize,
    len: usize,
    field: &'static str,
) -> CodecResult<&'a [u8]> {
    let available = buf.len().saturating_sub(*cursor);
    if len > available {
        return Err(CodecError::LengthOutOfBounds {
            field,
            len,
            available,
        });
    }
    let slice = &buf[*cursor..*cursor + len];
    *cursor += len;
    Ok(slice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_with_content() {
        let record = EntityRecord {
            modified_nanos: 123,
            tags: vec!["100|type:demo".to_string(), "100|k:v".to_string()],
            content: Some(b"hi".to_vec()),
        };
        let encoded = record.encode().unwrap();
        let decoded = EntityRecord::decode(&encoded).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn roundtrip_no_content() {
        let record = EntityRecord {
            modified_nanos: 1,
            tags: vec![],
            content: None,
        };
        let encoded = record.encode().unwrap();
        let decoded = EntityRecord::decode(&encoded).unwrap();
        assert_eq!(decoded.content, None);
    }

    #[test]
    fn empty_content_distinct_from_no_content() {
        let with_empty = EntityRecord {
            modified_nanos: 1,
            tags: vec![],
            content: Some(vec![]),
        };
        let encoded = with_empty.encode().unwrap();
        let decoded = EntityRecord::decode(&encoded).unwrap();
        assert_eq!(decoded.content, Some(vec![]));
        assert_ne!(decoded.content, None);
    }

    #[test]
    fn duplicate_tag_bodies_preserved() {
        let record = EntityRecord {
            modified_nanos: 1,
            tags: vec!["1|status:todo".to_string(), "2|status:todo".to_string()],
            content: None,
        };
        let encoded = record.encode().unwrap();
        let decoded = EntityRecord::decode(&encoded).unwrap();
        assert_eq!(decoded.tags.len(), 2);
    }

    #[test]
    fn rejects_tag_too_long() {
        let record = EntityRecord {
            modified_nanos: 1,
            tags: vec!["x".repeat(MAX_TAG_LEN + 1)],
            content: None,
        };
        assert!(matches!(record.encode(), Err(CodecError::TagTooLong { .. })));
    }

    #[test]
    fn detects_corrupted_content() {
        let record = EntityRecord {
            modified_nanos: 1,
            tags: vec![],
            content: Some(b"hello".to_vec()),
        };
        let mut encoded = record.encode().unwrap();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xFF;
        let err = EntityRecord::decode(&encoded).unwrap_err();
        assert!(matches!(err, CodecError::ChecksumMismatch { .. }));
    }

    #[test]
    fn rejects_truncated_buffer() {
        let buf = [0u8; 4];
        let err = EntityRecord::decode(&buf).unwrap_err();
        assert!(matches!(err, CodecError::LengthOutOfBounds { .. }));
    }

    proptest::proptest! {
        #[test]
        fn roundtrip_arbitrary(
            modified_nanos: i64,
            tags in proptest::collection::vec("[a-z]{1,20}", 0..10),
            content in proptest::option::of(proptest::collection::vec(proptest::prelude::any::<u8>(), 0..200)),
        ) {
            let record = EntityRecord { modified_nanos, tags, content };
            let encoded = record.encode().unwrap();
            let decoded = EntityRecord::decode(&encoded).unwrap();
            proptest::prop_assert_eq!(record, decoded);
        }
    }
}
