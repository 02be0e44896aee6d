//! WAL record envelope: `{op, entityID, serializedEntity, crc32}` (spec §4.2).
//!
//! A WAL record's entity payload, once written, is exactly the bytes an
//! [`entitydb_codec::IndexEntry`] points at — the entity index never
//! addresses a separate "payload region"; it addresses straight into the
//! WAL's own append log. This is what lets the reader stay lock-free: the
//! payload bytes at a recorded offset never change once written.

use crate::entity::EntityId;
use crate::error::{CoreError, CoreResult};
use entitydb_codec::compute_crc32;

/// Magic bytes identifying a WAL record envelope.
pub const WAL_MAGIC: [u8; 4] = *b"EWAL";

/// Current WAL envelope format version.
pub const WAL_VERSION: u16 = 1;

/// The operation a WAL record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalOp {
    /// Entity did not previously exist.
    Create = 1,
    /// Entity is replaced with a new full snapshot.
    Update = 2,
    /// Entity is tombstoned.
    Delete = 3,
}

impl WalOp {
    fn from_byte(b: u8) -> CoreResult<Self> {
        match b {
            1 => Ok(Self::Create),
            2 => Ok(Self::Update),
            3 => Ok(Self::Delete),
            other => Err(CoreError::corrupt("wal_op", format!("unknown op byte {other}"))),
        }
    }

    const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// A decoded WAL record.
#[derive(Debug, Clone)]
pub struct WalRecord {
    /// The mutated entity.
    pub id: EntityId,
    /// The operation performed.
    pub op: WalOp,
    /// For `Create`/`Update`, the encoded `entitydb_codec::EntityRecord`
    /// bytes; `None` for `Delete`.
    pub payload: Option<Vec<u8>>,
}

/// Result of encoding a [`WalRecord`]: the full envelope bytes, plus the
/// byte offset *within that buffer* where `payload` begins (so the caller
/// can compute the absolute file offset the entity index should point at).
pub struct EncodedWalRecord {
    /// The full envelope, ready to append to the backend.
    pub bytes: Vec<u8>,
    /// Offset within `bytes` where the entity payload starts (0 if there
    /// is no payload, i.e. a `Delete` record).
    pub payload_offset_in_record: usize,
}

impl WalRecord {
    /// Encodes this record into its envelope form.
    ///
    /// Envelope layout: magic(4) | version(2) | op(1) | id_len(u16) |
    /// id_bytes | payload_len(u32) | payload_bytes | crc32(4 over all
    /// preceding bytes).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Invalid`] if the ID or payload exceeds `u16`/`u32` bounds.
    pub fn encode(&self) -> CoreResult<EncodedWalRecord> {
        let id_bytes = self.id.as_str().as_bytes();
        let id_len = u16::try_from(id_bytes.len())
            .map_err(|_| CoreError::invalid("entity id too long for WAL envelope"))?;

        let mut buf = Vec::new();
        buf.extend_from_slice(&WAL_MAGIC);
        buf.extend_from_slice(&WAL_VERSION.to_le_bytes());
        buf.push(self.op.as_byte());
        buf.extend_from_slice(&id_len.to_le_bytes());
        buf.extend_from_slice(id_bytes);

        let payload = self.payload.as_deref().unwrap_or(&[]);
        let payload_len = u32::try_from(payload.len())
            .map_err(|_| CoreError::invalid("WAL payload too large"))?;
        buf.extend_from_slice(&payload_len.to_le_bytes());
        let payload_offset_in_record = buf.len();
        buf.extend_from_slice(payload);

        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());

        Ok(EncodedWalRecord {
            bytes: buf,
            payload_offset_in_record: if self.payload.is_some() {
                payload_offset_in_record
            } else {
                0
            },
        })
    }

    /// Decodes a record from an exact envelope buffer (as produced by
    /// [`WalRecord::encode`]).
    ///
    /// Returns the record plus the offset, within `buf`, where the payload
    /// begins (mirrors `EncodedWalRecord::payload_offset_in_record`).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Corrupt`] on bad magic, truncation, or a CRC
    /// mismatch.
    pub fn decode(buf: &[u8]) -> CoreResult<(Self, usize)> {
        if buf.len() < 6 {
            return Err(CoreError::corrupt("wal_record", "truncated envelope header"));
        }
        if buf[0..4] != WAL_MAGIC {
            return Err(CoreError::corrupt("wal_record", "bad WAL magic"));
        }
        let version = u16::from_le_bytes([buf[4], buf[5]]);
        if version != WAL_VERSION {
            return Err(CoreError::corrupt(
                "wal_record",
                format!("unsupported WAL version {version}"),
            ));
        }
        let op = WalOp::from_byte(*buf.get(6).ok_or_else(|| {
            CoreError::corrupt("wal_record", "truncated before op byte")
        })?)?;

        let id_len = u16::from_le_bytes(
            buf.get(7..9)
                .ok_or_else(|| CoreError::corrupt("wal_record", "truncated before id_len"))?
                .try_into()
                .unwrap(),
        ) as usize;
        let id_start = 9;
        let id_end = id_start + id_len;
        let id_bytes = buf
            .get(id_start..id_end)
            .ok_or_else(|| CoreError::corrupt("wal_record", "truncated id field"))?;
        let id_str = std::str::from_utf8(id_bytes)
            .map_err(|_| CoreError::corrupt("wal_record", "id is not valid utf-8"))?;

        let len_end = id_end + 4;
        let payload_len = u32::from_le_bytes(
            buf.get(id_end..len_end)
                .ok_or_else(|| CoreError::corrupt("wal_record", "truncated before payload_len"))?
                .try_into()
                .unwrap(),
        ) as usize;
        let payload_start = len_end;
        let payload_end = payload_start + payload_len;
        let payload_bytes = buf
            .get(payload_start..payload_end)
            .ok_or_else(|| CoreError::corrupt("wal_record", "truncated payload"))?;

        let crc_start = payload_end;
        let crc_end = crc_start + 4;
        let stored_crc = u32::from_le_bytes(
            buf.get(crc_start..crc_end)
                .ok_or_else(|| CoreError::corrupt("wal_record", "truncated crc"))?
                .try_into()
                .unwrap(),
        );
        let computed_crc = compute_crc32(&buf[0..crc_start]);
        if stored_crc != computed_crc {
            return Err(CoreError::corrupt(
                "wal_record",
                format!("crc mismatch: expected {stored_crc:08x}, computed {computed_crc:08x}"),
            ));
        }

        let has_payload = payload_len > 0;
        let payload = if has_payload {
            Some(payload_bytes.to_vec())
        } else {
            None
        };

        Ok((
            Self {
                id: EntityId::from_string(id_str),
                op,
                payload,
            },
            if has_payload { payload_start } else { 0 },
        ))
    }

    /// Total encoded length of this record, without actually encoding it.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        4 + 2 + 1 + 2 + self.id.as_str().len() + 4 + self.payload.as_ref().map_or(0, Vec::len) + 4
    }
}
