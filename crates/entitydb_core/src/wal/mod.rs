//! Write-ahead log: envelope framing, append, and replay (spec §4.2).

mod record;

pub use record::{EncodedWalRecord, WalOp, WalRecord, WAL_MAGIC, WAL_VERSION};

use crate::error::{CoreError, CoreResult};
use entitydb_storage::StorageBackend;

/// An `(offset, record)` pair produced while scanning the WAL, where
/// `offset` is the absolute file offset of the record's payload (not the
/// envelope start) — exactly what an `entitydb_codec::IndexEntry` should
/// store for `Create`/`Update` records.
pub struct WalEntry {
    /// Absolute offset of the start of this record's envelope.
    pub envelope_offset: u64,
    /// Absolute offset of the entity payload within the file, or `0` for
    /// `Delete` records.
    pub payload_offset: u64,
    /// The decoded record.
    pub record: WalRecord,
}

/// Appends a single record to the backend and fsyncs it, per spec §4.2
/// ("Append, flush, then fsync before returning success to the writer").
///
/// Returns the [`WalEntry`] describing where the record (and its payload,
/// if any) landed.
///
/// # Errors
///
/// Returns [`CoreError`] if encoding or the underlying I/O fails.
pub fn append_and_sync(
    backend: &mut dyn StorageBackend,
    record: WalRecord,
) -> CoreResult<WalEntry> {
    let encoded = record.encode()?;
    let envelope_offset = backend.append(&encoded.bytes)?;
    backend.flush()?;
    backend.sync()?;

    let payload_offset = if encoded.payload_offset_in_record > 0 {
        envelope_offset + encoded.payload_offset_in_record as u64
    } else {
        0
    };

    Ok(WalEntry {
        envelope_offset,
        payload_offset,
        record,
    })
}

/// Scans WAL envelopes from `start_offset` to `end_offset`, yielding one
/// [`WalEntry`] per record.
///
/// Replay contract (spec §4.2): stop on the first CRC failure *only if*
/// the entry is the tail (i.e. decoding fails because the file ends
/// mid-envelope or the trailing bytes are short); a CRC failure on a
/// fully-present, non-tail record is fatal corruption.
///
/// # Errors
///
/// Returns [`CoreError::WalCorruption`] if a non-tail record fails its
/// checksum or framing.
pub fn scan(
    backend: &dyn StorageBackend,
    start_offset: u64,
    end_offset: u64,
) -> CoreResult<Vec<WalEntry>> {
    let mut entries = Vec::new();
    let mut offset = start_offset;

    while offset < end_offset {
        // Envelope header is at least 9 bytes before we know id_len; read
        // a small prefix first, enlarge as needed. For simplicity (and
        // because WAL records are expected to be small), read the rest of
        // the available region starting at `offset` when the remaining
        // span is manageable, else read in head/body steps.
        let remaining = end_offset - offset;
        let head_len = remaining.min(9) as usize;
        let head = backend.read_at(offset, head_len)?;
        if head.len() < 9 {
            // Truncated tail: not enough bytes even for the fixed header.
            break;
        }
        let id_len = u16::from_le_bytes([head[7], head[8]]) as u64;
        let prefix_len = 9 + id_len + 4; // header + id + payload_len
        if offset + prefix_len > end_offset {
            break; // truncated tail
        }
        let prefix = backend.read_at(offset, prefix_len as usize)?;
        let payload_len =
            u32::from_le_bytes(prefix[(prefix.len() - 4)..].try_into().unwrap()) as u64;
        let total_len = prefix_len + payload_len + 4; // + crc32
        if offset + total_len > end_offset {
            break; // truncated tail
        }

        let full = backend.read_at(offset, total_len as usize)?;
        match WalRecord::decode(&full) {
            Ok((record, payload_offset_in_record)) => {
                let payload_offset = if payload_offset_in_record > 0 {
                    offset + payload_offset_in_record as u64
                } else {
                    0
                };
                entries.push(WalEntry {
                    envelope_offset: offset,
                    payload_offset,
                    record,
                });
                offset += total_len;
            }
            Err(err) => {
                let is_tail = offset + total_len == end_offset;
                if is_tail {
                    break;
                }
                return Err(CoreError::wal_corruption(
                    offset,
                    format!("mid-log record failed validation: {err}"),
                ));
            }
        }
    }

    Ok(entries)
}
