//! # EntityDB Codec
//!
//! Binary encode/decode for the unified `.edb` file format:
//!
//! ```text
//! [Header 64B]
//! [Tag dictionary]    — variable, optional
//! [Entity payloads]   — append region
//! [Entity index]      — dense array, rewritten on checkpoint
//! [WAL region]        — appended after index; rotated on checkpoint
//! ```
//!
//! This crate only knows how to turn fixed byte layouts into typed values
//! and back. It does not open files, manage offsets within a live
//! database, or know anything about the WAL's envelope framing — that
//! belongs to `entitydb_core`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod crc32;
mod error;
mod header;
mod index_entry;
mod record;

pub use crc32::compute_crc32;
pub use error::{CodecError, CodecResult};
pub use header::{FileHeader, FORMAT_VERSION, HEADER_SIZE, MAGIC};
pub use index_entry::{IndexEntry, FLAG_COMPRESSED, FLAG_TOMBSTONE, ID_WIDTH, INDEX_ENTRY_SIZE};
pub use record::{EntityRecord, MAX_TAG_LEN};
