//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding the on-disk format.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The magic bytes at the start of a header did not match.
    #[error("bad magic: expected {expected:08x}, got {actual:08x}")]
    BadMagic {
        /// Expected magic value.
        expected: u32,
        /// Actual magic value read.
        actual: u32,
    },

    /// The format version is not understood by this build.
    #[error("unsupported format version: {version}")]
    UnsupportedVersion {
        /// The version found on disk.
        version: u32,
    },

    /// A buffer was shorter than a fixed-size record requires.
    #[error("truncated record: need {needed} bytes at offset {offset}, field {field}")]
    Truncated {
        /// Byte offset within the record being decoded.
        offset: usize,
        /// Bytes required to continue decoding.
        needed: usize,
        /// Name of the field being decoded when truncation was hit.
        field: &'static str,
    },

    /// A tag body or temporal tag exceeded the maximum persisted length.
    #[error("tag too long: {len} bytes exceeds maximum of {max} bytes")]
    TagTooLong {
        /// Length of the offending tag in bytes.
        len: usize,
        /// Maximum permitted length.
        max: usize,
    },

    /// An entity ID did not fit the fixed on-disk width.
    #[error("entity id too long: {len} bytes exceeds maximum of {max} bytes")]
    IdTooLong {
        /// Length of the offending ID in bytes.
        len: usize,
        /// Maximum permitted length.
        max: usize,
    },

    /// A stored string was not valid UTF-8.
    #[error("invalid UTF-8 in field {field}")]
    InvalidUtf8 {
        /// Name of the field that failed to decode.
        field: &'static str,
    },

    /// The content CRC32 recorded in the record did not match the computed value.
    #[error("checksum mismatch: expected {expected:08x}, computed {computed:08x}")]
    ChecksumMismatch {
        /// Checksum recorded in the record.
        expected: u32,
        /// Checksum computed from the content bytes.
        computed: u32,
    },

    /// A length field described a region that runs past the end of the buffer.
    #[error("length out of bounds: field {field} claims {len} bytes but only {available} remain")]
    LengthOutOfBounds {
        /// Name of the field whose length was invalid.
        field: &'static str,
        /// Claimed length.
        len: usize,
        /// Bytes actually remaining in the buffer.
        available: usize,
    },

    /// A numeric value could not be converted to the on-disk representation.
    #[error("value out of range for field {field}")]
    OutOfRange {
        /// Name of the field that overflowed.
        field: &'static str,
    },
}
