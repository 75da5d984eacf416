//! Error types for the recorder.
//!
//! Only construction and replay setup can fail. Once a recorder exists, every
//! problem on the write path or while decoding degrades in place (truncate,
//! skip, ignore) and never reaches the caller.

use thiserror::Error;

/// A configuration the recorder cannot run with.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("main ring capacity must be non-zero")]
    ZeroCapacity,

    #[error("maximum record length {0} is below the minimum of {1} bytes")]
    RecordTooSmall(usize, usize),

    #[error("maximum record length {0} exceeds the {1} bytes a length prefix can describe")]
    RecordTooLarge(usize, usize),

    #[error("maximum record length {record} does not fit the {ring} ring of {capacity} bytes")]
    RecordExceedsRing {
        record: usize,
        ring: &'static str,
        capacity: usize,
    },

    #[error("maximum data length {0} must be non-zero and below the record length {1}")]
    DataLength(usize, usize),

    #[error("string table capacity {0} exceeds 65536 entries")]
    TableTooLarge(usize),

    #[error("replay scratch buffer of {0} bytes is smaller than the required {1} bytes")]
    ScratchTooSmall(usize, usize),

    #[error("recorder is disabled")]
    Disabled,
}

/// Why a stored record could not be rendered.
///
/// Decoding stops at the first inconsistency; the record is abandoned and
/// replay moves on to the next one.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("record ends before field `{0}`")]
    Truncated(&'static str),

    #[error("unexpected tag {tag:#04x} while reading {field}")]
    UnexpectedTag { tag: u8, field: &'static str },

    #[error("level byte {0:#04x} is outside every level range")]
    UnknownLevel(u8),

    #[error("string table index {0} is not registered")]
    UnknownTableEntry(u16),
}
