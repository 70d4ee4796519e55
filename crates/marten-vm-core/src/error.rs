//! Array value error types

use crate::array::StorageKind;
use std::io;
use thiserror::Error;

/// Errors raised by array value operations
#[derive(Debug, Error)]
pub enum ValueError {
    /// Index negative, beyond the logical length (reads), or beyond the
    /// capacity limit (writes)
    #[error("array index out of range: index: {index}, size: {size}")]
    IndexOutOfRange {
        /// The offending index
        index: i64,
        /// The logical length at the time of the access
        size: usize,
    },

    /// Raw index outside the representable index domain, reported before
    /// any bounds comparison
    #[error("index number too large: {index}")]
    IndexTooLarge {
        /// The offending index
        index: i64,
    },

    /// Mutation attempted on a value that is frozen or being frozen
    #[error("modification not allowed on frozen value")]
    FrozenUpdate,

    /// Sink failure while writing raw byte-array contents
    #[error("error occurred while writing the binary content to the output stream")]
    BinaryWrite(#[source] io::Error),

    /// Sink failure while writing the textual rendering
    #[error("error occurred while serializing data")]
    Serialization(#[source] io::Error),

    /// A typed accessor was called against a different storage backend.
    ///
    /// This is a programming contract violation on the caller's side; the
    /// typed get/add surface makes it unreachable in correct code, but the
    /// failure is still reported rather than panicking.
    #[error("incompatible storage access: expected {}, found {}", .expected.name(), .actual.name())]
    StorageMismatch {
        /// Backend the accessor is typed for
        expected: StorageKind,
        /// Backend the array actually carries
        actual: StorageKind,
    },
}

impl ValueError {
    /// Create an out-of-range error carrying the offending index and the
    /// current logical length
    pub fn index_out_of_range(index: i64, size: usize) -> Self {
        Self::IndexOutOfRange { index, size }
    }

    /// Create a too-large index error
    pub fn index_too_large(index: i64) -> Self {
        Self::IndexTooLarge { index }
    }

    /// Create a storage mismatch error
    pub fn storage_mismatch(expected: StorageKind, actual: StorageKind) -> Self {
        Self::StorageMismatch { expected, actual }
    }
}

/// Result type for array value operations
pub type ValueResult<T> = std::result::Result<T, ValueError>;
