//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of the store.
    ///
    /// Also raised when a length prefix claims more bytes than the file holds,
    /// which means the store is shorter than its index implies.
    #[error("read beyond end of storage: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: u64,
        /// The current storage size.
        size: u64,
    },

    /// The index has no room for another entry.
    #[error("index full: capacity {capacity} bytes")]
    IndexFull {
        /// Size of the mapped region in bytes.
        capacity: u64,
    },

    /// The store has reached the segment's size limit.
    #[error("store full: size {size} bytes, limit {limit} bytes")]
    StoreFull {
        /// Current store size in bytes.
        size: u64,
        /// Configured `max_store_bytes`.
        limit: u64,
    },

    /// The requested record number is not in the index.
    #[error("record {record} out of range: index holds {entries} entries")]
    OutOfRange {
        /// The requested record number.
        record: i64,
        /// Number of entries currently in the index.
        entries: u64,
    },

    /// A storage file is corrupted.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// The supplied configuration cannot be used.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StorageError {
    /// Returns `true` for end-of-data conditions.
    ///
    /// These are not fatal. On a full store or index, the owning segment should roll
    /// over to a new segment; on a read, the record does not exist here.
    #[must_use]
    pub fn is_eof(&self) -> bool {
        match self {
            Self::ReadPastEnd { .. }
            | Self::IndexFull { .. }
            | Self::StoreFull { .. }
            | Self::OutOfRange { .. } => true,
            Self::Io(err) => err.kind() == io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}
