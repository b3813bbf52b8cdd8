//! Segment storage configuration.

use crate::codec::ENTRY_WIDTH;
use crate::error::{StorageError, StorageResult};

/// Configuration for one segment's store and index.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Segment sizing.
    pub segment: SegmentConfig,
    /// Store tuning.
    pub store: StoreConfig,
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum index file size.
    #[must_use]
    pub const fn max_index_bytes(mut self, bytes: u64) -> Self {
        self.segment.max_index_bytes = bytes;
        self
    }

    /// Sets the maximum store file size.
    #[must_use]
    pub const fn max_store_bytes(mut self, bytes: u64) -> Self {
        self.segment.max_store_bytes = bytes;
        self
    }

    /// Sets the offset of the first record in a new segment.
    #[must_use]
    pub const fn initial_offset(mut self, offset: u64) -> Self {
        self.segment.initial_offset = offset;
        self
    }

    /// Sets the store write-buffer capacity.
    #[must_use]
    pub const fn write_buffer_size(mut self, bytes: usize) -> Self {
        self.store.write_buffer_size = bytes;
        self
    }

    /// Returns the index settings derived from this configuration.
    #[must_use]
    pub const fn index(&self) -> IndexConfig {
        IndexConfig {
            max_index_bytes: self.segment.max_index_bytes,
        }
    }

    /// Checks that the configuration can be used to open a segment.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidConfig`] if any section is unusable.
    pub fn validate(&self) -> StorageResult<()> {
        self.index().validate()?;
        self.store.validate()
    }
}

/// Sizing limits shared by a segment's store and index.
///
/// `max_store_bytes` and `initial_offset` are consumed by the owning segment;
/// the store itself never enforces a size limit.
#[derive(Debug, Clone)]
pub struct SegmentConfig {
    /// Store size at which the owner should roll to a new segment.
    pub max_store_bytes: u64,
    /// Index file size, and therefore the maximum entries per segment.
    pub max_index_bytes: u64,
    /// Absolute offset of the first record in a new segment.
    pub initial_offset: u64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_store_bytes: 1024 * 1024 * 1024, // 1 GiB
            // Largest whole number of entries within 10 MiB.
            max_index_bytes: IndexConfig::with_entries(10 * 1024 * 1024 / ENTRY_WIDTH as u64)
                .max_index_bytes,
            initial_offset: 0,
        }
    }
}

/// Store settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Capacity of the buffered writer in front of the store file.
    pub write_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            write_buffer_size: 8 * 1024,
        }
    }
}

impl StoreConfig {
    /// Checks the store settings.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidConfig`] for a zero-sized write buffer.
    pub fn validate(&self) -> StorageResult<()> {
        if self.write_buffer_size == 0 {
            return Err(StorageError::InvalidConfig(
                "write_buffer_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Index settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexConfig {
    /// Size the index file is pre-allocated to while open.
    pub max_index_bytes: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Config::default().index()
    }
}

impl IndexConfig {
    /// Creates index settings for an index holding at most `entries` entries.
    #[must_use]
    pub const fn with_entries(entries: u64) -> Self {
        Self {
            max_index_bytes: entries * ENTRY_WIDTH as u64,
        }
    }

    /// Number of whole entries that fit in the configured size.
    #[must_use]
    pub const fn max_entries(&self) -> u64 {
        self.max_index_bytes / ENTRY_WIDTH as u64
    }

    /// Bytes the index file is pre-allocated to: `max_index_bytes` rounded
    /// down to a whole number of entries.
    ///
    /// A file left at this length by an unclean shutdown still opens.
    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.max_entries() * ENTRY_WIDTH as u64
    }

    /// Checks the index settings.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidConfig`] if not even one entry fits, or
    /// if the size cannot be addressed on this platform.
    pub fn validate(&self) -> StorageResult<()> {
        if self.max_index_bytes < ENTRY_WIDTH as u64 {
            return Err(StorageError::InvalidConfig(format!(
                "max_index_bytes must be at least {ENTRY_WIDTH}, got {}",
                self.max_index_bytes
            )));
        }
        if usize::try_from(self.max_index_bytes).is_err() {
            return Err(StorageError::InvalidConfig(format!(
                "max_index_bytes {} exceeds the address space",
                self.max_index_bytes
            )));
        }
        Ok(())
    }
}
