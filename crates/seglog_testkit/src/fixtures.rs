//! Test fixtures: a store and index pair in a temporary directory.
//!
//! [`TestSegment`] plays the part of the owning segment in tests. It holds
//! the lock that keeps the store append and the index write together, and it
//! can be closed and reopened, or abandoned, against the same files.

use parking_lot::Mutex;
use seglog_storage::{Config, Index, StorageError, StorageResult, Store};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// File name of the store inside a test segment directory.
pub const STORE_FILE: &str = "00000000000000000000.store";

/// File name of the index inside a test segment directory.
pub const INDEX_FILE: &str = "00000000000000000000.index";

/// A store and index opened side by side in a temporary directory.
pub struct TestSegment {
    /// The record store.
    pub store: Store,
    /// The offset index.
    pub index: Index,
    config: Config,
    write_lock: Mutex<()>,
    // Kept alive so the files survive until the fixture is dropped.
    temp_dir: TempDir,
}

impl TestSegment {
    /// Creates a segment whose index holds up to 1024 entries.
    pub fn new() -> Self {
        Self::with_config(Config::new().max_index_bytes(1024 * 12))
    }

    /// Creates a segment with the given configuration.
    pub fn with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        Self::open_in(temp_dir, config).expect("Failed to open test segment")
    }

    /// Opens the store and index inside `temp_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be opened.
    pub fn open_in(temp_dir: TempDir, config: Config) -> StorageResult<Self> {
        let store = Store::open_with_config(&temp_dir.path().join(STORE_FILE), &config.store)?;
        let index = Index::open(&temp_dir.path().join(INDEX_FILE), &config.index())?;
        Ok(Self {
            store,
            index,
            config,
            write_lock: Mutex::new(()),
            temp_dir,
        })
    }

    /// Returns the directory holding both files.
    pub fn dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Returns the store file path.
    pub fn store_path(&self) -> PathBuf {
        self.dir().join(STORE_FILE)
    }

    /// Returns the index file path.
    pub fn index_path(&self) -> PathBuf {
        self.dir().join(INDEX_FILE)
    }

    /// Returns the configuration the segment was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the absolute offset of the segment's first record.
    pub fn base_offset(&self) -> u64 {
        self.config.segment.initial_offset
    }

    /// Returns the absolute offset the next append will get.
    pub fn next_offset(&self) -> u64 {
        self.base_offset() + self.index.len()
    }

    /// Appends a record and indexes it. Returns the record number.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IndexFull`] or [`StorageError::StoreFull`]
    /// without touching either file when the segment has reached a limit,
    /// or any error from the store or index.
    pub fn append(&self, payload: &[u8]) -> StorageResult<u64> {
        let _guard = self.write_lock.lock();
        if self.index.is_full() {
            return Err(StorageError::IndexFull {
                capacity: self.index.capacity(),
            });
        }
        let size = self.store.size();
        let limit = self.config.segment.max_store_bytes;
        if size >= limit {
            return Err(StorageError::StoreFull { size, limit });
        }

        let record = self.index.len();
        let relative_offset = u32::try_from(record)
            .map_err(|_| StorageError::Corrupted(format!("record {record} exceeds u32")))?;
        let (_, position) = self.store.append(payload)?;
        self.index.write(relative_offset, position)?;
        Ok(record)
    }

    /// Reads a record by number; `-1` reads the last one.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OutOfRange`] for unknown record numbers.
    pub fn read(&self, record: i64) -> StorageResult<Vec<u8>> {
        let (_, position) = self.index.read(record)?;
        self.store.read(position)
    }

    /// Reads a record by absolute offset.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OutOfRange`] for offsets below the base offset
    /// or past the last record.
    pub fn read_offset(&self, offset: u64) -> StorageResult<Vec<u8>> {
        let record = i128::from(offset) - i128::from(self.base_offset());
        match i64::try_from(record) {
            Ok(record) if record >= 0 => self.read(record),
            _ => Err(StorageError::OutOfRange {
                record: i64::try_from(record).unwrap_or(i64::MIN),
                entries: self.index.len(),
            }),
        }
    }

    /// Closes both files cleanly and opens them again.
    ///
    /// # Errors
    ///
    /// Returns an error if closing or reopening fails.
    pub fn reopen(self) -> StorageResult<Self> {
        let Self {
            store,
            index,
            config,
            temp_dir,
            ..
        } = self;
        index.close()?;
        store.close()?;
        Self::open_in(temp_dir, config)
    }

    /// Drops both files without closing them, as a killed process would.
    ///
    /// Buffered store bytes still reach the file when the writer drops. The
    /// index file keeps its pre-allocated length.
    pub fn abandon(self) -> TempDir {
        let Self {
            store,
            index,
            temp_dir,
            ..
        } = self;
        drop(index);
        drop(store);
        temp_dir
    }

    /// Closes both files and returns the directory holding them.
    ///
    /// # Errors
    ///
    /// Returns an error if either close fails.
    pub fn close(self) -> StorageResult<TempDir> {
        let Self {
            store,
            index,
            temp_dir,
            ..
        } = self;
        index.close()?;
        store.close()?;
        Ok(temp_dir)
    }
}

impl Default for TestSegment {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a test against a fresh segment.
///
/// # Example
///
/// ```rust
/// use seglog_testkit::with_test_segment;
///
/// with_test_segment(|segment| {
///     let record = segment.append(b"hello").unwrap();
///     assert_eq!(segment.read(record as i64).unwrap(), b"hello");
/// });
/// ```
pub fn with_test_segment<F, R>(f: F) -> R
where
    F: FnOnce(&TestSegment) -> R,
{
    let segment = TestSegment::new();
    f(&segment)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a segment holding `count` records of `payload_size` bytes.
    ///
    /// Record `i` is filled with the byte `i % 256`.
    pub fn populated_segment(count: usize, payload_size: usize) -> TestSegment {
        let segment = TestSegment::with_config(
            Config::new().max_index_bytes((count.max(1) * 12) as u64 * 2),
        );
        for i in 0..count {
            segment
                .append(&vec![(i % 256) as u8; payload_size])
                .expect("Failed to append record");
        }
        segment
    }
}
