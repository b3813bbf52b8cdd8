//! Repair helpers for segments that were not closed cleanly.
//!
//! Nothing here runs implicitly. Opening a store or index never modifies
//! existing data; the owning segment decides when to scan, truncate or
//! rebuild.

use crate::codec::{self, WireOrder, LEN_WIDTH};
use crate::config::IndexConfig;
use crate::error::{StorageError, StorageResult};
use crate::index::Index;
use crate::store::Store;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::{info, warn};

const PREFIX: u64 = LEN_WIDTH as u64;

/// Outcome of walking a store file record by record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreScan {
    /// Number of complete records.
    pub records: u64,
    /// Bytes covered by complete records.
    pub valid_len: u64,
    /// Total file length.
    pub file_len: u64,
}

impl StoreScan {
    /// Bytes after the last complete record.
    #[must_use]
    pub fn torn_bytes(&self) -> u64 {
        self.file_len - self.valid_len
    }

    /// Returns `true` if the file ends with a partial record.
    #[must_use]
    pub fn is_torn(&self) -> bool {
        self.valid_len < self.file_len
    }
}

/// Walks the store file at `path` and reports how much of it is made of
/// complete records.
///
/// A record is complete when its length prefix and the whole payload it
/// announces are present. The walk stops at the first incomplete record.
/// Must not run while a [`Store`] has the file open with unflushed appends.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn scan_store(path: &Path) -> StorageResult<StoreScan> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);

    let mut scan = StoreScan {
        records: 0,
        valid_len: 0,
        file_len,
    };
    let mut prefix = [0u8; LEN_WIDTH];

    while scan.valid_len + PREFIX <= file_len {
        reader.read_exact(&mut prefix)?;
        let len = codec::decode_len::<WireOrder>(&prefix);
        let next = match (scan.valid_len + PREFIX).checked_add(len) {
            Some(next) if next <= file_len => next,
            _ => break,
        };
        // `next <= file_len`, so the skip fits in an i64 for any real file.
        let skip = i64::try_from(len)
            .map_err(|_| StorageError::Corrupted(format!("record length {len} too large")))?;
        reader.seek_relative(skip)?;

        scan.records += 1;
        scan.valid_len = next;
    }

    Ok(scan)
}

/// Cuts a partial record off the end of the store file at `path`.
///
/// Returns the number of bytes removed. Run this before reopening a store
/// whose last append failed or was interrupted.
///
/// # Errors
///
/// Returns an error if the file cannot be scanned or truncated.
pub fn truncate_torn_tail(path: &Path) -> StorageResult<u64> {
    let scan = scan_store(path)?;
    if !scan.is_torn() {
        return Ok(0);
    }

    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(scan.valid_len)?;
    file.sync_all()?;

    warn!(
        path = %path.display(),
        from = scan.file_len,
        to = scan.valid_len,
        removed = scan.torn_bytes(),
        "truncated torn store tail"
    );
    Ok(scan.torn_bytes())
}

/// Rebuilds the index at `index_path` from the records in `store`.
///
/// Any existing index file is discarded. Entry `i` gets relative offset `i`
/// and the position of the `i`-th record. If the rebuild fails, the index
/// file is left empty rather than holding a partial table.
///
/// # Errors
///
/// Returns [`StorageError::IndexFull`] if the store holds more records than
/// the index can, [`StorageError::ReadPastEnd`] if the store ends with a
/// partial record, and I/O errors from either file.
pub fn rebuild_index(
    store: &Store,
    index_path: &Path,
    config: &IndexConfig,
) -> StorageResult<Index> {
    config.validate()?;
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(index_path)?;

    let index = Index::open(index_path, config)?;
    if let Err(e) = fill_index(store, &index) {
        drop(index);
        if let Err(cleanup) = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(index_path)
        {
            warn!(
                path = %index_path.display(),
                error = %cleanup,
                "failed to discard partial index"
            );
        }
        return Err(e);
    }

    info!(
        path = %index_path.display(),
        entries = index.len(),
        "rebuilt index from store"
    );
    Ok(index)
}

fn fill_index(store: &Store, index: &Index) -> StorageResult<()> {
    let size = store.size();
    let mut position = 0u64;
    let mut relative_offset = 0u32;
    let mut prefix = [0u8; LEN_WIDTH];

    while position < size {
        if store.read_at(&mut prefix, position)? < LEN_WIDTH {
            return Err(StorageError::ReadPastEnd {
                offset: position,
                len: PREFIX,
                size,
            });
        }
        let len = codec::decode_len::<WireOrder>(&prefix);
        let next = match (position + PREFIX).checked_add(len) {
            Some(next) if next <= size => next,
            _ => {
                return Err(StorageError::ReadPastEnd {
                    offset: position + PREFIX,
                    len,
                    size,
                })
            }
        };

        index.write(relative_offset, position)?;
        relative_offset = relative_offset.checked_add(1).ok_or_else(|| {
            StorageError::Corrupted("record count exceeds relative offset range".into())
        })?;
        position = next;
    }
    Ok(())
}
