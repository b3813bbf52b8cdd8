//! Memory-mapped offset index.

use crate::codec::{self, WireOrder, ENTRY_WIDTH};
use crate::config::IndexConfig;
use crate::error::{StorageError, StorageResult};
use crate::mapped::{MappedRegion, MmapFile};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

const WIDTH: u64 = ENTRY_WIDTH as u64;

/// Maps record numbers to store positions.
///
/// ## On-disk format
///
/// A flat array of 12-byte entries:
///
/// ```text
/// | relative offset: u32 BE | position: u64 BE |
/// | 4 bytes                 | 8 bytes          |
/// ```
///
/// Entry `i` describes the `i`-th record of the segment, so a lookup is a
/// single multiplication. While open, the file is pre-allocated to
/// `max_index_bytes`, rounded down to whole entries, and mapped whole; only the first `size` bytes hold
/// entries. [`Index::close`] truncates the file back to `size`.
///
/// An index that was not closed (crash, kill) is left at its pre-allocated
/// length; reopening it reports every slot as an entry. Rebuild it from the
/// store with [`rebuild_index`](crate::rebuild_index) instead.
///
/// ## Thread Safety
///
/// Writes and reads are serialized by an internal lock.
#[derive(Debug)]
pub struct Index<M: MappedRegion = MmapFile> {
    path: Option<PathBuf>,
    /// Length of the mapped region.
    capacity: u64,
    inner: Mutex<Inner<M>>,
}

#[derive(Debug)]
struct Inner<M> {
    region: M,
    /// Bytes of valid entries; always a multiple of the entry width.
    size: u64,
}

impl Index<MmapFile> {
    /// Opens or creates the index file at `path`.
    ///
    /// The existing file length becomes the index size. The file is then
    /// resized to [`IndexConfig::capacity`] and mapped.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupted`] if the existing file is not a whole
    /// number of entries or is larger than the capacity, and an I/O error
    /// if the file cannot be resized or mapped.
    pub fn open(path: &Path, config: &IndexConfig) -> StorageResult<Self> {
        config.validate()?;
        let capacity = config.capacity();

        // Checked before resizing so a bad file is left untouched.
        let region =
            MmapFile::open_checked(path, capacity, |size| check_size(size, capacity))?;
        let size = region.prior_len();
        let index = Self::from_parts(region, size, Some(path.to_path_buf()));

        debug!(path = %path.display(), size, capacity, "opened index");
        Ok(index)
    }
}

impl<M: MappedRegion> Index<M> {
    /// Creates an index over an already allocated region whose first `size`
    /// bytes hold entries.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Corrupted`] if `size` is not a whole number of
    /// entries or exceeds the region.
    pub fn with_backend(region: M, size: u64) -> StorageResult<Self> {
        check_size(size, region.len() as u64)?;
        Ok(Self::from_parts(region, size, None))
    }

    fn from_parts(region: M, size: u64, path: Option<PathBuf>) -> Self {
        Self {
            path,
            capacity: region.len() as u64,
            inner: Mutex::new(Inner { region, size }),
        }
    }

    /// Returns the index file path, if the index is file-backed.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns the bytes of valid entries.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.size() / WIDTH
    }

    /// Returns `true` if the index holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns the size of the mapped region in bytes.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Returns `true` if another entry would not fit.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.size() + WIDTH > self.capacity
    }

    /// Appends an entry.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::IndexFull`] if the mapped region has no room;
    /// the owning segment should roll over to a new segment.
    pub fn write(&self, relative_offset: u32, position: u64) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        let start = inner.size;
        if start + WIDTH > self.capacity {
            trace!(capacity = self.capacity, "index full");
            return Err(StorageError::IndexFull {
                capacity: self.capacity,
            });
        }

        // In bounds of the region, whose length is a usize.
        let start = start as usize;
        codec::encode_entry::<WireOrder>(
            &mut inner.region.as_mut_slice()[start..start + ENTRY_WIDTH],
            relative_offset,
            position,
        );
        inner.size += WIDTH;
        Ok(())
    }

    /// Reads entry `record` as `(relative_offset, position)`.
    ///
    /// `-1` reads the most recently written entry.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OutOfRange`] if the index is empty or `record`
    /// is not below the entry count.
    pub fn read(&self, record: i64) -> StorageResult<(u32, u64)> {
        let inner = self.inner.lock();
        let entries = inner.size / WIDTH;
        let out_of_range = StorageError::OutOfRange { record, entries };

        if entries == 0 {
            return Err(out_of_range);
        }
        let n = match record {
            -1 => entries - 1,
            r => match u64::try_from(r) {
                Ok(n) if n < entries => n,
                _ => return Err(out_of_range),
            },
        };

        let start = (n * WIDTH) as usize;
        Ok(codec::decode_entry::<WireOrder>(
            &inner.region.as_slice()[start..start + ENTRY_WIDTH],
        ))
    }

    /// Reads the most recently written entry.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::OutOfRange`] if the index is empty.
    pub fn last(&self) -> StorageResult<(u32, u64)> {
        self.read(-1)
    }

    /// Synchronously flushes written entries to the backing storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    pub fn sync(&self) -> StorageResult<()> {
        self.inner.lock().region.sync()
    }

    /// Flushes the entries, shrinks the backing storage to the valid entries
    /// and releases it.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing or truncating fails.
    pub fn close(self) -> StorageResult<()> {
        let Inner { mut region, size } = self.inner.into_inner();
        region.sync()?;
        region.unmap(size)?;

        debug!(path = ?self.path, size, "closed index");
        Ok(())
    }
}

fn check_size(size: u64, capacity: u64) -> StorageResult<()> {
    if size % WIDTH != 0 {
        return Err(StorageError::Corrupted(format!(
            "index size {size} is not a multiple of {ENTRY_WIDTH}"
        )));
    }
    if size > capacity {
        return Err(StorageError::Corrupted(format!(
            "index size {size} exceeds capacity {capacity}"
        )));
    }
    Ok(())
}
