//! Fixed-size byte regions backing the index.
//!
//! The index only needs a handful of operations from its backing memory:
//! byte access, a synchronous flush, and a way to release the region while
//! keeping a prefix of it. [`MappedRegion`] captures exactly that, so the
//! index logic runs unchanged over a memory-mapped file ([`MmapFile`]) or a
//! plain vector ([`InMemoryRegion`]).

use crate::error::StorageResult;
use memmap2::MmapMut;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A fixed-length, writable byte region.
///
/// The length never changes while the region is live.
pub trait MappedRegion: Send {
    /// Returns the whole region.
    fn as_slice(&self) -> &[u8];

    /// Returns the whole region for writing.
    fn as_mut_slice(&mut self) -> &mut [u8];

    /// Returns the region length in bytes.
    fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// Returns `true` if the region has zero length.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Synchronously persists the region contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Releases the region, keeping only its first `keep` bytes in the
    /// backing storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be shrunk.
    fn unmap(self, keep: u64) -> StorageResult<()>
    where
        Self: Sized;
}

/// A file mapped read-write into memory.
#[derive(Debug)]
pub struct MmapFile {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
    prior_len: u64,
}

impl MmapFile {
    /// Opens or creates the file at `path`, resizes it to exactly `len` bytes
    /// and maps all of it.
    ///
    /// Bytes past the previous end of the file read as zero.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, resized or mapped.
    pub fn open(path: &Path, len: u64) -> StorageResult<Self> {
        Self::open_checked(path, len, |_| Ok(()))
    }

    /// Like [`MmapFile::open`], but passes the file's existing length to
    /// `check` first. If `check` fails the file is not resized.
    ///
    /// # Errors
    ///
    /// Returns the error from `check`, or an error if the file cannot be
    /// opened, resized or mapped.
    #[allow(unsafe_code)]
    pub fn open_checked<F>(path: &Path, len: u64, check: F) -> StorageResult<Self>
    where
        F: FnOnce(u64) -> StorageResult<()>,
    {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let prior_len = file.metadata()?.len();
        check(prior_len)?;
        file.set_len(len)?;

        // SAFETY: the mapping is owned by this value together with the file
        // handle, and the file is only resized in `unmap` after the mapping
        // has been dropped. Other processes must not truncate the file while
        // it is mapped.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self {
            path: path.to_path_buf(),
            file,
            mmap,
            prior_len,
        })
    }

    /// Returns the path of the mapped file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file length before it was resized for mapping.
    #[must_use]
    pub fn prior_len(&self) -> u64 {
        self.prior_len
    }
}

impl MappedRegion for MmapFile {
    fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.mmap.flush()?;
        Ok(())
    }

    fn unmap(self, keep: u64) -> StorageResult<()> {
        let Self { file, mmap, .. } = self;
        mmap.flush()?;
        file.sync_all()?;
        // Unmap before shrinking; truncating a mapped file is not portable.
        drop(mmap);
        file.set_len(keep)?;
        file.sync_all()?;
        Ok(())
    }
}

/// A vector-backed region for tests and ephemeral indexes.
///
/// Writes land in a private buffer. [`sync`](MappedRegion::sync) and
/// [`unmap`](MappedRegion::unmap) publish the buffer to a shared backing
/// vector, which plays the role of the file on disk: whatever was never
/// published is what a crash loses.
#[derive(Debug)]
pub struct InMemoryRegion {
    data: Vec<u8>,
    backing: Arc<Mutex<Vec<u8>>>,
}

impl InMemoryRegion {
    /// Creates a zero-filled region of `len` bytes.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self::with_data(Vec::new(), len)
    }

    /// Creates a region of `len` bytes starting with the given contents.
    ///
    /// Models reopening an existing file: `data` is padded with zeros, or
    /// cut, to exactly `len` bytes.
    #[must_use]
    pub fn with_data(mut data: Vec<u8>, len: usize) -> Self {
        data.resize(len, 0);
        let backing = Arc::new(Mutex::new(data.clone()));
        Self { data, backing }
    }

    /// Returns a handle to the published contents.
    ///
    /// The handle stays valid after the region is unmapped.
    #[must_use]
    pub fn backing(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.backing)
    }
}

impl MappedRegion for InMemoryRegion {
    fn as_slice(&self) -> &[u8] {
        &self.data
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.backing.lock().clone_from(&self.data);
        Ok(())
    }

    fn unmap(mut self, keep: u64) -> StorageResult<()> {
        let keep = usize::try_from(keep).map_or(self.data.len(), |k| k.min(self.data.len()));
        self.data.truncate(keep);
        *self.backing.lock() = self.data;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use tempfile::tempdir;

    #[test]
    fn mmap_preallocates_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("region.idx");

        let region = MmapFile::open(&path, 1024).unwrap();
        assert_eq!(region.len(), 1024);
        assert_eq!(region.prior_len(), 0);
        assert!(region.as_slice().iter().all(|b| *b == 0));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 1024);
        assert_eq!(region.path(), path);
    }

    #[test]
    fn mmap_keeps_existing_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("region.idx");
        std::fs::write(&path, b"abc").unwrap();

        let region = MmapFile::open(&path, 8).unwrap();
        assert_eq!(region.prior_len(), 3);
        assert_eq!(region.as_slice(), b"abc\0\0\0\0\0");
    }

    #[test]
    fn mmap_failed_check_leaves_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("region.idx");
        std::fs::write(&path, b"abcde").unwrap();

        let result = MmapFile::open_checked(&path, 64, |len| {
            Err(StorageError::Corrupted(format!("bad length {len}")))
        });
        assert!(matches!(result, Err(StorageError::Corrupted(_))));
        assert_eq!(std::fs::read(&path).unwrap(), b"abcde");
    }

    #[test]
    fn mmap_unmap_truncates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("region.idx");

        let mut region = MmapFile::open(&path, 64).unwrap();
        region.as_mut_slice()[..4].copy_from_slice(b"data");
        region.sync().unwrap();
        region.unmap(4).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"data");
    }

    #[test]
    fn memory_region_publishes_on_sync() {
        let mut region = InMemoryRegion::new(8);
        let backing = region.backing();

        region.as_mut_slice()[0] = 7;
        assert_eq!(backing.lock()[0], 0);

        region.sync().unwrap();
        assert_eq!(backing.lock()[0], 7);
    }

    #[test]
    fn memory_region_unmap_keeps_prefix() {
        let mut region = InMemoryRegion::with_data(vec![1, 2, 3], 6);
        assert_eq!(region.as_slice(), &[1, 2, 3, 0, 0, 0]);
        let backing = region.backing();

        region.as_mut_slice()[3] = 4;
        region.unmap(4).unwrap();
        assert_eq!(*backing.lock(), vec![1, 2, 3, 4]);
    }
}
