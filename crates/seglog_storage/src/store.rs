//! Append-only record store.

use crate::codec::{self, WireOrder, LEN_WIDTH};
use crate::config::StoreConfig;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const PREFIX: u64 = LEN_WIDTH as u64;

/// An append-only file of length-prefixed records.
///
/// Each record is stored as an 8-byte big-endian payload length followed by
/// the payload. A record is addressed by its *position*: the byte offset of
/// its length prefix.
///
/// # Durability
///
/// Appends go through a write buffer. Every read flushes the buffer first, so
/// readers in this process always see prior appends. [`Store::sync`] forces
/// the data to disk.
///
/// # Thread Safety
///
/// All operations take one exclusive lock, so appends and reads never
/// overlap. A failed append leaves the store in an unknown state: the owner
/// must stop using it and repair the file (see
/// [`truncate_torn_tail`](crate::truncate_torn_tail)) before reopening.
///
/// # Example
///
/// ```no_run
/// use seglog_storage::Store;
/// use std::path::Path;
///
/// let store = Store::open(Path::new("00000000000000000000.store")).unwrap();
/// let (written, position) = store.append(b"hello world").unwrap();
/// assert_eq!(written, 19);
/// assert_eq!(store.read(position).unwrap(), b"hello world");
/// store.close().unwrap();
/// ```
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    writer: BufWriter<File>,
    /// Bytes written so far, buffered or not.
    size: u64,
}

impl Store {
    /// Opens or creates a store at the given path with default settings.
    ///
    /// An existing file is reopened and its length becomes the store size.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::open_with_config(path, &StoreConfig::default())
    }

    /// Opens or creates a store, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot
    /// be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Opens or creates a store with explicit settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the file cannot
    /// be opened.
    pub fn open_with_config(path: &Path, config: &StoreConfig) -> StorageResult<Self> {
        config.validate()?;

        // Append mode pins every write to the end of the file, so seeking
        // for reads never moves the write cursor.
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        let size = file.metadata()?.len();

        debug!(path = %path.display(), size, "opened store");

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(Inner {
                writer: BufWriter::with_capacity(config.write_buffer_size, file),
                size,
            }),
        })
    }

    /// Returns the path to the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of bytes written, including buffered bytes.
    ///
    /// This is the position the next append will use.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    /// Appends a record.
    ///
    /// Returns `(bytes_written, position)`: the bytes the record occupies,
    /// prefix included, and the position it was written at.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails. The store must then be treated as
    /// corrupt; the size counter may no longer match the file.
    pub fn append(&self, payload: &[u8]) -> StorageResult<(u64, u64)> {
        let mut inner = self.inner.lock();
        let position = inner.size;
        let len = payload.len() as u64;

        inner
            .writer
            .write_all(&codec::encode_len::<WireOrder>(len))?;
        inner.writer.write_all(payload)?;

        let written = PREFIX + len;
        inner.size += written;
        Ok((written, position))
    }

    /// Reads the record at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ReadPastEnd`] if no length prefix fits at
    /// `position`, or if the prefix claims more bytes than the store holds.
    /// Returns an I/O error if the read itself fails.
    pub fn read(&self, position: u64) -> StorageResult<Vec<u8>> {
        let mut inner = self.inner.lock();
        inner.writer.flush()?;
        let size = inner.size;

        let payload_start = match position.checked_add(PREFIX) {
            Some(start) if start <= size => start,
            _ => {
                return Err(StorageError::ReadPastEnd {
                    offset: position,
                    len: PREFIX,
                    size,
                })
            }
        };

        let file = inner.writer.get_ref();
        let mut prefix = [0u8; LEN_WIDTH];
        read_exact_at(file, &mut prefix, position)?;
        let len = codec::decode_len::<WireOrder>(&prefix);

        if payload_start.checked_add(len).map_or(true, |end| end > size) {
            return Err(StorageError::ReadPastEnd {
                offset: payload_start,
                len,
                size,
            });
        }
        let len = usize::try_from(len).map_err(|_| {
            StorageError::Corrupted(format!("record at {position} too large: {len} bytes"))
        })?;

        let mut payload = vec![0u8; len];
        read_exact_at(file, &mut payload, payload_start)?;
        Ok(payload)
    }

    /// Reads raw bytes starting at `offset` into `buf`.
    ///
    /// No length prefix is interpreted. Returns the number of bytes read,
    /// which is less than `buf.len()` only when the end of the file is
    /// reached.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing or reading fails.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> StorageResult<usize> {
        let mut inner = self.inner.lock();
        inner.writer.flush()?;

        let mut file = inner.writer.get_ref();
        file.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < buf.len() {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    /// Returns an iterator over `(position, payload)` for every record.
    ///
    /// The iterator reads records one at a time and stops at the store size
    /// observed on each step, so records appended during iteration are
    /// included.
    pub fn records(&self) -> Records<'_> {
        Records {
            store: self,
            position: 0,
            done: false,
        }
    }

    /// Flushes buffered appends to the OS.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    pub fn flush(&self) -> StorageResult<()> {
        self.inner.lock().writer.flush()?;
        Ok(())
    }

    /// Flushes buffered appends and syncs the file to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush or sync fails.
    pub fn sync(&self) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        inner.writer.flush()?;
        inner.writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Flushes buffered appends, syncs the file to disk and closes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush or sync fails. Errors the OS only
    /// reports when the descriptor itself is released are not observable.
    pub fn close(self) -> StorageResult<()> {
        let Inner { writer, size } = self.inner.into_inner();
        let file = writer.into_inner().map_err(io::IntoInnerError::into_error)?;
        file.sync_all()?;
        drop(file);

        debug!(path = %self.path.display(), size, "closed store");
        Ok(())
    }
}

/// Iterator over the records of a [`Store`].
///
/// Created by [`Store::records`]. Yields an error at most once, then stops.
#[derive(Debug)]
pub struct Records<'a> {
    store: &'a Store,
    position: u64,
    done: bool,
}

impl Iterator for Records<'_> {
    type Item = StorageResult<(u64, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.position >= self.store.size() {
            return None;
        }

        match self.store.read(self.position) {
            Ok(payload) => {
                let position = self.position;
                self.position += PREFIX + payload.len() as u64;
                Some(Ok((position, payload)))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

fn read_exact_at(mut file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    const WRITE: &[u8] = b"hello world";
    const WIDTH: u64 = WRITE.len() as u64 + PREFIX;

    #[test]
    fn store_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.store");

        let store = Store::open(&path).unwrap();
        assert_eq!(store.size(), 0);
        assert!(path.exists());
        assert_eq!(store.path(), path);
    }

    #[test]
    fn store_append_positions() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.store")).unwrap();

        for i in 1..4u64 {
            let (n, pos) = store.append(WRITE).unwrap();
            assert_eq!(n, WIDTH);
            assert_eq!(pos + n, WIDTH * i);
        }
        assert_eq!(store.size(), WIDTH * 3);
    }

    #[test]
    fn store_hello_world_scenario() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.store")).unwrap();

        let positions: Vec<u64> = (0..3).map(|_| store.append(WRITE).unwrap().1).collect();
        assert_eq!(positions, vec![0, 19, 38]);

        for pos in positions {
            assert_eq!(store.read(pos).unwrap(), WRITE);
        }
    }

    #[test]
    fn store_read_sees_buffered_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.store");
        let store = Store::open(&path).unwrap();

        store.append(WRITE).unwrap();
        // Still in the write buffer.
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

        assert_eq!(store.read(0).unwrap(), WRITE);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), WIDTH);
    }

    #[test]
    fn store_read_at_raw_bytes() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.store")).unwrap();
        for _ in 0..3 {
            store.append(WRITE).unwrap();
        }

        let mut off = 0u64;
        for _ in 0..3 {
            let mut prefix = [0u8; LEN_WIDTH];
            let n = store.read_at(&mut prefix, off).unwrap();
            assert_eq!(n, LEN_WIDTH);
            off += n as u64;

            let size = codec::decode_len::<WireOrder>(&prefix);
            let mut payload = vec![0u8; size as usize];
            let n = store.read_at(&mut payload, off).unwrap();
            assert_eq!(n as u64, size);
            assert_eq!(payload, WRITE);
            off += n as u64;
        }
    }

    #[test]
    fn store_read_at_short_at_end() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.store")).unwrap();
        store.append(b"abc").unwrap();

        let mut buf = [0u8; 32];
        assert_eq!(store.read_at(&mut buf, 8).unwrap(), 3);
        assert_eq!(&buf[..3], b"abc");
        assert_eq!(store.read_at(&mut buf, 100).unwrap(), 0);
    }

    #[test]
    fn store_read_past_end_fails() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.store")).unwrap();
        store.append(WRITE).unwrap();

        let err = store.read(WIDTH).unwrap_err();
        assert!(matches!(err, StorageError::ReadPastEnd { .. }));
        assert!(err.is_eof());

        assert!(matches!(
            store.read(u64::MAX),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn store_truncated_payload_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.store");

        let mut bytes = codec::encode_len::<WireOrder>(100).to_vec();
        bytes.extend_from_slice(b"short");
        std::fs::write(&path, &bytes).unwrap();

        let store = Store::open(&path).unwrap();
        assert_eq!(store.size(), 13);
        let err = store.read(0).unwrap_err();
        assert!(matches!(
            err,
            StorageError::ReadPastEnd {
                offset: 8,
                len: 100,
                size: 13
            }
        ));
    }

    #[test]
    fn store_empty_payload() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.store")).unwrap();

        let (n, pos) = store.append(b"").unwrap();
        assert_eq!((n, pos), (PREFIX, 0));
        assert!(store.read(0).unwrap().is_empty());

        let (_, pos) = store.append(WRITE).unwrap();
        assert_eq!(pos, PREFIX);
    }

    #[test]
    fn store_close_flushes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.store");

        let store = Store::open(&path).unwrap();
        store.append(WRITE).unwrap();
        let before = std::fs::metadata(&path).unwrap().len();

        store.close().unwrap();
        let after = std::fs::metadata(&path).unwrap().len();
        assert!(after > before);
        assert_eq!(after, WIDTH);
    }

    #[test]
    fn store_close_persists_whole_buffer() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.store");
        let config = StoreConfig {
            write_buffer_size: 1024 * 1024,
        };

        let store = Store::open_with_config(&path, &config).unwrap();
        for _ in 0..100 {
            store.append(WRITE).unwrap();
        }
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

        store.close().unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len() as u64, 100 * WIDTH);
        assert_eq!(&bytes[PREFIX as usize..WIDTH as usize], WRITE);
    }

    #[test]
    fn store_reopen_recovers_size() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.store");

        {
            let store = Store::open(&path).unwrap();
            store.append(WRITE).unwrap();
            store.append(b"second").unwrap();
            store.close().unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert_eq!(store.size(), WIDTH + PREFIX + 6);
        assert_eq!(store.read(0).unwrap(), WRITE);
        assert_eq!(store.read(WIDTH).unwrap(), b"second");

        let (_, pos) = store.append(b"third").unwrap();
        assert_eq!(pos, WIDTH + PREFIX + 6);
    }

    #[test]
    fn store_records_iterates_in_order() {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.store")).unwrap();
        store.append(b"a").unwrap();
        store.append(b"bb").unwrap();
        store.append(b"ccc").unwrap();

        let records: Vec<_> = store.records().map(Result::unwrap).collect();
        assert_eq!(
            records,
            vec![
                (0, b"a".to_vec()),
                (9, b"bb".to_vec()),
                (19, b"ccc".to_vec()),
            ]
        );
    }

    #[test]
    fn store_sync_and_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.store");
        let store = Store::open(&path).unwrap();
        store.append(WRITE).unwrap();

        store.flush().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), WIDTH);
        assert!(store.sync().is_ok());
    }

    #[test]
    fn store_small_write_buffer() {
        let dir = tempdir().unwrap();
        let config = StoreConfig {
            write_buffer_size: 4,
        };
        let store = Store::open_with_config(&dir.path().join("test.store"), &config).unwrap();

        let (_, pos) = store.append(WRITE).unwrap();
        assert_eq!(store.read(pos).unwrap(), WRITE);
    }

    #[test]
    fn store_create_with_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("segment").join("0.store");

        let store = Store::open_with_create_dirs(&path).unwrap();
        assert_eq!(store.size(), 0);
        assert!(path.exists());
    }

    #[test]
    fn store_concurrent_appends() {
        let dir = tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("test.store")).unwrap());

        let handles: Vec<_> = (0..8u8)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..50u8)
                        .map(|i| {
                            let payload = vec![t, i, t ^ i, 0xAB];
                            let (_, pos) = store.append(&payload).unwrap();
                            (pos, payload)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut appended = Vec::new();
        for handle in handles {
            appended.extend(handle.join().unwrap());
        }

        assert_eq!(store.size(), 8 * 50 * (PREFIX + 4));
        for (pos, payload) in appended {
            assert_eq!(store.read(pos).unwrap(), payload);
        }
    }

    proptest! {
        #[test]
        fn prop_positions_are_prefix_sums(
            payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..256), 1..32)
        ) {
            let dir = tempdir().unwrap();
            let store = Store::open(&dir.path().join("prop.store")).unwrap();

            let mut expected = 0u64;
            for payload in &payloads {
                let (n, pos) = store.append(payload).unwrap();
                prop_assert_eq!(pos, expected);
                prop_assert_eq!(n, PREFIX + payload.len() as u64);
                expected += n;
                prop_assert_eq!(&store.read(pos).unwrap(), payload);
            }
            prop_assert_eq!(store.size(), expected);
        }
    }
}
