//! # SegLog Storage
//!
//! The storage pair behind one segment of a commit log.
//!
//! A segment owns one [`Store`] and one [`Index`]:
//!
//! - The store is an append-only file of length-prefixed records. Appending
//!   returns the record's byte *position*.
//! - The index is a memory-mapped table of fixed 12-byte entries mapping a
//!   record number to that position, so lookups need no scan.
//!
//! Creating, rolling and choosing segments is the owner's job; this crate
//! only provides the primitives it needs.
//!
//! ## File Formats
//!
//! ```text
//! store:  | len: u64 BE | payload: len bytes | len: u64 BE | payload | ...
//! index:  | offset: u32 BE | position: u64 BE | offset | position | ...
//! ```
//!
//! ## Example
//!
//! ```rust
//! use seglog_storage::{Config, Index, Store};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let config = Config::new().max_index_bytes(1024);
//!
//! let store = Store::open(&dir.path().join("0.store")).unwrap();
//! let index = Index::open(&dir.path().join("0.index"), &config.index()).unwrap();
//!
//! let (_, position) = store.append(b"hello world").unwrap();
//! index.write(0, position).unwrap();
//!
//! let (_, position) = index.read(0).unwrap();
//! assert_eq!(store.read(position).unwrap(), b"hello world");
//!
//! index.close().unwrap();
//! store.close().unwrap();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
mod config;
mod error;
mod index;
mod mapped;
mod recovery;
mod store;

pub use config::{Config, IndexConfig, SegmentConfig, StoreConfig};
pub use error::{StorageError, StorageResult};
pub use index::Index;
pub use mapped::{InMemoryRegion, MappedRegion, MmapFile};
pub use recovery::{rebuild_index, scan_store, truncate_torn_tail, StoreScan};
pub use store::{Records, Store};
