//! # SegLog Testkit
//!
//! Test utilities for SegLog storage.
//!
//! This crate provides:
//! - A temporary store/index pair standing in for the owning segment
//! - Property-based test generators using proptest
//! - Crash simulation and recovery checks
//! - Concurrent stress harnesses
//! - Byte-exact file-format vectors
//!
//! ## Usage
//!
//! ```rust
//! use seglog_testkit::prelude::*;
//!
//! let segment = TestSegment::new();
//! let record = segment.append(b"payload").unwrap();
//! assert_eq!(segment.read(record as i64).unwrap(), b"payload");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod generators;
pub mod stress;
pub mod vectors;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::crash::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::stress::*;
    pub use crate::vectors::*;
    pub use crate::init_tracing;
}

pub use fixtures::*;
pub use generators::*;
pub use stress::*;
pub use vectors::*;

use tracing_subscriber::EnvFilter;

/// Installs a test-friendly tracing subscriber once per process.
///
/// The filter comes from `RUST_LOG`; output goes through the test harness
/// so it is only shown for failing tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
