//! Crash recovery testing.
//!
//! Simulates the ways a segment can be left on disk by a process that died
//! mid-operation, runs the recovery procedure, and checks that every record
//! written before the crash is still readable through the index.
//!
//! ## Recovery Procedure
//!
//! 1. Cut any partial record off the store ([`truncate_torn_tail`]).
//! 2. Rebuild the index from the store ([`rebuild_index`]).
//!
//! ## Usage
//!
//! ```rust
//! use seglog_testkit::crash::{CrashPoint, CrashRecoveryHarness};
//!
//! let mut harness = CrashRecoveryHarness::new(8);
//! let result = harness.run(CrashPoint::TornPayload);
//! assert!(result.passed, "{:?}", result.error);
//! ```

use crate::fixtures::TestSegment;
use seglog_storage::codec::{self, WireOrder};
use seglog_storage::{
    rebuild_index, truncate_torn_tail, Config, Index, StorageResult, Store,
};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

/// Points at which a crash can be simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// Crash after a clean shutdown; nothing to repair.
    None,
    /// Crash without closing: the index keeps its pre-allocated length.
    UncleanIndex,
    /// Crash after the store append but before the index write.
    BeforeIndexWrite,
    /// Crash partway through a length prefix.
    TornPrefix,
    /// Crash after the length prefix, partway through the payload.
    TornPayload,
}

impl CrashPoint {
    /// Every crash point.
    pub const ALL: [CrashPoint; 5] = [
        CrashPoint::None,
        CrashPoint::UncleanIndex,
        CrashPoint::BeforeIndexWrite,
        CrashPoint::TornPrefix,
        CrashPoint::TornPayload,
    ];
}

/// Result of a crash recovery test.
#[derive(Debug, Clone)]
pub struct CrashRecoveryResult {
    /// The simulated crash.
    pub crash_point: CrashPoint,
    /// Whether the test passed.
    pub passed: bool,
    /// Records expected after recovery.
    pub expected_records: u64,
    /// Records found after recovery.
    pub actual_records: u64,
    /// Any error message.
    pub error: Option<String>,
}

impl CrashRecoveryResult {
    /// Creates a passing result.
    pub fn pass(crash_point: CrashPoint, records: u64) -> Self {
        Self {
            crash_point,
            passed: true,
            expected_records: records,
            actual_records: records,
            error: None,
        }
    }

    /// Creates a failing result.
    pub fn fail(crash_point: CrashPoint, expected: u64, actual: u64, error: &str) -> Self {
        Self {
            crash_point,
            passed: false,
            expected_records: expected,
            actual_records: actual,
            error: Some(error.to_string()),
        }
    }
}

/// Runs the recovery procedure on the segment files at the given paths.
///
/// # Errors
///
/// Returns an error if the store cannot be repaired or the index rebuilt.
pub fn recover_segment(
    store_path: &Path,
    index_path: &Path,
    config: &Config,
) -> StorageResult<(Store, Index)> {
    truncate_torn_tail(store_path)?;
    let store = Store::open_with_config(store_path, &config.store)?;
    let index = rebuild_index(&store, index_path, &config.index())?;
    Ok((store, index))
}

/// Test harness for crash recovery scenarios.
pub struct CrashRecoveryHarness {
    records: u64,
    config: Config,
    /// Results of the runs so far.
    pub results: Vec<CrashRecoveryResult>,
}

impl CrashRecoveryHarness {
    /// Creates a harness that writes `records` records before each crash.
    pub fn new(records: u64) -> Self {
        Self {
            records,
            config: Config::new().max_index_bytes((records + 8) * 12),
            results: Vec::new(),
        }
    }

    /// Payload of record `i`.
    pub fn payload(i: u64) -> Vec<u8> {
        format!("record-{i:06}").into_bytes()
    }

    /// Simulates one crash, recovers, and verifies the surviving records.
    pub fn run(&mut self, crash_point: CrashPoint) -> CrashRecoveryResult {
        let result = match self.try_run(crash_point) {
            Ok(result) => result,
            Err(e) => CrashRecoveryResult::fail(crash_point, self.records, 0, &e.to_string()),
        };
        self.results.push(result.clone());
        result
    }

    /// Runs every crash point.
    pub fn run_all(&mut self) -> Vec<CrashRecoveryResult> {
        CrashPoint::ALL.iter().map(|p| self.run(*p)).collect()
    }

    /// Returns `true` if every run so far passed.
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    fn try_run(&self, crash_point: CrashPoint) -> StorageResult<CrashRecoveryResult> {
        let segment = TestSegment::with_config(self.config.clone());
        for i in 0..self.records {
            segment.append(&Self::payload(i))?;
        }

        // Records the recovered segment must hold.
        let mut expected = self.records;
        let store_path = segment.store_path();
        let index_path = segment.index_path();

        let temp_dir = match crash_point {
            CrashPoint::None => segment.close()?,
            CrashPoint::UncleanIndex => segment.abandon(),
            CrashPoint::BeforeIndexWrite => {
                segment.store.append(&Self::payload(self.records))?;
                expected += 1;
                segment.abandon()
            }
            CrashPoint::TornPrefix => {
                let dir = segment.abandon();
                append_raw(&store_path, &[0, 0, 0])?;
                dir
            }
            CrashPoint::TornPayload => {
                let dir = segment.abandon();
                let payload = Self::payload(self.records);
                append_raw(&store_path, &codec::encode_len::<WireOrder>(payload.len() as u64))?;
                append_raw(&store_path, &payload[..payload.len() / 2])?;
                dir
            }
        };

        let (store, index) = recover_segment(&store_path, &index_path, &self.config)?;
        let actual = index.len();
        if actual != expected {
            return Ok(CrashRecoveryResult::fail(
                crash_point,
                expected,
                actual,
                "record count mismatch after recovery",
            ));
        }

        for i in 0..expected {
            let (_, position) = index.read(i as i64)?;
            if store.read(position)? != Self::payload(i) {
                return Ok(CrashRecoveryResult::fail(
                    crash_point,
                    expected,
                    actual,
                    &format!("record {i} has wrong payload"),
                ));
            }
        }

        index.close()?;
        store.close()?;
        drop(temp_dir);
        Ok(CrashRecoveryResult::pass(crash_point, expected))
    }
}

fn append_raw(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    let mut file = OpenOptions::new().append(true).open(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}
