//! Stress tests for the store and index.
//!
//! These verify behavior under heavy load and concurrent access.

use crate::fixtures::TestSegment;
use seglog_storage::Store;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent threads.
    pub threads: usize,
    /// Appends issued by each thread.
    pub appends_per_thread: usize,
    /// Size of each payload in bytes.
    pub payload_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 8,
            appends_per_thread: 500,
            payload_size: 64,
        }
    }
}

impl StressConfig {
    /// Total appends across all threads.
    pub fn total_appends(&self) -> usize {
        self.threads * self.appends_per_thread
    }
}

/// Builds a payload unique to `(thread, seq)`, padded to `size` bytes.
///
/// Payloads shorter than 16 bytes are not guaranteed to be unique.
pub fn tagged_payload(thread: usize, seq: usize, size: usize) -> Vec<u8> {
    let mut payload = Vec::with_capacity(size.max(16));
    payload.extend_from_slice(&(thread as u64).to_be_bytes());
    payload.extend_from_slice(&(seq as u64).to_be_bytes());
    let fill = (thread ^ seq) as u8;
    payload.resize(size.max(16), fill);
    payload.truncate(size);
    payload
}

/// Appends from many threads at once.
///
/// Returns the run statistics and every `(position, payload)` that was
/// appended successfully.
pub fn stress_concurrent_appends(
    store: &Arc<Store>,
    config: &StressConfig,
) -> (StressTestResult, Vec<(u64, Vec<u8>)>) {
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let store = Arc::clone(store);
            let failed = Arc::clone(&failed);
            let config = config.clone();
            thread::spawn(move || {
                let mut appended = Vec::with_capacity(config.appends_per_thread);
                for seq in 0..config.appends_per_thread {
                    let payload = tagged_payload(t, seq, config.payload_size);
                    match store.append(&payload) {
                        Ok((_, position)) => appended.push((position, payload)),
                        Err(_) => {
                            failed.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                }
                appended
            })
        })
        .collect();

    let mut appended = Vec::with_capacity(config.total_appends());
    for handle in handles {
        appended.extend(handle.join().expect("Append thread panicked"));
    }

    let result = StressTestResult::new(
        appended.len(),
        failed.load(Ordering::SeqCst),
        start.elapsed(),
    );
    (result, appended)
}

/// Reads back every appended record and counts mismatches.
pub fn verify_appends(store: &Store, appended: &[(u64, Vec<u8>)]) -> usize {
    appended
        .iter()
        .filter(|(position, payload)| match store.read(*position) {
            Ok(read) => read != *payload,
            Err(_) => true,
        })
        .count()
}

/// Runs concurrent readers against a segment while one writer appends.
///
/// Readers pick records that are already indexed, so every read must
/// succeed. Returns the combined read and write statistics.
pub fn stress_read_while_writing(
    segment: &Arc<TestSegment>,
    config: &StressConfig,
) -> StressTestResult {
    let failed = Arc::new(AtomicUsize::new(0));
    let succeeded = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let writer = {
        let segment = Arc::clone(segment);
        let failed = Arc::clone(&failed);
        let succeeded = Arc::clone(&succeeded);
        let config = config.clone();
        thread::spawn(move || {
            for seq in 0..config.total_appends() {
                match segment.append(&tagged_payload(0, seq, config.payload_size)) {
                    Ok(_) => succeeded.fetch_add(1, Ordering::SeqCst),
                    Err(_) => failed.fetch_add(1, Ordering::SeqCst),
                };
            }
        })
    };

    let readers: Vec<_> = (0..config.threads)
        .map(|t| {
            let segment = Arc::clone(segment);
            let failed = Arc::clone(&failed);
            let succeeded = Arc::clone(&succeeded);
            let config = config.clone();
            thread::spawn(move || {
                for i in 0..config.appends_per_thread {
                    let len = segment.index.len();
                    if len == 0 {
                        thread::yield_now();
                        continue;
                    }
                    let record = ((t + i * 7) as u64) % len;
                    let expected = tagged_payload(0, record as usize, config.payload_size);
                    match segment.read(record as i64) {
                        Ok(read) if read == expected => succeeded.fetch_add(1, Ordering::SeqCst),
                        _ => failed.fetch_add(1, Ordering::SeqCst),
                    };
                }
            })
        })
        .collect();

    writer.join().expect("Writer thread panicked");
    for reader in readers {
        reader.join().expect("Reader thread panicked");
    }

    StressTestResult::new(
        succeeded.load(Ordering::SeqCst),
        failed.load(Ordering::SeqCst),
        start.elapsed(),
    )
}
