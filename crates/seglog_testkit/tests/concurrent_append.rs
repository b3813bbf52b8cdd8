//! Concurrent appends and reads against shared instances.

use seglog_storage::{Config, Store};
use seglog_testkit::prelude::*;
use std::sync::Arc;

#[test]
fn concurrent_appends_never_interleave() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(Store::open(&dir.path().join("0.store")).unwrap());
    let config = StressConfig {
        threads: 8,
        appends_per_thread: 200,
        payload_size: 48,
    };

    let (result, appended) = stress_concurrent_appends(&store, &config);
    assert_eq!(result.failed_ops, 0);
    assert_eq!(result.successful_ops, config.total_appends());
    assert_eq!(verify_appends(&store, &appended), 0);

    // Every record occupies exactly its prefix plus payload.
    let mut positions: Vec<u64> = appended.iter().map(|(p, _)| *p).collect();
    positions.sort_unstable();
    for (i, position) in positions.iter().enumerate() {
        assert_eq!(*position, i as u64 * (8 + 48));
    }
    assert_eq!(store.size(), config.total_appends() as u64 * 56);
}

#[test]
fn concurrent_appends_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("0.store");
    let store = Arc::new(Store::open(&path).unwrap());
    let config = StressConfig {
        threads: 4,
        appends_per_thread: 100,
        payload_size: 16,
    };

    let (_, appended) = stress_concurrent_appends(&store, &config);
    let store = Arc::try_unwrap(store).expect("threads have finished");
    store.close().unwrap();

    let store = Store::open(&path).unwrap();
    assert_eq!(verify_appends(&store, &appended), 0);
    assert_eq!(store.records().count(), config.total_appends());
}

#[test]
fn readers_see_consistent_segment_while_writing() {
    let segment = Arc::new(TestSegment::with_config(
        Config::new().max_index_bytes(4096 * 12),
    ));
    let config = StressConfig {
        threads: 4,
        appends_per_thread: 500,
        payload_size: 32,
    };

    let result = stress_read_while_writing(&segment, &config);
    assert_eq!(result.failed_ops, 0);
    assert_eq!(segment.index.len(), config.total_appends() as u64);
}
