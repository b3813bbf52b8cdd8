//! Property-based test generators using proptest.

use proptest::prelude::*;

/// Strategy for a single record payload, empty payloads included.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..1024)
}

/// Strategy for a batch of payloads to append in order.
pub fn payload_batch_strategy(max_records: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(payload_strategy(), 1..=max_records.max(1))
}

/// Strategy for index entries as a store would produce them.
///
/// Relative offsets count up from zero and positions are prefix sums of
/// record widths, each record being at least its 8-byte length prefix.
pub fn index_entries_strategy(max_entries: usize) -> impl Strategy<Value = Vec<(u32, u64)>> {
    prop::collection::vec(0u64..4096, 1..=max_entries.max(1)).prop_map(|payload_lens| {
        let mut position = 0u64;
        payload_lens
            .into_iter()
            .enumerate()
            .map(|(i, len)| {
                let entry = (i as u32, position);
                position += 8 + len;
                entry
            })
            .collect()
    })
}

/// Strategy for an index capacity in whole entries.
pub fn entry_capacity_strategy() -> impl Strategy<Value = u64> {
    1u64..256
}
