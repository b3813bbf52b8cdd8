//! Files written by the store and index match the published vectors.

use seglog_storage::{Index, IndexConfig, Store};
use seglog_testkit::vectors::{hex_decode, hex_encode, index_vectors, store_vectors};

#[test]
fn store_files_match_vectors() {
    for vector in store_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vector.store");

        let store = Store::open(&path).unwrap();
        for payload in &vector.payloads_hex {
            store.append(&hex_decode(payload)).unwrap();
        }
        store.close().unwrap();

        assert_eq!(
            hex_encode(&std::fs::read(&path).unwrap()),
            vector.expected_hex,
            "Vector {} failed: {}",
            vector.id,
            vector.description
        );
    }
}

#[test]
fn store_reads_vector_files() {
    for vector in store_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vector.store");
        std::fs::write(&path, hex_decode(&vector.expected_hex)).unwrap();

        let store = Store::open(&path).unwrap();
        let payloads: Vec<String> = store
            .records()
            .map(|r| hex_encode(&r.unwrap().1))
            .collect();
        assert_eq!(payloads, vector.payloads_hex, "Vector {}", vector.id);
    }
}

#[test]
fn index_files_match_vectors() {
    for vector in index_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vector.index");
        let config = IndexConfig::with_entries(vector.entries.len() as u64 + 4);

        let index = Index::open(&path, &config).unwrap();
        for (off, pos) in &vector.entries {
            index.write(*off, *pos).unwrap();
        }
        index.close().unwrap();

        assert_eq!(
            hex_encode(&std::fs::read(&path).unwrap()),
            vector.expected_hex,
            "Vector {} failed: {}",
            vector.id,
            vector.description
        );

        let index = Index::open(&path, &config).unwrap();
        for (i, entry) in vector.entries.iter().enumerate() {
            assert_eq!(index.read(i as i64).unwrap(), *entry, "Vector {}", vector.id);
        }
    }
}

mod properties {
    use proptest::prelude::*;
    use seglog_storage::codec::{decode_entry, WireOrder, ENTRY_WIDTH};
    use seglog_storage::{Index, IndexConfig};
    use seglog_testkit::generators::index_entries_strategy;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn closed_index_is_packed_entries(entries in index_entries_strategy(64)) {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("prop.index");
            let index = Index::open(&path, &IndexConfig::with_entries(64)).unwrap();
            for (off, pos) in &entries {
                index.write(*off, *pos).unwrap();
            }
            index.close().unwrap();

            let bytes = std::fs::read(&path).unwrap();
            prop_assert_eq!(bytes.len(), entries.len() * ENTRY_WIDTH);
            for (chunk, entry) in bytes.chunks(ENTRY_WIDTH).zip(&entries) {
                prop_assert_eq!(decode_entry::<WireOrder>(chunk), *entry);
            }
        }
    }
}
