//! Byte-exact test vectors for the store and index file formats.
//!
//! Other implementations of the format can load these from JSON to check
//! they read and write identical files.

use serde::{Deserialize, Serialize};

/// A file-format test vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// Payloads appended in order, for store vectors; empty for index vectors.
    pub payloads_hex: Vec<String>,
    /// `(relative_offset, position)` entries written in order, for index vectors.
    pub entries: Vec<(u32, u64)>,
    /// Expected file contents after a clean close (hex-encoded).
    pub expected_hex: String,
}

/// Store file vectors.
pub fn store_vectors() -> Vec<TestVector> {
    vec![
        TestVector {
            id: "store_empty_payload".into(),
            description: "A single zero-length record is just its prefix".into(),
            payloads_hex: vec![String::new()],
            entries: Vec::new(),
            expected_hex: "0000000000000000".into(),
        },
        TestVector {
            id: "store_hello_world".into(),
            description: "One 11-byte record".into(),
            payloads_hex: vec![hex_encode(b"hello world")],
            entries: Vec::new(),
            expected_hex: "000000000000000b68656c6c6f20776f726c64".into(),
        },
        TestVector {
            id: "store_two_records".into(),
            description: "Records follow each other with no padding".into(),
            payloads_hex: vec!["01".into(), "0203".into()],
            entries: Vec::new(),
            expected_hex: concat!("0000000000000001", "01", "0000000000000002", "0203").into(),
        },
    ]
}

/// Index file vectors.
pub fn index_vectors() -> Vec<TestVector> {
    vec![
        TestVector {
            id: "index_first_entry".into(),
            description: "Entry for the first record of a segment".into(),
            payloads_hex: Vec::new(),
            entries: vec![(0, 0)],
            expected_hex: "000000000000000000000000".into(),
        },
        TestVector {
            id: "index_hello_world_x3".into(),
            description: "Entries for three 19-byte records".into(),
            payloads_hex: Vec::new(),
            entries: vec![(0, 0), (1, 19), (2, 38)],
            expected_hex: concat!(
                "00000000", "0000000000000000",
                "00000001", "0000000000000013",
                "00000002", "0000000000000026",
            )
            .into(),
        },
        TestVector {
            id: "index_wide_values".into(),
            description: "Maximum relative offset and a position above 4 GiB".into(),
            payloads_hex: Vec::new(),
            entries: vec![(u32::MAX, 0x0000_0001_0000_0000)],
            expected_hex: "ffffffff0000000100000000".into(),
        },
    ]
}

/// Generate all test vectors as JSON.
pub fn all_vectors_json() -> String {
    let vectors = AllTestVectors {
        store: store_vectors(),
        index: index_vectors(),
    };

    serde_json::to_string_pretty(&vectors).expect("Failed to serialize vectors")
}

#[derive(Debug, Serialize, Deserialize)]
struct AllTestVectors {
    store: Vec<TestVector>,
    index: Vec<TestVector>,
}

/// Encodes bytes as lowercase hexadecimal.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Decodes hexadecimal string to bytes.
///
/// # Panics
///
/// Panics on characters that are not hex digits.
pub fn hex_decode(hex: &str) -> Vec<u8> {
    let hex = hex.replace([' ', '\n', '\r'], "");
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).expect("Invalid hex"))
        .collect()
}
