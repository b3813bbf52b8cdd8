//! Fixed-width wire encoding shared by the store and the index.
//!
//! All functions take the byte order as a type parameter. [`WireOrder`] is the
//! order used for files written by this crate.

use byteorder::{BigEndian, ByteOrder};

/// Byte order of every integer in store and index files.
pub type WireOrder = BigEndian;

/// Width of the length prefix in front of each store record.
pub const LEN_WIDTH: usize = 8;

/// Width of the relative-offset field of an index entry.
pub const OFFSET_WIDTH: usize = 4;

/// Width of the position field of an index entry.
pub const POSITION_WIDTH: usize = 8;

/// Width of one index entry.
pub const ENTRY_WIDTH: usize = OFFSET_WIDTH + POSITION_WIDTH;

/// Encodes a record length prefix.
#[must_use]
pub fn encode_len<B: ByteOrder>(len: u64) -> [u8; LEN_WIDTH] {
    let mut buf = [0u8; LEN_WIDTH];
    B::write_u64(&mut buf, len);
    buf
}

/// Decodes a record length prefix.
#[must_use]
pub fn decode_len<B: ByteOrder>(buf: &[u8; LEN_WIDTH]) -> u64 {
    B::read_u64(buf)
}

/// Writes an index entry into the first [`ENTRY_WIDTH`] bytes of `dst`.
///
/// # Panics
///
/// Panics if `dst` is shorter than [`ENTRY_WIDTH`].
pub fn encode_entry<B: ByteOrder>(dst: &mut [u8], relative_offset: u32, position: u64) {
    B::write_u32(&mut dst[..OFFSET_WIDTH], relative_offset);
    B::write_u64(&mut dst[OFFSET_WIDTH..ENTRY_WIDTH], position);
}

/// Reads an index entry from the first [`ENTRY_WIDTH`] bytes of `src`.
///
/// # Panics
///
/// Panics if `src` is shorter than [`ENTRY_WIDTH`].
#[must_use]
pub fn decode_entry<B: ByteOrder>(src: &[u8]) -> (u32, u64) {
    (
        B::read_u32(&src[..OFFSET_WIDTH]),
        B::read_u64(&src[OFFSET_WIDTH..ENTRY_WIDTH]),
    )
}
