//! 12-bit pixel payload unpacking.
//!
//! The detector packs two consecutive 12-bit samples into every 3-byte
//! group, low nibble first:
//!
//! ```text
//! v0 = b0 | ((b1 & 0x0F) << 8)
//! v1 = ((b1 & 0xF0) >> 4) | (b2 << 4)
//! ```

use rayon::prelude::*;

// 3-byte groups handed to one rayon task. One stripe payload (7440 groups)
// splits into four chunks.
const GROUPS_PER_CHUNK: usize = 1860;

/// Unpacks a packed 12-bit payload into `out`.
///
/// Each rayon task writes a disjoint output range; there is no shared
/// mutable state beyond the pre-sized `out` buffer.
///
/// # Panics
/// Panics if `payload` is not 3-byte aligned or `out` is not exactly
/// two-thirds of `payload` in length. Both are programming-contract
/// violations, not runtime conditions.
pub fn unpack12(payload: &[u8], out: &mut [u16]) {
    assert!(
        payload.len().is_multiple_of(3),
        "payload length {} is not a multiple of 3",
        payload.len()
    );
    assert_eq!(
        out.len(),
        payload.len() / 3 * 2,
        "output length must be two thirds of the payload length"
    );

    payload
        .par_chunks(3 * GROUPS_PER_CHUNK)
        .zip(out.par_chunks_mut(2 * GROUPS_PER_CHUNK))
        .for_each(|(src, dst)| unpack12_chunk(src, dst));
}

fn unpack12_chunk(src: &[u8], dst: &mut [u16]) {
    for (group, pair) in src.chunks_exact(3).zip(dst.chunks_exact_mut(2)) {
        let b0 = u16::from(group[0]);
        let b1 = u16::from(group[1]);
        let b2 = u16::from(group[2]);
        pair[0] = b0 | ((b1 & 0x0F) << 8);
        pair[1] = ((b1 & 0xF0) >> 4) | (b2 << 4);
    }
}
