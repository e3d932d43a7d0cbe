//! Synthetic fileset builders shared by the integration tests.
//!
//! Streams are generated the way the hardware writes them: a global stripe
//! sequence (32 stripes per frame, block counter shared across sectors),
//! with each sector's file starting at its own point in that sequence.

#![allow(dead_code, clippy::cast_possible_truncation)]

use k2is_core::{
    SAMPLES_PER_STRIPE, SECTOR_COUNT, SECTOR_WIDTH, STRIPES_PER_SECTOR_PER_FRAME, STRIPE_COLS,
    STRIPE_ROWS, STRIPE_SIZE, SYNC_MARKER,
};
use k2is_io::SectorStreams;
use std::path::Path;

/// Pixel value for (frame, global row, global column), masked to 12 bits by
/// the encoder.
pub type ValueFn = fn(usize, usize, usize) -> u16;

/// Inverse of `unpack12`; the production crate is read-only so this lives in
/// the test harness.
pub fn pack12(samples: &[u16]) -> Vec<u8> {
    assert_eq!(samples.len() % 2, 0);
    let mut out = Vec::with_capacity(samples.len() / 2 * 3);
    for pair in samples.chunks_exact(2) {
        let v0 = pair[0] & 0x0FFF;
        let v1 = pair[1] & 0x0FFF;
        out.push((v0 & 0xFF) as u8);
        out.push((((v0 >> 8) & 0x0F) | ((v1 & 0x0F) << 4)) as u8);
        out.push((v1 >> 4) as u8);
    }
    out
}

/// Sector-local (x0, y0) of stripe `j` within its frame: stripes tile the
/// 256-wide sector as two bands of 930 rows, sixteen 16-column strips each.
pub fn stripe_origin(j: usize) -> (usize, usize) {
    ((j % 16) * STRIPE_COLS, (j / 16) * STRIPE_ROWS)
}

/// Encodes one on-disk stripe record.
pub fn encode_stripe(
    block: u32,
    frame: u32,
    shutter: u8,
    sector: usize,
    j: usize,
    value: ValueFn,
) -> Vec<u8> {
    let (x0, y0) = stripe_origin(j);
    let mut samples = vec![0u16; SAMPLES_PER_STRIPE];
    for (k, sample) in samples.iter_mut().enumerate() {
        let row = y0 + k / STRIPE_COLS;
        let col = sector * SECTOR_WIDTH + x0 + k % STRIPE_COLS;
        *sample = value(frame as usize, row, col) & 0x0FFF;
    }

    let mut raw = vec![0u8; STRIPE_SIZE];
    raw[0..4].copy_from_slice(&SYNC_MARKER.to_be_bytes());
    raw[9] = shutter;
    raw[16..20].copy_from_slice(&block.to_be_bytes());
    raw[24..28].copy_from_slice(&frame.to_be_bytes());
    let coords = [
        x0 as u16,
        y0 as u16,
        (x0 + STRIPE_COLS - 1) as u16,
        (y0 + STRIPE_ROWS - 1) as u16,
    ];
    for (i, c) in coords.iter().enumerate() {
        raw[28 + 2 * i..30 + 2 * i].copy_from_slice(&c.to_be_bytes());
    }
    raw[40..].copy_from_slice(&pack12(&samples));
    raw
}

/// Builds one sector stream covering global stripe indices `start..end`.
///
/// Stripe `g` belongs to frame `g / 32` with in-frame index `g % 32` and
/// carries block counter `g`; frames before `open_frame` are written with
/// the shutter closed.
pub fn build_sector(
    sector: usize,
    start: usize,
    end: usize,
    open_frame: usize,
    value: ValueFn,
) -> Vec<u8> {
    let mut data = Vec::with_capacity((end - start) * STRIPE_SIZE);
    for g in start..end {
        let frame = g / STRIPES_PER_SECTOR_PER_FRAME;
        let j = g % STRIPES_PER_SECTOR_PER_FRAME;
        let shutter = u8::from(frame >= open_frame);
        data.extend_from_slice(&encode_stripe(
            g as u32,
            frame as u32,
            shutter,
            sector,
            j,
            value,
        ));
    }
    data
}

/// Builds all 8 sector streams, sector `s` starting at global stripe
/// `starts[s]`, all ending after `n_frames` whole frames.
pub fn build_streams(
    starts: [usize; SECTOR_COUNT],
    n_frames: usize,
    open_frame: usize,
    value: ValueFn,
) -> SectorStreams<Vec<u8>> {
    let end = n_frames * STRIPES_PER_SECTOR_PER_FRAME;
    SectorStreams::new(
        (0..SECTOR_COUNT)
            .map(|s| build_sector(s, starts[s], end, open_frame, value))
            .collect(),
    )
}

/// Writes a complete on-disk fileset (8 `.bin` + 1 `.gtg`) into `dir`.
pub fn write_fileset(dir: &Path, n_frames: usize, value: ValueFn) {
    for sector in 0..SECTOR_COUNT {
        let data = build_sector(sector, 0, n_frames * STRIPES_PER_SECTOR_PER_FRAME, 0, value);
        std::fs::write(dir.join(format!("scan_{}.bin", sector + 1)), data).unwrap();
    }
    std::fs::write(dir.join("scan_.gtg"), b"sidecar placeholder").unwrap();
}

/// Default pixel pattern: distinct per frame, varies over both detector axes.
pub fn pattern(frame: usize, row: usize, col: usize) -> u16 {
    ((frame * 131 + row * 5 + col * 3) % 0x800) as u16
}
