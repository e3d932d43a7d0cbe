//! Stream synchronization protocol.
//!
//! The 8 sector streams of a fileset are not guaranteed to start at the same
//! logical frame: acquisition may begin mid-frame, sectors may lead or lag
//! each other by whole records, and the first complete frames are often
//! recorded with the beam blanked. [`synchronize`] runs once at open time and
//! produces one stripe offset per sector such that stripe
//! `frame * 32 + offset[sector]` is the first stripe of logical `frame`, with
//! the shutter open.
//!
//! Three phases, in order:
//! 1. Block alignment - advance every sector to the highest first-stripe
//!    block counter. The block counter is the only field consistent across
//!    sectors at this point.
//! 2. Frame completeness - verify all 32x8 stripes at the offsets agree on
//!    one frame id; if not, re-scan once for the next frame id and confirm.
//! 3. Shutter alignment - skip whole frames per sector until the first
//!    stripe of a candidate frame has the shutter open.
//!
//! Skew is assumed to be whole records only; the format guarantees record
//! alignment.

use crate::stream::{SectorStream, SectorStreams};
use crate::{Error, Result};
use k2is_core::{Stripe, SECTOR_COUNT, STRIPES_PER_SECTOR_PER_FRAME};
use log::{info, warn};

/// Per-sector stripe offsets established by [`synchronize`].
///
/// Computed once at open time and immutable for the dataset's lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SyncOffsets {
    stripes: [usize; SECTOR_COUNT],
}

impl SyncOffsets {
    /// The offset of `sector`, in stripe units.
    #[must_use]
    pub fn sector(&self, sector: usize) -> usize {
        self.stripes[sector]
    }

    /// All 8 offsets in sector order.
    #[must_use]
    pub fn as_array(&self) -> [usize; SECTOR_COUNT] {
        self.stripes
    }

    /// Stream stripe index of stripe 0 of logical `frame` in `sector`.
    #[must_use]
    pub fn frame_start(&self, sector: usize, frame: usize) -> usize {
        frame * STRIPES_PER_SECTOR_PER_FRAME + self.stripes[sector]
    }
}

/// Runs the three-phase protocol over a stream set.
///
/// # Errors
/// Returns [`Error::Sync`] if a scan runs off the end of a stream (no
/// consistent offset exists) and [`Error::Stripe`] if a record read during
/// the protocol fails to parse. A frame that is still incomplete after the
/// bounded phase-2 re-scan is logged, not an error.
pub fn synchronize<D: AsRef<[u8]>>(streams: &SectorStreams<D>) -> Result<SyncOffsets> {
    let mut offsets = [0usize; SECTOR_COUNT];

    // Phase 1: block alignment.
    let mut first_blocks = [0u32; SECTOR_COUNT];
    for (sector, block) in first_blocks.iter_mut().enumerate() {
        *block = parse_at(streams.sector(sector), 0, sector)?.block;
    }
    let target_block = *first_blocks.iter().max().unwrap();
    info!("aligning all sectors to block {target_block}");

    for (sector, offset) in offsets.iter_mut().enumerate() {
        *offset = scan_from(streams.sector(sector), 0, sector, |s| {
            s.block == target_block
        })?;
    }
    info!("block alignment offsets: {offsets:?}");

    // Phase 2: frame completeness.
    match check_frame_complete(streams, &offsets)? {
        Completeness::Complete => {}
        Completeness::Incomplete { first, next } => {
            warn!("first frame {first} is incomplete, seeking frame {next}");
            for (sector, offset) in offsets.iter_mut().enumerate() {
                *offset += scan_from(streams.sector(sector), *offset, sector, |s| {
                    s.frame == next
                })?;
            }
            info!("revised offsets: {offsets:?}");

            // One confirmation pass, no further retry.
            match check_frame_complete(streams, &offsets)? {
                Completeness::Complete => info!("revised first frame is complete"),
                Completeness::Incomplete { .. } => {
                    warn!("frame still incomplete after re-scan; data may be corrupt");
                }
            }
        }
    }

    // Phase 3: shutter alignment, stepping in whole frames.
    for (sector, offset) in offsets.iter_mut().enumerate() {
        let mut skipped = 0;
        loop {
            let index = *offset + skipped * STRIPES_PER_SECTOR_PER_FRAME;
            if parse_at(streams.sector(sector), index, sector)?.shutter_open() {
                break;
            }
            skipped += 1;
        }
        *offset += skipped * STRIPES_PER_SECTOR_PER_FRAME;
    }
    info!("sync offsets: {offsets:?}");

    Ok(SyncOffsets { stripes: offsets })
}

enum Completeness {
    Complete,
    Incomplete { first: u32, next: u32 },
}

/// Reads 32 stripes per sector at the given offsets and checks that they all
/// carry the frame id of the very first stripe read.
fn check_frame_complete<D: AsRef<[u8]>>(
    streams: &SectorStreams<D>,
    offsets: &[usize; SECTOR_COUNT],
) -> Result<Completeness> {
    let first = parse_at(streams.sector(0), offsets[0], 0)?.frame;
    let mut next = None;
    for (sector, &offset) in offsets.iter().enumerate() {
        for j in 0..STRIPES_PER_SECTOR_PER_FRAME {
            let frame = parse_at(streams.sector(sector), offset + j, sector)?.frame;
            if frame != first {
                next = Some(frame);
            }
        }
    }
    Ok(match next {
        None => Completeness::Complete,
        Some(next) => Completeness::Incomplete { first, next },
    })
}

/// Advances one stripe at a time from `start` until `pred` matches, returning
/// the number of stripes advanced.
fn scan_from<D: AsRef<[u8]>>(
    stream: &SectorStream<D>,
    start: usize,
    sector: usize,
    pred: impl Fn(&Stripe<'_>) -> bool,
) -> Result<usize> {
    let mut advanced = 0;
    loop {
        let stripe = parse_at(stream, start + advanced, sector)?;
        if pred(&stripe) {
            return Ok(advanced);
        }
        advanced += 1;
    }
}

fn parse_at<'a, D: AsRef<[u8]>>(
    stream: &'a SectorStream<D>,
    index: usize,
    sector: usize,
) -> Result<Stripe<'a>> {
    let raw = stream.stripe_at(index).ok_or_else(|| {
        Error::Sync(format!(
            "sector {sector}: reached end of stream at stripe {index}"
        ))
    })?;
    Ok(Stripe::parse(raw)?)
}
