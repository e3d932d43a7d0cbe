//! K2IS stripe record layout and parser.
//!
//! Every `.bin` sector stream is a flat sequence of fixed-size records
//! ("stripes"). One stripe carries a 930x16-pixel packed sub-block plus a
//! small big-endian header at fixed byte offsets.

use crate::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Sync marker every valid stripe starts with.
pub const SYNC_MARKER: u32 = 0xFFFF_0055;

/// On-disk size of one stripe record in bytes.
pub const STRIPE_SIZE: usize = 0x5758; // 22360

/// Size of the packed pixel payload in bytes.
pub const PAYLOAD_SIZE: usize = 22320;

/// Number of 12-bit samples carried by one stripe (two per 3-byte group).
pub const SAMPLES_PER_STRIPE: usize = PAYLOAD_SIZE / 3 * 2; // 14880

/// Pixel rows covered by one stripe's sub-block.
pub const STRIPE_ROWS: usize = 930;

/// Pixel columns covered by one stripe's sub-block.
pub const STRIPE_COLS: usize = 16;

/// Number of parallel sector streams in a fileset.
pub const SECTOR_COUNT: usize = 8;

/// Width in pixels of the detector slice owned by one sector.
pub const SECTOR_WIDTH: usize = 256;

/// Full frame buffer height, including the hidden noise rows.
pub const FRAME_ROWS: usize = 1860;

/// Full frame buffer width (8 sectors x 256 columns).
pub const FRAME_COLS: usize = SECTOR_COUNT * SECTOR_WIDTH; // 2048

/// Height of the visible detector region.
pub const VISIBLE_ROWS: usize = 1792;

/// Width of the visible detector region.
pub const VISIBLE_COLS: usize = 1920;

/// Rows beyond the visible area, used only for readout-noise estimation.
pub const HIDDEN_ROWS: usize = FRAME_ROWS - VISIBLE_ROWS; // 68

/// Stripes written per sector for one complete frame.
pub const STRIPES_PER_SECTOR_PER_FRAME: usize = 32;

// Header field byte offsets within a record. The gaps are padding the
// hardware writes but the reader never interprets.
const SYNC_OFFSET: usize = 0;
const SHUTTER_OFFSET: usize = 9;
const BLOCK_OFFSET: usize = 16;
const FRAME_OFFSET: usize = 24;
const COORDS_OFFSET: usize = 28;
const DATA_OFFSET: usize = 40;

/// Inclusive pixel rectangle a stripe fills, in sector-local coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StripeCoords {
    /// First column.
    pub x0: u16,
    /// First row.
    pub y0: u16,
    /// Last column (inclusive).
    pub x1: u16,
    /// Last row (inclusive).
    pub y1: u16,
}

/// One parsed stripe record, borrowing its packed payload from the stream.
#[derive(Clone, Copy, Debug)]
pub struct Stripe<'a> {
    /// Shutter state flag: 0 = beam blanked, nonzero = open.
    pub shutter: u8,
    /// Hardware block counter, monotonic and shared across sectors.
    pub block: u32,
    /// Logical frame counter.
    pub frame: u32,
    /// Target pixel rectangle, expected to describe a 16x930 block.
    pub coords: StripeCoords,
    payload: &'a [u8],
}

impl<'a> Stripe<'a> {
    /// Parses one raw stripe record.
    ///
    /// # Errors
    /// Returns [`Error::TruncatedRecord`] if `raw` is not exactly one record
    /// long and [`Error::BadSync`] if the sync marker is wrong. A bad sync
    /// marker is fatal for this stripe only; callers are expected to log it
    /// and carry on with the remaining stripes of the frame.
    pub fn parse(raw: &'a [u8]) -> Result<Self> {
        if raw.len() != STRIPE_SIZE {
            return Err(Error::TruncatedRecord { len: raw.len() });
        }

        let sync = read_u32_be(raw, SYNC_OFFSET);
        if sync != SYNC_MARKER {
            return Err(Error::BadSync { found: sync });
        }

        Ok(Self {
            shutter: raw[SHUTTER_OFFSET],
            block: read_u32_be(raw, BLOCK_OFFSET),
            frame: read_u32_be(raw, FRAME_OFFSET),
            coords: StripeCoords {
                x0: read_u16_be(raw, COORDS_OFFSET),
                y0: read_u16_be(raw, COORDS_OFFSET + 2),
                x1: read_u16_be(raw, COORDS_OFFSET + 4),
                y1: read_u16_be(raw, COORDS_OFFSET + 6),
            },
            payload: &raw[DATA_OFFSET..DATA_OFFSET + PAYLOAD_SIZE],
        })
    }

    /// True if the shutter was open while this stripe was read out.
    #[must_use]
    pub fn shutter_open(&self) -> bool {
        self.shutter != 0
    }

    /// The packed 12-bit pixel payload.
    #[must_use]
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    /// Unpacks the payload into [`SAMPLES_PER_STRIPE`] samples in row-major
    /// 930x16 order.
    #[must_use]
    pub fn unpack(&self) -> Vec<u16> {
        let mut out = vec![0u16; SAMPLES_PER_STRIPE];
        crate::unpack::unpack12(self.payload, &mut out);
        out
    }
}

#[inline]
fn read_u32_be(raw: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes(raw[offset..offset + 4].try_into().unwrap())
}

#[inline]
fn read_u16_be(raw: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes(raw[offset..offset + 2].try_into().unwrap())
}
