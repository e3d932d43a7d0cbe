//! k2is-core: Stripe record codec and pixel buffers for Gatan K2IS raw data.
//!
//! The K2IS detector writes one acquisition as 8 parallel `.bin` streams,
//! each a flat sequence of fixed-size "stripe" records holding 12-bit-packed
//! pixel sub-blocks. This crate provides the format-level pieces:
//!
//! - [`Stripe`] - record parser with sync-marker validation
//! - [`unpack::unpack12`] - packed 12-bit payload expansion
//! - [`Image`] / [`NdArray`] - dense, explicitly shaped buffers
//!
//! Stream synchronization, frame assembly, and the 4D data view live in
//! `k2is-io`.

pub mod buffer;
pub mod error;
pub mod stripe;
pub mod unpack;

pub use buffer::{Image, NdArray};
pub use error::{Error, Result};
pub use stripe::{
    Stripe, StripeCoords, FRAME_COLS, FRAME_ROWS, HIDDEN_ROWS, PAYLOAD_SIZE, SAMPLES_PER_STRIPE,
    SECTOR_COUNT, SECTOR_WIDTH, STRIPES_PER_SECTOR_PER_FRAME, STRIPE_COLS, STRIPE_ROWS,
    STRIPE_SIZE, SYNC_MARKER, VISIBLE_COLS, VISIBLE_ROWS,
};
pub use unpack::unpack12;
