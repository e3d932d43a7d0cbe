//! Error types for k2is-core.

use thiserror::Error;

/// Result type alias for stripe-level operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for stripe decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The record's sync marker does not match the format constant.
    #[error("bad sync marker: {found:#010x} (expected 0xffff0055)")]
    BadSync {
        /// The value found in the sync field.
        found: u32,
    },

    /// The record is shorter or longer than one stripe.
    #[error("truncated stripe record: {len} bytes (expected 22360)")]
    TruncatedRecord {
        /// Length of the rejected record.
        len: usize,
    },
}
