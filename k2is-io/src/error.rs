//! I/O and dataset error types.

use thiserror::Error;

/// Result type for fileset operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for fileset access and the 4D view.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The dataset directory does not hold exactly 8 `.bin` and 1 `.gtg`.
    #[error("wrong file count: found {bins} .bin and {sidecars} .gtg files (need 8 and 1)")]
    WrongFileCount {
        /// Number of `.bin` streams found.
        bins: usize,
        /// Number of `.gtg` sidecars found.
        sidecars: usize,
    },

    /// The metadata collaborator failed outright.
    ///
    /// Produced by `MetadataSource` implementations; the open path reports
    /// it in a warning and falls back to derived shapes.
    #[error("metadata error: {0}")]
    Metadata(String),

    /// The synchronization protocol ran off the end of a stream.
    #[error("synchronization failed: {0}")]
    Sync(String),

    /// Stripe-level decode error.
    #[error("stripe error: {0}")]
    Stripe(#[from] k2is_core::Error),

    /// A resolved index is out of bounds for its axis.
    #[error("index {index} out of bounds for axis {axis} with length {len}")]
    IndexOutOfBounds {
        /// Axis number in the 4D shape.
        axis: usize,
        /// The offending resolved index.
        index: usize,
        /// Logical length of that axis.
        len: usize,
    },

    /// A user dark reference does not match the visible detector shape.
    #[error("dark reference is {rows}x{cols}, expected 1792x1920")]
    DarkReferenceShape {
        /// Rows of the rejected reference.
        rows: usize,
        /// Columns of the rejected reference.
        cols: usize,
    },
}
