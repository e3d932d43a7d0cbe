//! k2is-io: Memory-mapped fileset access, stream sync, and the 4D view.
//!
//! A K2IS acquisition lands on disk as 8 sibling `.bin` sector streams plus
//! one `.gtg` sidecar. [`K2Dataset::open`] attaches to the fileset, runs the
//! one-time three-phase synchronization protocol, and exposes the data as a
//! lazily decoded `(scan_x, scan_y, det_x, det_y)` array:
//!
//! ```no_run
//! use k2is_io::{AxisIndex, K2Dataset, NullMetadataSource, ReduceAxes};
//!
//! # fn main() -> k2is_io::Result<()> {
//! let data = K2Dataset::open("/data/scan_01", &NullMetadataSource)?;
//! let pattern = data.get([
//!     AxisIndex::from(3),
//!     AxisIndex::from(5),
//!     AxisIndex::full(),
//!     AxisIndex::full(),
//! ])?;
//! let mean_pattern = data.mean(ReduceAxes::Scan);
//! # let _ = (pattern, mean_pattern);
//! # Ok(())
//! # }
//! ```
//!
//! The source is read-only; decoding never mutates the fileset, and the only
//! mutable dataset state is the noise-correction mode.

pub mod dataset;
pub mod error;
pub mod metadata;
pub mod stream;
pub mod sync;
pub mod view;

pub use dataset::{FrameSink, K2DataArray, K2Dataset, NoiseCorrection};
pub use error::{Error, Result};
pub use metadata::{DatasetMetadata, MetadataSource, NullMetadataSource};
pub use stream::{SectorStream, SectorStreams, SharedMmap};
pub use sync::{synchronize, SyncOffsets};
pub use view::{AxisIndex, ReduceAxes};

// Re-export the core types that appear in this crate's public API.
pub use k2is_core::{Image, NdArray, Stripe, StripeCoords};
