//! Sidecar metadata collaborator.
//!
//! Parsing the `.gtg` DigitalMicrograph tag tree is outside this crate. A
//! [`MetadataSource`] implementation supplies the scan and detector shapes
//! plus the raw tag map; everything else about the sidecar is opaque here.

use crate::Result;
use std::collections::BTreeMap;
use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Shapes and tags extracted from the sidecar file.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DatasetMetadata {
    /// `(scan_x, scan_y)` scan grid, if the sidecar records it.
    pub scan_shape: Option<(usize, usize)>,
    /// `(det_x, det_y)` visible detector shape, if the sidecar records it.
    pub detector_shape: Option<(usize, usize)>,
    /// All remaining key/value tags, uninterpreted.
    pub tags: BTreeMap<String, String>,
}

/// Supplies dataset metadata from a sidecar path.
pub trait MetadataSource {
    /// Reads metadata for the dataset whose sidecar is at `sidecar`.
    ///
    /// # Errors
    /// Implementations may fail outright; the caller falls back to derived
    /// shapes with a warning.
    fn read(&self, sidecar: &Path) -> Result<DatasetMetadata>;
}

/// A metadata source that knows nothing.
///
/// Opens filesets whose sidecar is unreadable; the dataset then derives its
/// scan shape from the stream length and assumes the default detector shape.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullMetadataSource;

impl MetadataSource for NullMetadataSource {
    fn read(&self, _sidecar: &Path) -> Result<DatasetMetadata> {
        Ok(DatasetMetadata::default())
    }
}
