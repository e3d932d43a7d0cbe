//! Sector stream access.
//!
//! Each of the 8 `.bin` files is exposed as a [`SectorStream`]: a read-only
//! byte source addressed in whole-stripe units. Streams are generic over
//! `D: AsRef<[u8]>` so tests can run against in-memory buffers while real
//! datasets use memory-mapped files.

use crate::{Error, Result};
use k2is_core::{SECTOR_COUNT, STRIPE_SIZE};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// A cheaply cloneable shared memory map.
#[derive(Clone, Debug)]
pub struct SharedMmap(Arc<Mmap>);

impl SharedMmap {
    /// Memory-maps a file read-only.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or memory-mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified
        // concurrently. This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self(Arc::new(mmap)))
    }
}

impl AsRef<[u8]> for SharedMmap {
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}

/// One sector's byte stream, addressed in whole stripes.
#[derive(Debug)]
pub struct SectorStream<D> {
    data: D,
}

impl<D: AsRef<[u8]>> SectorStream<D> {
    /// Wraps a byte source.
    pub fn new(data: D) -> Self {
        Self { data }
    }

    /// Stream length in bytes.
    #[must_use]
    pub fn len_bytes(&self) -> usize {
        self.data.as_ref().len()
    }

    /// Number of complete stripe records in the stream.
    #[must_use]
    pub fn stripe_count(&self) -> usize {
        self.len_bytes() / STRIPE_SIZE
    }

    /// The raw bytes of stripe `index`, or `None` past end of stream.
    #[must_use]
    pub fn stripe_at(&self, index: usize) -> Option<&[u8]> {
        let start = index.checked_mul(STRIPE_SIZE)?;
        let end = start.checked_add(STRIPE_SIZE)?;
        self.data.as_ref().get(start..end)
    }
}

/// The set of 8 sector streams composing one dataset.
#[derive(Debug)]
pub struct SectorStreams<D> {
    sectors: Vec<SectorStream<D>>,
}

impl<D: AsRef<[u8]>> SectorStreams<D> {
    /// Builds the set from exactly [`SECTOR_COUNT`] sources, in sector order.
    ///
    /// # Panics
    /// Panics if the source count is not exactly 8.
    #[must_use]
    pub fn new(sources: Vec<D>) -> Self {
        assert_eq!(sources.len(), SECTOR_COUNT, "a dataset has exactly 8 sectors");
        Self {
            sectors: sources.into_iter().map(SectorStream::new).collect(),
        }
    }

    /// The stream for sector `sector`.
    ///
    /// # Panics
    /// Panics if `sector >= 8`.
    #[must_use]
    pub fn sector(&self, sector: usize) -> &SectorStream<D> {
        &self.sectors[sector]
    }

    /// Stripe count of the shortest sector stream.
    #[must_use]
    pub fn min_stripe_count(&self) -> usize {
        self.sectors
            .iter()
            .map(SectorStream::stripe_count)
            .min()
            .unwrap_or(0)
    }
}

impl SectorStreams<SharedMmap> {
    /// Memory-maps the given `.bin` files, in sector order.
    ///
    /// # Errors
    /// Returns an error if any file cannot be opened or mapped.
    pub fn open_files(paths: &[std::path::PathBuf]) -> Result<Self> {
        if paths.len() != SECTOR_COUNT {
            return Err(Error::WrongFileCount {
                bins: paths.len(),
                sidecars: 1,
            });
        }
        let mut sources = Vec::with_capacity(SECTOR_COUNT);
        for path in paths {
            sources.push(SharedMmap::open(path)?);
        }
        Ok(Self::new(sources))
    }
}
