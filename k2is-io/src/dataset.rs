//! The open K2IS dataset: fileset discovery, frame assembly, noise
//! correction, and bulk export.

use crate::metadata::{DatasetMetadata, MetadataSource};
use crate::stream::{SectorStreams, SharedMmap};
use crate::sync::{self, SyncOffsets};
use crate::{Error, Result};
use k2is_core::{
    unpack12, Image, Stripe, FRAME_COLS, FRAME_ROWS, HIDDEN_ROWS, SAMPLES_PER_STRIPE,
    SECTOR_COUNT, SECTOR_WIDTH, STRIPES_PER_SECTOR_PER_FRAME, VISIBLE_COLS, VISIBLE_ROWS,
};
use log::warn;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Active noise-correction mode.
///
/// Exactly one mode is active at any time; switching modes replaces the
/// previous one wholesale, so the auto and user paths can never both apply.
#[derive(Clone, Debug, PartialEq)]
pub enum NoiseCorrection {
    /// Subtract the per-frame column average of the 68 hidden rows.
    Auto,
    /// Subtract a fixed user-supplied 1792x1920 reference from every frame.
    DarkReference(Image<i16>),
}

/// Receives decoded frames from [`K2DataArray::export`].
pub trait FrameSink {
    /// Called once per scan position, in row-major scan order (y outer,
    /// x inner), with the corrected visible frame.
    ///
    /// # Errors
    /// A sink error aborts the export.
    fn write_frame(&mut self, scan_x: usize, scan_y: usize, frame: &Image<i16>) -> Result<()>;
}

/// A lazily decoded 4D view over a K2IS fileset.
///
/// The logical shape is `(scan_x, scan_y, det_x, det_y)` where the detector
/// axes cover the visible region only. Frames are decoded on demand; nothing
/// is cached. Generic over the byte source so synthetic in-memory streams
/// can stand in for memory-mapped files.
#[derive(Debug)]
pub struct K2DataArray<D> {
    pub(crate) streams: SectorStreams<D>,
    pub(crate) offsets: SyncOffsets,
    pub(crate) scan_shape: (usize, usize),
    pub(crate) detector_shape: (usize, usize),
    correction: NoiseCorrection,
    tags: BTreeMap<String, String>,
}

/// A memory-mapped, file-backed dataset.
pub type K2Dataset = K2DataArray<SharedMmap>;

impl K2DataArray<SharedMmap> {
    /// Opens the fileset in `dir`, reading shapes through `metadata`.
    ///
    /// The directory must hold exactly 8 `.bin` streams and 1 `.gtg`
    /// sidecar. A failing or incomplete metadata source is not fatal: the
    /// scan shape falls back to `(frame_count, 1)` and the detector shape to
    /// 1792x1920, each with a logged warning.
    ///
    /// # Errors
    /// Fails on a wrong file count, unmappable files, or a synchronization
    /// scan that runs off the end of a stream.
    pub fn open<P: AsRef<Path>, M: MetadataSource>(dir: P, metadata: &M) -> Result<Self> {
        let (bins, sidecar) = discover_fileset(dir.as_ref())?;
        let streams = SectorStreams::open_files(&bins)?;

        let meta = match metadata.read(&sidecar) {
            Ok(meta) => meta,
            Err(err) => {
                warn!("metadata source failed ({err}); deriving shapes instead");
                DatasetMetadata::default()
            }
        };

        Self::from_streams(streams, meta)
    }
}

impl<D: AsRef<[u8]>> K2DataArray<D> {
    /// Builds a dataset over already-attached sector streams.
    ///
    /// Runs the synchronization protocol once; the resulting offsets are
    /// immutable for the dataset's lifetime.
    ///
    /// # Errors
    /// Fails if synchronization runs off the end of a stream.
    pub fn from_streams(streams: SectorStreams<D>, meta: DatasetMetadata) -> Result<Self> {
        let capacity = streams.min_stripe_count() / STRIPES_PER_SECTOR_PER_FRAME;

        let scan_shape = match meta.scan_shape {
            Some((x, y)) if x > 0 && y > 0 => (x, y),
            Some((x, y)) => {
                warn!("metadata scan shape {x}x{y} is empty; assuming {capacity}x1 from stream length");
                (capacity, 1)
            }
            None => {
                warn!("scan shape not in metadata; assuming {capacity}x1 from stream length");
                (capacity, 1)
            }
        };
        let detector_shape = match meta.detector_shape {
            Some((rows, cols))
                if rows > 0 && rows <= FRAME_ROWS && cols > 0 && cols <= FRAME_COLS =>
            {
                (rows, cols)
            }
            Some((rows, cols)) => {
                warn!("metadata detector shape {rows}x{cols} does not fit a frame; assuming {VISIBLE_ROWS}x{VISIBLE_COLS}");
                (VISIBLE_ROWS, VISIBLE_COLS)
            }
            None => {
                warn!("detector shape not in metadata; assuming {VISIBLE_ROWS}x{VISIBLE_COLS}");
                (VISIBLE_ROWS, VISIBLE_COLS)
            }
        };

        let offsets = sync::synchronize(&streams)?;

        Ok(Self {
            streams,
            offsets,
            scan_shape,
            detector_shape,
            correction: NoiseCorrection::Auto,
            tags: meta.tags,
        })
    }

    /// The logical 4D shape `(scan_x, scan_y, det_x, det_y)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        (
            self.scan_shape.0,
            self.scan_shape.1,
            self.detector_shape.0,
            self.detector_shape.1,
        )
    }

    /// Total number of logical elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scan_shape.0 * self.scan_shape.1 * self.detector_shape.0 * self.detector_shape.1
    }

    /// True if any axis is zero-length.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of whole frames the shortest sector stream can hold.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.streams.min_stripe_count() / STRIPES_PER_SECTOR_PER_FRAME
    }

    /// The per-sector offsets established at open time.
    #[must_use]
    pub fn sync_offsets(&self) -> &SyncOffsets {
        &self.offsets
    }

    /// Uninterpreted sidecar tags.
    #[must_use]
    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// The active noise-correction mode.
    #[must_use]
    pub fn noise_correction(&self) -> &NoiseCorrection {
        &self.correction
    }

    /// The user dark reference, if one is set.
    #[must_use]
    pub fn dark_reference(&self) -> Option<&Image<i16>> {
        match &self.correction {
            NoiseCorrection::Auto => None,
            NoiseCorrection::DarkReference(dark) => Some(dark),
        }
    }

    /// Replaces the noise-correction mode.
    ///
    /// Setting [`NoiseCorrection::DarkReference`] disables the automatic
    /// hidden-row correction; setting [`NoiseCorrection::Auto`] re-enables
    /// it. Correction is a property of the dataset: every frame decoded
    /// afterwards is corrected with the new mode, no matter which view
    /// requested it.
    ///
    /// # Errors
    /// Fails with [`Error::DarkReferenceShape`] if a reference is not
    /// exactly 1792x1920.
    pub fn set_noise_correction(&mut self, mode: NoiseCorrection) -> Result<()> {
        if let NoiseCorrection::DarkReference(dark) = &mode {
            if dark.rows() != VISIBLE_ROWS || dark.cols() != VISIBLE_COLS {
                return Err(Error::DarkReferenceShape {
                    rows: dark.rows(),
                    cols: dark.cols(),
                });
            }
        }
        self.correction = mode;
        Ok(())
    }

    /// Linear frame index of scan position `(scan_x, scan_y)`.
    ///
    /// Frames are laid out with `scan_x` varying fastest.
    #[must_use]
    pub fn frame_index(&self, scan_x: usize, scan_y: usize) -> usize {
        scan_x + scan_y * self.scan_shape.0
    }

    /// Decodes one raw (uncorrected) full 1860x2048 frame.
    ///
    /// Per-record corruption is not fatal: a stripe with a bad sync marker
    /// is logged and its 930x16 region stays zero; a stripe past the end of
    /// a stream ends that sector's placements with a warning. A stripe read
    /// with the shutter closed is logged but still placed.
    #[must_use]
    pub fn decode_frame(&self, frame: usize) -> Image<i16> {
        let mut image = Image::zeroed(FRAME_ROWS, FRAME_COLS);
        let mut samples = vec![0u16; SAMPLES_PER_STRIPE];

        for sector in 0..SECTOR_COUNT {
            let stream = self.streams.sector(sector);
            let col_offset = sector * SECTOR_WIDTH;
            let base = self.offsets.frame_start(sector, frame);

            for j in 0..STRIPES_PER_SECTOR_PER_FRAME {
                let Some(raw) = stream.stripe_at(base + j) else {
                    warn!("frame {frame}: sector {sector} ends before stripe {j}");
                    break;
                };
                let stripe = match Stripe::parse(raw) {
                    Ok(stripe) => stripe,
                    Err(err) => {
                        warn!("frame {frame}: sector {sector} stripe {j}: {err}");
                        continue;
                    }
                };
                if !stripe.shutter_open() {
                    warn!("frame {frame}: sector {sector} stripe {j} has the shutter closed");
                }

                unpack12(stripe.payload(), &mut samples);
                place_stripe(&mut image, &stripe, col_offset, &samples, frame, sector, j);
            }
        }

        image
    }

    /// Decodes one full frame and applies the active noise correction.
    #[must_use]
    pub fn corrected_frame(&self, frame: usize) -> Image<i16> {
        let mut image = self.decode_frame(frame);
        match &self.correction {
            NoiseCorrection::Auto => subtract_hidden_row_noise(&mut image),
            NoiseCorrection::DarkReference(dark) => subtract_dark_reference(&mut image, dark),
        }
        image
    }

    /// The corrected frame at a scan position, cropped to the visible
    /// detector shape.
    #[must_use]
    pub fn corrected_visible_frame(&self, scan_x: usize, scan_y: usize) -> Image<i16> {
        let full = self.corrected_frame(self.frame_index(scan_x, scan_y));
        let (det_x, det_y) = self.detector_shape;
        let mut out = Image::zeroed(det_x, det_y);
        for row in 0..det_x {
            out.row_mut(row).copy_from_slice(&full.row(row)[..det_y]);
        }
        out
    }

    /// Writes every scan position's corrected visible frame to `sink`, in
    /// row-major scan order (y outer, x inner).
    ///
    /// # Errors
    /// Propagates the first sink error.
    pub fn export<S: FrameSink>(&self, sink: &mut S) -> Result<()> {
        for scan_y in 0..self.scan_shape.1 {
            for scan_x in 0..self.scan_shape.0 {
                let frame = self.corrected_visible_frame(scan_x, scan_y);
                sink.write_frame(scan_x, scan_y, &frame)?;
            }
        }
        Ok(())
    }
}

/// Copies one unpacked stripe block into the frame image at the rectangle
/// the stripe header names, shifted into the sector's column range.
fn place_stripe(
    image: &mut Image<i16>,
    stripe: &Stripe<'_>,
    col_offset: usize,
    samples: &[u16],
    frame: usize,
    sector: usize,
    j: usize,
) {
    let coords = stripe.coords;
    let y0 = coords.y0 as usize;
    let y1 = coords.y1 as usize;
    let x0 = coords.x0 as usize + col_offset;
    let x1 = coords.x1 as usize + col_offset;

    if y1 < y0 || x1 < x0 || y1 >= FRAME_ROWS || x1 >= FRAME_COLS {
        warn!("frame {frame}: sector {sector} stripe {j} has bad coords {coords:?}");
        return;
    }
    let cols = x1 - x0 + 1;
    if (y1 - y0 + 1) * cols != SAMPLES_PER_STRIPE {
        warn!("frame {frame}: sector {sector} stripe {j} rectangle is not 930x16 ({coords:?})");
        return;
    }

    for (r, chunk) in samples.chunks_exact(cols).enumerate() {
        let row = &mut image.row_mut(y0 + r)[x0..=x1];
        for (dst, &v) in row.iter_mut().zip(chunk) {
            *dst = v as i16;
        }
    }
}

/// Subtracts each column's hidden-row average from the whole frame.
///
/// The hidden rows carry per-frame readout noise, so the average is computed
/// fresh for every frame. The mean is truncated to i16 before subtraction.
fn subtract_hidden_row_noise(image: &mut Image<i16>) {
    let mut sums = vec![0i64; FRAME_COLS];
    for row in VISIBLE_ROWS..FRAME_ROWS {
        for (sum, &v) in sums.iter_mut().zip(image.row(row)) {
            *sum += i64::from(v);
        }
    }
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let dark: Vec<i16> = sums
        .iter()
        .map(|&sum| (sum as f64 / HIDDEN_ROWS as f64) as i16)
        .collect();

    for row in 0..FRAME_ROWS {
        for (v, &d) in image.row_mut(row).iter_mut().zip(&dark) {
            *v -= d;
        }
    }
}

/// Subtracts a user dark reference from the frame's visible region.
///
/// The reference's logical extent is 1792x1920; the hidden rows and padding
/// columns receive no correction.
fn subtract_dark_reference(image: &mut Image<i16>, dark: &Image<i16>) {
    for row in 0..VISIBLE_ROWS {
        let dst = &mut image.row_mut(row)[..VISIBLE_COLS];
        for (v, &d) in dst.iter_mut().zip(dark.row(row)) {
            *v -= d;
        }
    }
}

/// Finds the 8 `.bin` streams (sorted, sector order) and the single `.gtg`
/// sidecar in `dir`.
fn discover_fileset(dir: &Path) -> Result<(Vec<PathBuf>, PathBuf)> {
    let mut bins = Vec::new();
    let mut sidecars = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("bin") => bins.push(path),
            Some("gtg") => sidecars.push(path),
            _ => {}
        }
    }
    bins.sort();

    if bins.len() != SECTOR_COUNT || sidecars.len() != 1 {
        return Err(Error::WrongFileCount {
            bins: bins.len(),
            sidecars: sidecars.len(),
        });
    }
    Ok((bins, sidecars.pop().unwrap()))
}
