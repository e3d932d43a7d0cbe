//! The 4D indexing and reduction surface.
//!
//! A read takes one [`AxisIndex`] per axis of `(scan_x, scan_y, det_x,
//! det_y)`. Scalars, `[start,stop,step)` slices, and explicit index lists
//! all expand to index arrays first, so fancy indexing and plain slicing
//! share one decode path.
//!
//! Axis-pair ordering is deliberate and matches the acquisition convention:
//! the scan pair is gridded in Cartesian ("xy") order, so the result's scan
//! axes run (y, x), while the detector pair is gridded in matrix ("ij")
//! order and runs (x, y). Reductions are restricted to whole axis pairs at
//! the type level by [`ReduceAxes`].

use crate::dataset::K2DataArray;
use crate::{Error, Result};
use k2is_core::{Image, NdArray};
use std::ops::{Range, RangeFull};

/// One axis of a 4D read request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AxisIndex {
    /// A single position; the axis collapses to length 1 before squeezing.
    At(usize),
    /// A half-open `[start, stop)` range with a step.
    ///
    /// `start` defaults to 0, `stop` to the axis length, `step` to 1.
    Slice {
        /// First index, inclusive.
        start: Option<usize>,
        /// End index, exclusive.
        stop: Option<usize>,
        /// Stride between indices; must be nonzero.
        step: usize,
    },
    /// Explicit index list (fancy indexing). Order and repeats are honored.
    List(Vec<usize>),
}

impl AxisIndex {
    /// The whole axis.
    #[must_use]
    pub fn full() -> Self {
        AxisIndex::Slice {
            start: None,
            stop: None,
            step: 1,
        }
    }

    /// Expands to explicit indices against an axis of length `len`.
    ///
    /// # Errors
    /// Returns [`Error::IndexOutOfBounds`] if any resolved index falls
    /// outside the axis.
    ///
    /// # Panics
    /// Panics on a zero step; that is a contract violation, not a runtime
    /// condition.
    pub fn expand(&self, len: usize, axis: usize) -> Result<Vec<usize>> {
        let indices = match self {
            AxisIndex::At(i) => vec![*i],
            AxisIndex::Slice { start, stop, step } => {
                assert!(*step > 0, "slice step must be nonzero");
                (start.unwrap_or(0)..stop.unwrap_or(len))
                    .step_by(*step)
                    .collect()
            }
            AxisIndex::List(list) => list.clone(),
        };
        for &index in &indices {
            if index >= len {
                return Err(Error::IndexOutOfBounds { axis, index, len });
            }
        }
        Ok(indices)
    }
}

impl From<usize> for AxisIndex {
    fn from(i: usize) -> Self {
        AxisIndex::At(i)
    }
}

impl From<Range<usize>> for AxisIndex {
    fn from(r: Range<usize>) -> Self {
        AxisIndex::Slice {
            start: Some(r.start),
            stop: Some(r.end),
            step: 1,
        }
    }
}

impl From<RangeFull> for AxisIndex {
    fn from(_: RangeFull) -> Self {
        AxisIndex::full()
    }
}

impl From<Vec<usize>> for AxisIndex {
    fn from(list: Vec<usize>) -> Self {
        AxisIndex::List(list)
    }
}

/// The two reducible axis pairs.
///
/// Any other axis selection is unrepresentable: reducing over the scan pair
/// yields one detector-shaped image, reducing over the detector pair yields
/// one scan-shaped image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReduceAxes {
    /// Reduce over `(scan_x, scan_y)`.
    Scan,
    /// Reduce over `(det_x, det_y)`.
    Detector,
}

impl<D: AsRef<[u8]>> K2DataArray<D> {
    /// Reads a sub-block of the logical 4D array.
    ///
    /// Every requested scan position is decoded, corrected, and cropped to
    /// the requested detector rectangle. The result's axes are
    /// `(scan_y_sel, scan_x_sel, det_x_sel, det_y_sel)` with leading
    /// singleton axes squeezed away.
    ///
    /// # Errors
    /// Returns [`Error::IndexOutOfBounds`] if any resolved index is outside
    /// its axis.
    pub fn get(&self, index: [AxisIndex; 4]) -> Result<NdArray<i16>> {
        let (scan_x, scan_y, det_x, det_y) = self.shape();
        let xs = index[0].expand(scan_x, 0)?;
        let ys = index[1].expand(scan_y, 1)?;
        let qx = index[2].expand(det_x, 2)?;
        let qy = index[3].expand(det_y, 3)?;

        let mut out = NdArray::zeroed(&[ys.len(), xs.len(), qx.len(), qy.len()]);
        let mut pos = 0;
        {
            let data = out.as_mut_slice();
            for &y in &ys {
                for &x in &xs {
                    let frame = self.corrected_frame(self.frame_index(x, y));
                    for &i in &qx {
                        for &j in &qy {
                            data[pos] = frame.get(i, j);
                            pos += 1;
                        }
                    }
                }
            }
        }

        out.squeeze_leading();
        Ok(out)
    }

    /// Mean over one axis pair, accumulated in f64.
    #[must_use]
    pub fn mean(&self, axes: ReduceAxes) -> Image<f64> {
        let (scan_x, scan_y, det_x, det_y) = self.shape();
        match axes {
            ReduceAxes::Scan => {
                let mut sum = self.sum(ReduceAxes::Scan);
                let n = (scan_x * scan_y) as f64;
                for v in sum.as_mut_slice() {
                    *v /= n;
                }
                sum
            }
            ReduceAxes::Detector => {
                let n = (det_x * det_y) as f64;
                self.per_frame_scalar(|frame| {
                    frame.as_slice().iter().map(|&v| f64::from(v)).sum::<f64>() / n
                })
            }
        }
    }

    /// Sum over one axis pair, accumulated in f64.
    #[must_use]
    pub fn sum(&self, axes: ReduceAxes) -> Image<f64> {
        match axes {
            ReduceAxes::Scan => {
                let (_, _, det_x, det_y) = self.shape();
                let mut acc = Image::<f64>::zeroed(det_x, det_y);
                for scan in self.scan_positions() {
                    let frame = self.corrected_visible_frame(scan.0, scan.1);
                    for (a, &v) in acc.as_mut_slice().iter_mut().zip(frame.as_slice()) {
                        *a += f64::from(v);
                    }
                }
                acc
            }
            ReduceAxes::Detector => self.per_frame_scalar(|frame| {
                frame.as_slice().iter().map(|&v| f64::from(v)).sum::<f64>()
            }),
        }
    }

    /// Elementwise (scan pair) or per-frame (detector pair) maximum.
    #[must_use]
    pub fn max(&self, axes: ReduceAxes) -> Image<i16> {
        let (scan_x, scan_y, det_x, det_y) = self.shape();
        match axes {
            ReduceAxes::Scan => {
                let mut acc: Option<Image<i16>> = None;
                for scan in self.scan_positions() {
                    let frame = self.corrected_visible_frame(scan.0, scan.1);
                    match &mut acc {
                        None => acc = Some(frame),
                        Some(acc) => {
                            for (a, &v) in acc.as_mut_slice().iter_mut().zip(frame.as_slice()) {
                                *a = (*a).max(v);
                            }
                        }
                    }
                }
                acc.unwrap_or_else(|| Image::zeroed(det_x, det_y))
            }
            ReduceAxes::Detector => {
                let mut out = Image::zeroed(scan_x, scan_y);
                for (x, y) in self.scan_positions() {
                    let frame = self.corrected_visible_frame(x, y);
                    let max = frame.as_slice().iter().copied().max().unwrap_or(0);
                    out.set(x, y, max);
                }
                out
            }
        }
    }

    /// Reduces every frame to one scalar, producing a scan-shaped image.
    fn per_frame_scalar(&self, f: impl Fn(&Image<i16>) -> f64) -> Image<f64> {
        let (scan_x, scan_y, _, _) = self.shape();
        let mut out = Image::zeroed(scan_x, scan_y);
        for (x, y) in self.scan_positions() {
            let frame = self.corrected_visible_frame(x, y);
            out.set(x, y, f(&frame));
        }
        out
    }

    /// Scan traversal order for reductions: y outer, x inner.
    fn scan_positions(&self) -> impl Iterator<Item = (usize, usize)> {
        let (scan_x, scan_y) = self.scan_shape;
        (0..scan_y).flat_map(move |y| (0..scan_x).map(move |x| (x, y)))
    }
}
