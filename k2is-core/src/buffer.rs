//! Dense, explicitly shaped pixel buffers.
//!
//! These replace the numeric-array machinery the decode path would otherwise
//! lean on: nothing here broadcasts or strides, every operation is a loop
//! over an explicit shape.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A dense row-major 2D buffer.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Image<T> {
    rows: usize,
    cols: usize,
    data: Vec<T>,
}

impl<T: Copy + Default> Image<T> {
    /// Creates an image filled with `T::default()`.
    #[must_use]
    pub fn zeroed(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![T::default(); rows * cols],
        }
    }
}

impl<T: Copy> Image<T> {
    /// Wraps an existing row-major buffer.
    ///
    /// # Panics
    /// Panics if `data.len() != rows * cols`.
    #[must_use]
    pub fn from_vec(rows: usize, cols: usize, data: Vec<T>) -> Self {
        assert_eq!(data.len(), rows * cols, "buffer does not match shape");
        Self { rows, cols, data }
    }

    /// Number of rows.
    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns.
    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Value at `(row, col)`.
    ///
    /// # Panics
    /// Panics if the position is out of bounds.
    #[inline]
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> T {
        assert!(row < self.rows && col < self.cols, "position out of bounds");
        self.data[row * self.cols + col]
    }

    /// Sets the value at `(row, col)`.
    ///
    /// # Panics
    /// Panics if the position is out of bounds.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: T) {
        assert!(row < self.rows && col < self.cols, "position out of bounds");
        self.data[row * self.cols + col] = value;
    }

    /// One full row as a slice.
    #[must_use]
    pub fn row(&self, row: usize) -> &[T] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// One full row as a mutable slice.
    pub fn row_mut(&mut self, row: usize) -> &mut [T] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// The whole buffer in row-major order.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// The whole buffer in row-major order, mutable.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

/// A dense row-major N-dimensional buffer with an explicit shape.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NdArray<T> {
    shape: Vec<usize>,
    data: Vec<T>,
}

impl<T: Copy + Default> NdArray<T> {
    /// Creates an array of the given shape filled with `T::default()`.
    #[must_use]
    pub fn zeroed(shape: &[usize]) -> Self {
        Self {
            shape: shape.to_vec(),
            data: vec![T::default(); shape.iter().product()],
        }
    }
}

impl<T: Copy> NdArray<T> {
    /// Wraps an existing row-major buffer.
    ///
    /// # Panics
    /// Panics if `data.len()` does not equal the product of `shape`.
    #[must_use]
    pub fn from_shape_vec(shape: &[usize], data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            shape.iter().product::<usize>(),
            "buffer does not match shape"
        );
        Self {
            shape: shape.to_vec(),
            data,
        }
    }

    /// The array's shape.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Total number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the array holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The whole buffer in row-major order.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// The whole buffer in row-major order, mutable.
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Value at a full multi-index.
    ///
    /// # Panics
    /// Panics if the index rank or any coordinate is out of bounds.
    #[must_use]
    pub fn at(&self, index: &[usize]) -> T {
        assert_eq!(index.len(), self.shape.len(), "index rank mismatch");
        let mut flat = 0;
        for (i, (&idx, &dim)) in index.iter().zip(&self.shape).enumerate() {
            assert!(idx < dim, "index {idx} out of bounds for axis {i}");
            flat = flat * dim + idx;
        }
        self.data[flat]
    }

    /// Removes leading singleton dimensions, keeping at least one axis.
    pub fn squeeze_leading(&mut self) {
        while self.shape.len() > 1 && self.shape[0] == 1 {
            self.shape.remove(0);
        }
    }
}
