//! Array subsets.
//!
//! An [`ArraySubset`] is a rectangular region of an array, such as the region of a field covered by a chunk.
//! This module provides convenience functions for extracting and linearising the elements within array subsets.

use derive_more::Display;
use itertools::Itertools;
use thiserror::Error;

use crate::array::{ArrayIndices, ArrayShape};

/// An array subset.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Display, Default)]
#[display("start {start:?} shape {shape:?}")]
pub struct ArraySubset {
    /// The start of the array subset.
    start: ArrayIndices,
    /// The shape of the array subset.
    shape: ArrayShape,
}

/// An array extract bytes error.
#[derive(Debug, Error)]
#[error("array subset {_0} is incompatible with array of shape {_1:?} and element size {_2}")]
pub struct ArrayExtractBytesError(ArraySubset, ArrayShape, usize);

/// An incompatible dimensionality error.
#[derive(Copy, Clone, Debug, Error)]
#[error("incompatible dimensionality {0}, expected {1}")]
pub struct IncompatibleDimensionalityError(usize, usize);

impl IncompatibleDimensionalityError {
    /// Create a new incompatible dimensionality error.
    #[must_use]
    pub const fn new(got: usize, expected: usize) -> Self {
        Self(got, expected)
    }
}

impl ArraySubset {
    /// Create a new array subset with `shape` starting at the origin.
    #[must_use]
    pub fn new_with_shape(shape: ArrayShape) -> Self {
        Self {
            start: vec![0; shape.len()],
            shape,
        }
    }

    /// Create a new array subset.
    ///
    /// # Errors
    /// Returns [`IncompatibleDimensionalityError`] if the lengths of `start` and `shape` do not match.
    pub fn new_with_start_shape(
        start: ArrayIndices,
        shape: ArrayShape,
    ) -> Result<Self, IncompatibleDimensionalityError> {
        if start.len() == shape.len() {
            Ok(Self { start, shape })
        } else {
            Err(IncompatibleDimensionalityError::new(
                start.len(),
                shape.len(),
            ))
        }
    }

    /// Return the start of the array subset.
    #[must_use]
    pub fn start(&self) -> &[u64] {
        &self.start
    }

    /// Return the shape of the array subset.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Return the dimensionality of the array subset.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.start.len()
    }

    /// Return the end (exclusive) of the array subset.
    #[must_use]
    pub fn end_exc(&self) -> ArrayIndices {
        std::iter::zip(&self.start, &self.shape)
            .map(|(start, size)| start + size)
            .collect()
    }

    /// Return the number of elements of the array subset.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// Returns true if the array subset is within the bounds of `array_shape`.
    #[must_use]
    pub fn inbounds(&self, array_shape: &[u64]) -> bool {
        self.dimensionality() == array_shape.len()
            && self
                .end_exc()
                .iter()
                .zip(array_shape)
                .all(|(end, shape)| end <= shape)
    }

    /// Return the contiguous runs of the array subset within an array of shape `array_shape`.
    ///
    /// Each run is a linearised array index and a number of contiguous elements, in row-major order.
    /// The array subset must be within the bounds of `array_shape`.
    #[must_use]
    pub fn contiguous_linearised_indices(&self, array_shape: &[u64]) -> Vec<(u64, u64)> {
        debug_assert!(self.inbounds(array_shape));
        if self.num_elements() == 0 {
            return Vec::new();
        }
        let strides: Vec<u64> = array_strides(array_shape);
        let mut run_length = 1;
        let mut outer_dims = 0;
        for dim in (0..self.dimensionality()).rev() {
            run_length *= self.shape[dim];
            if self.shape[dim] != array_shape[dim] {
                outer_dims = dim;
                break;
            }
        }
        let run_start: u64 = (outer_dims..self.dimensionality())
            .map(|dim| self.start[dim] * strides[dim])
            .sum();
        if outer_dims == 0 {
            return vec![(run_start, run_length)];
        }
        (0..outer_dims)
            .map(|dim| self.start[dim]..self.start[dim] + self.shape[dim])
            .multi_cartesian_product()
            .map(|indices| {
                let offset: u64 = std::iter::zip(&indices, &strides)
                    .map(|(index, stride)| index * stride)
                    .sum();
                (offset + run_start, run_length)
            })
            .collect()
    }

    /// Return the bytes in this array subset from an array with shape `array_shape` and `element_size`.
    ///
    /// # Errors
    /// Returns [`ArrayExtractBytesError`] if the length of `bytes` does not match `array_shape` and `element_size`,
    /// or the array subset is outside of the bounds of `array_shape`.
    pub fn extract_bytes(
        &self,
        bytes: &[u8],
        array_shape: &[u64],
        element_size: usize,
    ) -> Result<Vec<u8>, ArrayExtractBytesError> {
        let expected_len = array_shape.iter().product::<u64>() * element_size as u64;
        if bytes.len() as u64 != expected_len || !self.inbounds(array_shape) {
            return Err(ArrayExtractBytesError(
                self.clone(),
                array_shape.to_vec(),
                element_size,
            ));
        }
        let mut out = Vec::with_capacity(self.num_elements() as usize * element_size);
        for (index, length) in self.contiguous_linearised_indices(array_shape) {
            let start = index as usize * element_size;
            out.extend_from_slice(&bytes[start..start + length as usize * element_size]);
        }
        Ok(out)
    }
}

/// Return the row-major element strides of an array with shape `array_shape`.
#[must_use]
pub fn array_strides(array_shape: &[u64]) -> Vec<u64> {
    let mut strides = vec![1; array_shape.len()];
    for dim in (0..array_shape.len().saturating_sub(1)).rev() {
        strides[dim] = strides[dim + 1] * array_shape[dim + 1];
    }
    strides
}
