//! The chunk layout of a field.
//!
//! A field is divided into a regular grid of chunks.
//! The chunk with grid indices `[k, j, i]` covers elements `[k * c0, j * c1, i * c2]` up to (exclusive) the next grid line, clipped to the field bounds.
//!
//! [`chunk_coords_for`] resolves an [`IndexTransform`] to the chunks it intersects.
//! It is pure addressing math and performs no I/O.

use std::collections::BTreeMap;

use itertools::Itertools;
use thiserror::Error;

use crate::{
    array_subset::{array_strides, ArraySubset},
    byte_range::{coalesce_byte_ranges, ByteRange},
};

use super::{ArrayIndices, ArrayShape, IndexTransform, InvalidIndexError};

/// An invalid chunk shape.
#[derive(Clone, Debug, Error)]
#[error("invalid chunk shape {_0:?}, every dimension must be non-zero")]
pub struct InvalidChunkShapeError(ArrayShape);

/// A regular chunk grid.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RegularChunkGrid {
    chunk_shape: ArrayShape,
}

impl RegularChunkGrid {
    /// Create a new regular chunk grid with chunk shape `chunk_shape`.
    ///
    /// # Errors
    /// Returns [`InvalidChunkShapeError`] if any dimension of `chunk_shape` is zero.
    pub fn new(chunk_shape: ArrayShape) -> Result<Self, InvalidChunkShapeError> {
        if chunk_shape.iter().any(|&size| size == 0) {
            Err(InvalidChunkShapeError(chunk_shape))
        } else {
            Ok(Self { chunk_shape })
        }
    }

    /// Return the chunk shape.
    #[must_use]
    pub fn chunk_shape(&self) -> &[u64] {
        &self.chunk_shape
    }

    /// Return the dimensionality of the grid.
    #[must_use]
    pub fn dimensionality(&self) -> usize {
        self.chunk_shape.len()
    }

    /// Return the number of chunks along each dimension of an array with shape `array_shape`.
    #[must_use]
    pub fn grid_shape(&self, array_shape: &[u64]) -> ArrayShape {
        array_shape
            .iter()
            .zip(&self.chunk_shape)
            .map(|(&size, &chunk_size)| size.div_ceil(chunk_size))
            .collect()
    }

    /// Return the grid indices of the chunk holding the element at `array_indices`.
    #[must_use]
    pub fn chunk_indices(&self, array_indices: &[u64]) -> ArrayIndices {
        array_indices
            .iter()
            .zip(&self.chunk_shape)
            .map(|(&index, &chunk_size)| index / chunk_size)
            .collect()
    }

    /// Return the array indices of the first element of the chunk at `chunk_indices`.
    #[must_use]
    pub fn chunk_origin(&self, chunk_indices: &[u64]) -> ArrayIndices {
        chunk_indices
            .iter()
            .zip(&self.chunk_shape)
            .map(|(&index, &chunk_size)| index * chunk_size)
            .collect()
    }

    /// Return the subset of an array with shape `array_shape` covered by the chunk at `chunk_indices`.
    ///
    /// The subset is clipped to the array bounds.
    /// Returns [`None`] if the chunk lies outside of the array or the dimensionality does not match.
    #[must_use]
    pub fn chunk_subset(&self, chunk_indices: &[u64], array_shape: &[u64]) -> Option<ArraySubset> {
        if chunk_indices.len() != self.dimensionality() || array_shape.len() != self.dimensionality() {
            return None;
        }
        let origin = self.chunk_origin(chunk_indices);
        let shape = origin
            .iter()
            .zip(&self.chunk_shape)
            .zip(array_shape)
            .map(|((&start, &chunk_size), &size)| {
                (start < size).then(|| chunk_size.min(size - start))
            })
            .collect::<Option<Vec<_>>>()?;
        ArraySubset::new_with_start_shape(origin, shape).ok()
    }
}

/// The selected elements of one dimension of a chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkDimSelection {
    output_positions: Option<Vec<u64>>,
    local_indices: Vec<u64>,
}

impl ChunkDimSelection {
    /// The positions of the selected elements along the corresponding dimension of the view.
    ///
    /// [`None`] if the dimension was removed from the view by an integer index.
    #[must_use]
    pub fn output_positions(&self) -> Option<&[u64]> {
        self.output_positions.as_deref()
    }

    /// The indices of the selected elements within the chunk.
    #[must_use]
    pub fn local_indices(&self) -> &[u64] {
        &self.local_indices
    }
}

/// A contiguous run of elements shared by a chunk and a view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkRun {
    /// The linear index of the first element in the view.
    pub output_start: u64,
    /// The linear index of the first element in the chunk.
    pub local_start: u64,
    /// The number of elements.
    pub len: u64,
}

/// The part of a view held by one chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkSelection {
    chunk_indices: ArrayIndices,
    chunk_shape: ArrayShape,
    dims: Vec<ChunkDimSelection>,
    output_shape: ArrayShape,
}

impl ChunkSelection {
    /// The chunk grid indices.
    #[must_use]
    pub fn chunk_indices(&self) -> &[u64] {
        &self.chunk_indices
    }

    /// The shape of the chunk, clipped to the field bounds.
    #[must_use]
    pub fn chunk_shape(&self) -> &[u64] {
        &self.chunk_shape
    }

    /// The selected elements of each dimension of the chunk.
    #[must_use]
    pub fn dims(&self) -> &[ChunkDimSelection] {
        &self.dims
    }

    /// The shape of the view the selection belongs to.
    #[must_use]
    pub fn output_shape(&self) -> &[u64] {
        &self.output_shape
    }

    /// The number of selected elements.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.dims
            .iter()
            .map(|dim| dim.local_indices.len() as u64)
            .product()
    }

    /// Returns true if the selection visits every element of the chunk once in order.
    #[must_use]
    pub fn is_whole_chunk(&self) -> bool {
        self.dims.iter().zip(&self.chunk_shape).all(|(dim, &size)| {
            dim.local_indices.len() as u64 == size
                && dim.local_indices.iter().zip(0..).all(|(&local, i)| local == i)
        })
    }

    /// Return the runs of elements which are contiguous in both the chunk and the view.
    ///
    /// Runs are ordered by their position in the view.
    /// Local indices are linearised in row-major order, so they do not depend on how many samples the chunk holds.
    #[must_use]
    pub fn runs(&self) -> Vec<ChunkRun> {
        let local_strides = array_strides(&self.chunk_shape);
        let output_strides = array_strides(&self.output_shape);

        let mut output_dim = 0;
        let per_dim = self
            .dims
            .iter()
            .zip(&local_strides)
            .map(|(dim, &local_stride)| {
                let output_stride = if dim.output_positions.is_some() {
                    output_dim += 1;
                    output_strides[output_dim - 1]
                } else {
                    0
                };
                dim.local_indices
                    .iter()
                    .enumerate()
                    .map(|(i, &local)| {
                        let output = dim
                            .output_positions
                            .as_ref()
                            .map_or(0, |positions| positions[i]);
                        (output * output_stride, local * local_stride)
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        let mut runs: Vec<ChunkRun> = Vec::new();
        for offsets in per_dim.into_iter().multi_cartesian_product() {
            let (output, local) = offsets
                .into_iter()
                .fold((0, 0), |(output, local), (o, l)| (output + o, local + l));
            if let Some(last) = runs.last_mut() {
                if last.output_start + last.len == output && last.local_start + last.len == local {
                    last.len += 1;
                    continue;
                }
            }
            runs.push(ChunkRun {
                output_start: output,
                local_start: local,
                len: 1,
            });
        }
        runs
    }

    /// Return the byte ranges of the selected elements of a fixed size data type with `element_size` bytes.
    ///
    /// The ranges are in view order, and adjacent ranges are merged.
    /// The concatenation of the ranges holds the elements of [`runs`](ChunkSelection::runs) in order.
    #[must_use]
    pub fn byte_ranges(&self, element_size: usize) -> Vec<ByteRange> {
        let element_size = element_size as u64;
        let byte_ranges = self
            .runs()
            .iter()
            .map(|run| ByteRange::new(run.local_start * element_size, run.len * element_size))
            .collect::<Vec<_>>();
        coalesce_byte_ranges(&byte_ranges)
            .into_iter()
            .map(|(byte_range, _)| byte_range)
            .collect()
    }
}

/// Return every chunk intersecting `transform`, and the part of the view each chunk holds.
///
/// `field_shape` is the current shape of the field and `chunk_shape` the shape of its regular chunk grid.
/// Chunks are returned in row-major order of their grid indices.
/// The reported chunk shapes are clipped to `field_shape`.
///
/// # Errors
/// Returns an [`InvalidIndexError`] if the dimensionality of `transform` or `chunk_shape` does not match `field_shape`,
/// or a selected index is out of bounds.
pub fn chunk_coords_for(
    field_shape: &[u64],
    chunk_shape: &[u64],
    transform: &IndexTransform,
) -> Result<Vec<ChunkSelection>, InvalidIndexError> {
    if chunk_shape.len() != field_shape.len() || chunk_shape.iter().any(|&size| size == 0) {
        return Err(InvalidIndexError::new(format!(
            "chunk shape {chunk_shape:?} is incompatible with field shape {field_shape:?}"
        )));
    }
    transform.validate_bounds(field_shape)?;

    // per dimension, chunk index -> (output position, local index) pairs
    let per_dim = transform
        .dims()
        .iter()
        .zip(chunk_shape)
        .map(|(dim, &chunk_size)| {
            let in_output = dim.len().is_some();
            let mut chunks: BTreeMap<u64, ChunkDimSelection> = BTreeMap::new();
            for (position, source) in dim.source_indices().enumerate() {
                let entry = chunks
                    .entry(source / chunk_size)
                    .or_insert_with(|| ChunkDimSelection {
                        output_positions: in_output.then(Vec::new),
                        local_indices: Vec::new(),
                    });
                if let Some(positions) = entry.output_positions.as_mut() {
                    positions.push(position as u64);
                }
                entry.local_indices.push(source % chunk_size);
            }
            chunks.into_iter().collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let output_shape = transform.shape();
    let selections = per_dim
        .into_iter()
        .multi_cartesian_product()
        .map(|dims| {
            let (chunk_indices, dims): (Vec<u64>, Vec<ChunkDimSelection>) = dims.into_iter().unzip();
            let chunk_shape = chunk_indices
                .iter()
                .zip(chunk_shape)
                .zip(field_shape)
                .map(|((&index, &chunk_size), &size)| chunk_size.min(size - index * chunk_size))
                .collect();
            ChunkSelection {
                chunk_indices,
                chunk_shape,
                dims,
                output_shape: output_shape.clone(),
            }
        })
        .collect::<Vec<_>>();
    tracing::trace!(
        chunks = selections.len(),
        elements = transform.num_elements(),
        "resolved selection to chunks"
    );
    Ok(selections)
}
