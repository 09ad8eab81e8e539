//! Index transforms.
//!
//! An [`IndexTransform`] maps the coordinates of a view onto the coordinates of the field it views.
//! Transforms are immutable values. Slicing a view composes its transform with the transform of the selection,
//! so `view.slice(a).slice(b)` and `view.slice_transform(&a.compose(&b))` are the same view.

use std::sync::Arc;

use itertools::Itertools;

use super::{ArrayShape, InvalidIndexError};

/// A selection over one dimension of a view.
///
/// Selections follow NumPy semantics:
///  - an [`Index`](Selector::Index) removes the dimension,
///  - a [`Range`](Selector::Range) keeps the dimension, clamping its bounds to the dimension length,
///  - a [`List`](Selector::List) keeps the dimension and gathers the listed indices in order.
///
/// Negative indices and bounds count from the end of the dimension.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Selector {
    /// A single index.
    Index(i64),
    /// A range `start..stop` with a positive step.
    Range {
        /// The start of the range. Defaults to the start of the dimension.
        start: Option<i64>,
        /// The end (exclusive) of the range. Defaults to the end of the dimension.
        stop: Option<i64>,
        /// The step. Must be positive.
        step: i64,
    },
    /// A list of indices.
    List(Vec<i64>),
}

impl Selector {
    /// Select a single index.
    #[must_use]
    pub const fn index(index: i64) -> Self {
        Self::Index(index)
    }

    /// Select the range `start..stop`.
    #[must_use]
    pub const fn range(start: i64, stop: i64) -> Self {
        Self::Range {
            start: Some(start),
            stop: Some(stop),
            step: 1,
        }
    }

    /// Select every `step`th index in the range `start..stop`.
    #[must_use]
    pub const fn range_step(start: i64, stop: i64, step: i64) -> Self {
        Self::Range {
            start: Some(start),
            stop: Some(stop),
            step,
        }
    }

    /// Select from `start` to the end of the dimension.
    #[must_use]
    pub const fn range_from(start: i64) -> Self {
        Self::Range {
            start: Some(start),
            stop: None,
            step: 1,
        }
    }

    /// Select the whole dimension.
    #[must_use]
    pub const fn full() -> Self {
        Self::Range {
            start: None,
            stop: None,
            step: 1,
        }
    }

    /// Select a list of indices.
    #[must_use]
    pub fn list(indices: impl Into<Vec<i64>>) -> Self {
        Self::List(indices.into())
    }
}

impl From<i64> for Selector {
    fn from(index: i64) -> Self {
        Self::Index(index)
    }
}

impl From<std::ops::Range<i64>> for Selector {
    fn from(range: std::ops::Range<i64>) -> Self {
        Self::range(range.start, range.end)
    }
}

impl From<std::ops::RangeFrom<i64>> for Selector {
    fn from(range: std::ops::RangeFrom<i64>) -> Self {
        Self::range_from(range.start)
    }
}

impl From<std::ops::RangeTo<i64>> for Selector {
    fn from(range: std::ops::RangeTo<i64>) -> Self {
        Self::Range {
            start: None,
            stop: Some(range.end),
            step: 1,
        }
    }
}

impl From<std::ops::RangeFull> for Selector {
    fn from(_: std::ops::RangeFull) -> Self {
        Self::full()
    }
}

impl From<Vec<i64>> for Selector {
    fn from(indices: Vec<i64>) -> Self {
        Self::List(indices)
    }
}

/// The selected source indices of one source dimension.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DimIndex {
    /// A single source index. The dimension does not appear in the view.
    Fixed(u64),
    /// `len` source indices `start, start + step, …`.
    Strided {
        /// The first source index.
        start: u64,
        /// The step between source indices.
        step: u64,
        /// The number of source indices.
        len: u64,
    },
    /// Arbitrary source indices.
    List(Arc<[u64]>),
}

impl DimIndex {
    const fn identity(len: u64) -> Self {
        Self::Strided {
            start: 0,
            step: 1,
            len,
        }
    }

    /// The number of view indices, or [`None`] for a [`Fixed`](DimIndex::Fixed) dimension.
    #[must_use]
    pub fn len(&self) -> Option<u64> {
        match self {
            Self::Fixed(_) => None,
            Self::Strided { len, .. } => Some(*len),
            Self::List(indices) => Some(indices.len() as u64),
        }
    }

    /// Map view index `index` to a source index.
    ///
    /// `index` must be less than [`len`](DimIndex::len).
    #[must_use]
    pub fn source_index(&self, index: u64) -> u64 {
        match self {
            Self::Fixed(source) => *source,
            Self::Strided { start, step, .. } => start + index * step,
            Self::List(indices) => indices[index as usize],
        }
    }

    /// Iterate over the source indices in view order.
    pub fn source_indices(&self) -> impl Iterator<Item = u64> + '_ {
        let len = self.len().unwrap_or(1);
        (0..len).map(move |index| self.source_index(index))
    }

    /// The largest source index, or [`None`] if no index is selected.
    #[must_use]
    pub fn max_source_index(&self) -> Option<u64> {
        match self {
            Self::Fixed(source) => Some(*source),
            Self::Strided { start, step, len } => len.checked_sub(1).map(|last| start + last * step),
            Self::List(indices) => indices.iter().max().copied(),
        }
    }

    /// Select `inner` from the view indices of this dimension.
    fn compose(&self, inner: &Self) -> Self {
        match (self, inner) {
            (Self::Fixed(_), _) => self.clone(),
            (_, Self::Fixed(index)) => Self::Fixed(self.source_index(*index)),
            (
                Self::Strided { start, step, .. },
                Self::Strided {
                    start: inner_start,
                    step: inner_step,
                    len,
                },
            ) => Self::Strided {
                start: start + inner_start * step,
                step: if *len > 1 { step * inner_step } else { 1 },
                len: *len,
            },
            (_, inner) => Self::List(inner.source_indices().map(|index| self.source_index(index)).collect()),
        }
    }
}

fn resolve_index(index: i64, len: u64) -> Option<u64> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    (0..len).contains(&index).then_some(index as u64)
}

fn resolve_selector(selector: &Selector, len: u64, dim: usize) -> Result<DimIndex, InvalidIndexError> {
    let out_of_bounds =
        |index: i64| InvalidIndexError::new(format!("index {index} is out of bounds for dimension {dim} with length {len}"));
    match selector {
        Selector::Index(index) => resolve_index(*index, len)
            .map(DimIndex::Fixed)
            .ok_or_else(|| out_of_bounds(*index)),
        Selector::Range { start, stop, step } => {
            if *step <= 0 {
                return Err(InvalidIndexError::new(format!(
                    "step {step} for dimension {dim} must be positive"
                )));
            }
            let len_i = i64::try_from(len)
                .map_err(|_| InvalidIndexError::new(format!("dimension {dim} is too long")))?;
            let clamp = |bound: i64| {
                if bound < 0 {
                    (bound + len_i).max(0)
                } else {
                    bound.min(len_i)
                }
            };
            let start = start.map_or(0, clamp);
            let stop = stop.map_or(len_i, clamp);
            let count = if stop > start {
                (stop - start - 1) / step + 1
            } else {
                0
            };
            Ok(DimIndex::Strided {
                start: start as u64,
                step: if count > 1 { *step as u64 } else { 1 },
                len: count as u64,
            })
        }
        Selector::List(indices) => indices
            .iter()
            .map(|&index| resolve_index(index, len).ok_or_else(|| out_of_bounds(index)))
            .collect::<Result<Arc<[u64]>, _>>()
            .map(DimIndex::List),
    }
}

/// An index transform from the coordinates of a view to the coordinates of a source array.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IndexTransform {
    source_shape: ArrayShape,
    dims: Vec<DimIndex>,
}

impl IndexTransform {
    /// Create the identity transform of an array with shape `source_shape`.
    #[must_use]
    pub fn identity(source_shape: ArrayShape) -> Self {
        let dims = source_shape.iter().copied().map(DimIndex::identity).collect();
        Self { source_shape, dims }
    }

    /// Create the transform selecting `selectors` from an array with shape `source_shape`.
    ///
    /// Missing trailing selectors select the whole dimension.
    ///
    /// # Errors
    /// Returns an [`InvalidIndexError`] if there are more selectors than dimensions, an index is out of bounds, or a step is not positive.
    pub fn from_selectors(
        source_shape: ArrayShape,
        selectors: &[Selector],
    ) -> Result<Self, InvalidIndexError> {
        if selectors.len() > source_shape.len() {
            return Err(InvalidIndexError::new(format!(
                "{} selectors for an array with {} dimensions",
                selectors.len(),
                source_shape.len()
            )));
        }
        let full = Selector::full();
        let dims = source_shape
            .iter()
            .enumerate()
            .map(|(dim, &len)| resolve_selector(selectors.get(dim).unwrap_or(&full), len, dim))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { source_shape, dims })
    }

    /// The shape of the source array.
    #[must_use]
    pub fn source_shape(&self) -> &[u64] {
        &self.source_shape
    }

    /// The selected source indices of each source dimension.
    #[must_use]
    pub fn dims(&self) -> &[DimIndex] {
        &self.dims
    }

    /// The shape of the view.
    #[must_use]
    pub fn shape(&self) -> ArrayShape {
        self.dims.iter().filter_map(DimIndex::len).collect()
    }

    /// The number of elements in the view.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape().iter().product()
    }

    /// Compose this transform with `other`, a transform over the view of this transform.
    ///
    /// The result maps the view of `other` directly to the source of this transform.
    ///
    /// # Errors
    /// Returns an [`InvalidIndexError`] if the source shape of `other` is not the shape of this view.
    pub fn compose(&self, other: &Self) -> Result<Self, InvalidIndexError> {
        let shape = self.shape();
        if other.source_shape != shape {
            return Err(InvalidIndexError::new(format!(
                "a selection over shape {:?} cannot be applied to a view with shape {shape:?}",
                other.source_shape
            )));
        }
        let mut inner = other.dims.iter();
        let dims = self
            .dims
            .iter()
            .map(|dim| match dim {
                DimIndex::Fixed(_) => dim.clone(),
                _ => inner.next().map_or_else(|| dim.clone(), |inner| dim.compose(inner)),
            })
            .collect();
        Ok(Self {
            source_shape: self.source_shape.clone(),
            dims,
        })
    }

    /// Apply `selectors` to the view of this transform.
    ///
    /// # Errors
    /// Returns an [`InvalidIndexError`] if the selectors are invalid for the view.
    pub fn slice(&self, selectors: &[Selector]) -> Result<Self, InvalidIndexError> {
        self.compose(&Self::from_selectors(self.shape(), selectors)?)
    }

    /// Check that every selected source index is within `array_shape`.
    ///
    /// # Errors
    /// Returns an [`InvalidIndexError`] if the dimensionality differs or an index is out of bounds.
    pub fn validate_bounds(&self, array_shape: &[u64]) -> Result<(), InvalidIndexError> {
        if array_shape.len() != self.dims.len() {
            return Err(InvalidIndexError::new(format!(
                "a selection with {} dimensions cannot be applied to an array with shape {array_shape:?}",
                self.dims.len()
            )));
        }
        for (dim, (index, &len)) in self.dims.iter().zip(array_shape).enumerate() {
            if let Some(max) = index.max_source_index() {
                if max >= len {
                    return Err(InvalidIndexError::new(format!(
                        "index {max} is out of bounds for dimension {dim} with length {len}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Iterate over the source indices of every element of the view in row-major order.
    pub fn iter_source_indices(&self) -> impl Iterator<Item = Vec<u64>> + '_ {
        self.dims
            .iter()
            .map(|dim| dim.source_indices().collect::<Vec<_>>())
            .multi_cartesian_product()
    }
}
