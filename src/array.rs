//! Chunked arrays.
//!
//! Every field of a [`Dataset`](crate::dataset::Dataset) is a chunked N-dimensional array whose first dimension is the sample dimension.
//! This module holds the machinery shared by all fields:
//!  - [`chunk_grid`]: the regular chunk layout and the resolution of a selection to chunks,
//!  - [`codec`]: the codec chain which encodes and decodes chunks,
//!  - [`chunk_cache`]: caches of decoded chunks which deduplicate concurrent fetches,
//!  - [`IndexTransform`] and [`Selector`]: lazy, composable selections,
//!  - [`TensorView`]: a lazy view of a [`Field`] materialised with [`TensorView::compute`] into a [`Tensor`].
//!
//! ### Data Types
//! [`DataType`] covers booleans, signed and unsigned integers, floats and UTF-8 strings.
//! Fixed size elements are stored in native endianness in memory, and [`Element`]/[`ElementOwned`] convert them from and to Rust types.

mod array_bytes;
mod array_errors;
pub mod chunk_cache;
pub mod chunk_grid;
pub mod chunk_key_encoding;
pub mod codec;
mod data_type;
mod element;
mod field;
mod index_transform;
mod tensor;
mod tensor_view;

pub use self::{
    array_bytes::{ArrayBytes, RawBytes, RawBytesOffsets},
    array_errors::{
        ArrayError, ChunkErrorSource, FieldCreateError, InvalidIndexError, SchemaMismatchError,
    },
    chunk_cache::{ChunkCache, ChunkCacheLruChunkLimit, ChunkCacheLruSizeLimit},
    chunk_grid::RegularChunkGrid,
    chunk_key_encoding::ChunkKeyEncoding,
    codec::CodecChain,
    data_type::{DataType, DataTypeSize, UnsupportedDataTypeError},
    element::{Element, ElementOwned},
    field::Field,
    index_transform::{DimIndex, IndexTransform, Selector},
    tensor::Tensor,
    tensor_view::{TensorView, TensorViewIter},
};

/// An ND index to an element in an array.
pub type ArrayIndices = Vec<u64>;

/// The shape of an array.
pub type ArrayShape = Vec<u64>;
