//! Caches of decoded chunks.
//!
//! A [`ChunkCache`] holds decoded chunks keyed by their store key and is shared by every view of a dataset.
//! [`ChunkCache::get_or_fetch`] runs at most one fetch per key at a time.
//! Concurrent callers for a missing chunk block on the single in-flight fetch and share its result.
//!
//! Two least recently used caches are provided:
//!  - [`ChunkCacheLruChunkLimit`]: bounded by the number of chunks, and
//!  - [`ChunkCacheLruSizeLimit`]: bounded by the decoded size of the chunks in bytes.
//!
//! A cached chunk which has been handed out and is still referenced is never evicted.
//! Failed fetches never populate a cache.

mod chunk_cache_lru;
mod chunk_cache_lru_chunk_limit;
mod chunk_cache_lru_size_limit;

use std::sync::Arc;

pub use chunk_cache_lru_chunk_limit::ChunkCacheLruChunkLimit;
pub use chunk_cache_lru_size_limit::ChunkCacheLruSizeLimit;

use crate::storage::StoreKey;

use super::{
    codec::{ChunkRepresentation, CodecError, CorruptChunkError},
    ArrayBytes, ArrayShape, DataTypeSize,
};

/// A decoded chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodedChunk {
    shape: ArrayShape,
    bytes: ArrayBytes<'static>,
}

impl DecodedChunk {
    /// Create a decoded chunk from the output of a codec chain.
    ///
    /// The number of samples is determined by `bytes`.
    /// It may exceed the number of samples in `representation`, for example if the chunk was extended after the view was created.
    ///
    /// # Errors
    /// Returns a [`CodecError::CorruptChunk`] if `bytes` holds fewer samples than `representation` or a partial sample.
    pub fn new(
        bytes: ArrayBytes<'static>,
        representation: &ChunkRepresentation,
    ) -> Result<Self, CodecError> {
        let elements_per_sample = representation.num_elements_per_sample();
        let num_elements = match (&bytes, representation.data_type().size()) {
            (ArrayBytes::Fixed(bytes), DataTypeSize::Fixed(size)) if size > 0 => {
                (bytes.len() / size) as u64
            }
            (ArrayBytes::Fixed(_), DataTypeSize::Fixed(_)) => 0,
            (ArrayBytes::Variable(_, offsets), DataTypeSize::Variable) => {
                offsets.len().saturating_sub(1) as u64
            }
            (ArrayBytes::Fixed(_), DataTypeSize::Variable) => {
                return Err(CodecError::ExpectedVariableLengthBytes)
            }
            (ArrayBytes::Variable(_, _), DataTypeSize::Fixed(_)) => {
                return Err(CodecError::ExpectedFixedLengthBytes)
            }
        };
        let num_samples = if elements_per_sample == 0 {
            representation.num_samples()
        } else if num_elements % elements_per_sample == 0 {
            num_elements / elements_per_sample
        } else {
            return Err(CorruptChunkError::new(format!(
                "{num_elements} elements is not a whole number of samples with {elements_per_sample} elements"
            ))
            .into());
        };
        if num_samples < representation.num_samples() {
            return Err(CorruptChunkError::new(format!(
                "expected at least {} samples, got {num_samples}",
                representation.num_samples()
            ))
            .into());
        }
        if let DataTypeSize::Fixed(size) = representation.data_type().size() {
            if let ArrayBytes::Fixed(raw) = &bytes {
                if raw.len() as u64 != num_elements * size as u64 {
                    return Err(CorruptChunkError::new("partial element").into());
                }
            }
        }
        let shape = std::iter::once(num_samples)
            .chain(representation.sample_shape().iter().copied())
            .collect();
        Ok(Self { shape, bytes })
    }

    /// The shape of the chunk.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// The number of samples in the chunk.
    #[must_use]
    pub fn num_samples(&self) -> u64 {
        self.shape[0]
    }

    /// The decoded bytes.
    #[must_use]
    pub fn bytes(&self) -> &ArrayBytes<'static> {
        &self.bytes
    }

    /// The approximate memory held by the chunk.
    #[must_use]
    pub fn size(&self) -> usize {
        self.bytes.memory_size()
    }
}

/// The result of fetching a chunk, shared by every caller waiting on the fetch.
pub type ChunkFetchResult = Result<Arc<DecodedChunk>, Arc<super::ArrayError>>;

/// Traits for a chunk cache.
pub trait ChunkCache: Send + Sync {
    /// Retrieve a chunk from the cache. Returns [`None`] if the chunk is not present.
    ///
    /// Retrieval marks the chunk as recently used.
    fn get(&self, key: &StoreKey) -> Option<Arc<DecodedChunk>>;

    /// Insert a chunk into the cache, replacing any existing chunk with the same key.
    fn insert(&self, key: StoreKey, chunk: Arc<DecodedChunk>);

    /// Get a chunk from the cache, or fetch it with `fetch` and insert it.
    ///
    /// If another caller is already fetching `key`, this blocks until that fetch completes and returns its result.
    /// A failed fetch is returned to every waiting caller and is not cached.
    ///
    /// # Errors
    /// Returns the error of the fetch.
    fn get_or_fetch(
        &self,
        key: &StoreKey,
        fetch: &(dyn Fn() -> Result<DecodedChunk, super::ArrayError> + Sync),
    ) -> ChunkFetchResult;

    /// Remove a chunk from the cache.
    ///
    /// An in-flight fetch of `key` still completes for its callers, but its result is not cached.
    fn invalidate(&self, key: &StoreKey);

    /// Return the number of chunks in the cache.
    #[must_use]
    fn len(&self) -> usize;

    /// Return the approximate memory held by the chunks in the cache.
    #[must_use]
    fn size(&self) -> usize;

    /// Returns true if the cache is empty.
    #[must_use]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use crate::array::DataType;

    use super::*;

    #[test]
    fn decoded_chunk_samples() {
        let representation = ChunkRepresentation::new(vec![2, 3], DataType::UInt16);
        let chunk = DecodedChunk::new(ArrayBytes::new_flen(vec![0u8; 12]), &representation).unwrap();
        assert_eq!(chunk.shape(), &[2, 3]);
        let chunk = DecodedChunk::new(ArrayBytes::new_flen(vec![0u8; 18]), &representation).unwrap();
        assert_eq!(chunk.num_samples(), 3);
        assert!(DecodedChunk::new(ArrayBytes::new_flen(vec![0u8; 6]), &representation).is_err());
        assert!(DecodedChunk::new(ArrayBytes::new_flen(vec![0u8; 14]), &representation).is_err());
        assert!(DecodedChunk::new(ArrayBytes::new_flen(vec![0u8; 13]), &representation).is_err());

        let representation = ChunkRepresentation::new(vec![2], DataType::String);
        let bytes = ArrayBytes::from_elements([b"ab".as_slice(), b"c".as_slice()]);
        let chunk = DecodedChunk::new(bytes, &representation).unwrap();
        assert_eq!(chunk.shape(), &[2]);
        assert!(DecodedChunk::new(ArrayBytes::new_flen(vec![0u8; 2]), &representation).is_err());
    }
}
