use std::sync::Arc;

use crate::{
    array::ArrayError,
    config::global_config,
    storage::StoreKey,
};

use super::{
    chunk_cache_lru::{ChunkCacheLru, LruCapacity},
    ChunkCache, ChunkFetchResult, DecodedChunk,
};

/// A chunk cache with a fixed size capacity.
///
/// The size of a chunk is the size of its decoded bytes (and element offsets for variable length data).
pub struct ChunkCacheLruSizeLimit {
    cache: ChunkCacheLru,
}

impl ChunkCacheLruSizeLimit {
    /// Create a new [`ChunkCacheLruSizeLimit`] with a capacity in bytes of `capacity`.
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        let capacity = usize::try_from(capacity).unwrap_or(usize::MAX);
        Self {
            cache: ChunkCacheLru::new(LruCapacity::Bytes(capacity)),
        }
    }
}

impl Default for ChunkCacheLruSizeLimit {
    /// Create a [`ChunkCacheLruSizeLimit`] with the default cache capacity of the global [`Config`](crate::config::Config).
    fn default() -> Self {
        Self::new(global_config().default_cache_capacity())
    }
}

impl ChunkCache for ChunkCacheLruSizeLimit {
    fn get(&self, key: &StoreKey) -> Option<Arc<DecodedChunk>> {
        self.cache.get(key)
    }

    fn insert(&self, key: StoreKey, chunk: Arc<DecodedChunk>) {
        self.cache.insert(key, chunk);
    }

    fn get_or_fetch(
        &self,
        key: &StoreKey,
        fetch: &(dyn Fn() -> Result<DecodedChunk, ArrayError> + Sync),
    ) -> ChunkFetchResult {
        self.cache.get_or_fetch(key, fetch)
    }

    fn invalidate(&self, key: &StoreKey) {
        self.cache.invalidate(key);
    }

    fn len(&self) -> usize {
        self.cache.len()
    }

    fn size(&self) -> usize {
        self.cache.size()
    }
}
