use std::sync::Arc;

use crate::{
    array::ArrayError,
    storage::StoreKey,
};

use super::{
    chunk_cache_lru::{ChunkCacheLru, LruCapacity},
    ChunkCache, ChunkFetchResult, DecodedChunk,
};

/// A chunk cache with a fixed chunk capacity.
pub struct ChunkCacheLruChunkLimit {
    cache: ChunkCacheLru,
}

impl ChunkCacheLruChunkLimit {
    /// Create a new [`ChunkCacheLruChunkLimit`] with a capacity in chunks of `chunk_capacity`.
    #[must_use]
    pub fn new(chunk_capacity: usize) -> Self {
        Self {
            cache: ChunkCacheLru::new(LruCapacity::Chunks(chunk_capacity)),
        }
    }
}

impl ChunkCache for ChunkCacheLruChunkLimit {
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
