use std::sync::atomic::{AtomicU64, Ordering};

use crate::storage::StoreKey;

/// An observer of dataset activity.
///
/// Every method has an empty default implementation, so an observer only implements the events it is interested in.
/// Observers are called synchronously from the thread doing the work and must not block.
pub trait DatasetObserver: Send + Sync {
    /// A chunk was fetched from storage.
    fn chunk_fetched(&self, _key: &StoreKey) {}

    /// A chunk was served from the chunk cache.
    fn cache_hit(&self, _key: &StoreKey) {}

    /// A chunk was encoded and written to storage.
    fn chunk_written(&self, _key: &StoreKey) {}

    /// A chunk became full along the sample dimension and will not be rewritten.
    fn chunk_sealed(&self, _key: &StoreKey) {}

    /// Samples were appended, and the dataset now has `length` samples.
    fn samples_appended(&self, _length: u64) {}
}

/// An observer which ignores all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl DatasetObserver for NoopObserver {}

/// An observer which counts events.
#[derive(Debug, Default)]
pub struct CountingObserver {
    chunks_fetched: AtomicU64,
    cache_hits: AtomicU64,
    chunks_written: AtomicU64,
    chunks_sealed: AtomicU64,
}

impl CountingObserver {
    /// Create a new counting observer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of chunks fetched from storage.
    #[must_use]
    pub fn chunks_fetched(&self) -> u64 {
        self.chunks_fetched.load(Ordering::Relaxed)
    }

    /// The number of chunks served from the cache.
    #[must_use]
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// The number of chunks written.
    #[must_use]
    pub fn chunks_written(&self) -> u64 {
        self.chunks_written.load(Ordering::Relaxed)
    }

    /// The number of chunks sealed.
    #[must_use]
    pub fn chunks_sealed(&self) -> u64 {
        self.chunks_sealed.load(Ordering::Relaxed)
    }
}

impl DatasetObserver for CountingObserver {
    fn chunk_fetched(&self, _key: &StoreKey) {
        self.chunks_fetched.fetch_add(1, Ordering::Relaxed);
    }

    fn cache_hit(&self, _key: &StoreKey) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    fn chunk_written(&self, _key: &StoreKey) {
        self.chunks_written.fetch_add(1, Ordering::Relaxed);
    }

    fn chunk_sealed(&self, _key: &StoreKey) {
        self.chunks_sealed.fetch_add(1, Ordering::Relaxed);
    }
}
