use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use lru::LruCache;
use parking_lot::{Condvar, Mutex};

use crate::{
    array::ArrayError,
    storage::{StorageError, StoreKey},
};

use super::{ChunkFetchResult, DecodedChunk};

/// The capacity of a least recently used chunk cache.
#[derive(Clone, Copy, Debug)]
pub(super) enum LruCapacity {
    Chunks(usize),
    Bytes(usize),
}

#[derive(Default)]
struct InFlight {
    result: Mutex<Option<ChunkFetchResult>>,
    condvar: Condvar,
    invalidated: AtomicBool,
}

impl InFlight {
    fn wait(&self) -> ChunkFetchResult {
        let mut result = self.result.lock();
        loop {
            if let Some(result) = result.as_ref() {
                return result.clone();
            }
            self.condvar.wait(&mut result);
        }
    }

    fn complete(&self, result: ChunkFetchResult) {
        *self.result.lock() = Some(result);
        self.condvar.notify_all();
    }
}

struct LruState {
    entries: LruCache<StoreKey, Arc<DecodedChunk>>,
    in_flight: HashMap<StoreKey, Arc<InFlight>>,
    size: usize,
}

/// A least recently used chunk cache which deduplicates concurrent fetches.
pub(super) struct ChunkCacheLru {
    state: Mutex<LruState>,
    capacity: LruCapacity,
}

impl ChunkCacheLru {
    pub(super) fn new(capacity: LruCapacity) -> Self {
        Self {
            state: Mutex::new(LruState {
                entries: LruCache::unbounded(),
                in_flight: HashMap::new(),
                size: 0,
            }),
            capacity,
        }
    }

    pub(super) fn get(&self, key: &StoreKey) -> Option<Arc<DecodedChunk>> {
        self.state.lock().entries.get(key).cloned()
    }

    pub(super) fn insert(&self, key: StoreKey, chunk: Arc<DecodedChunk>) {
        let mut state = self.state.lock();
        self.insert_locked(&mut state, key, chunk);
    }

    fn insert_locked(&self, state: &mut LruState, key: StoreKey, chunk: Arc<DecodedChunk>) {
        state.size += chunk.size();
        if let Some(previous) = state.entries.put(key, chunk) {
            state.size -= previous.size();
        }
        self.evict(state);
    }

    fn over_capacity(&self, state: &LruState) -> bool {
        match self.capacity {
            LruCapacity::Chunks(chunks) => state.entries.len() > chunks,
            LruCapacity::Bytes(bytes) => state.size > bytes,
        }
    }

    /// Evict least recently used chunks until the cache is within capacity.
    ///
    /// Chunks still referenced outside of the cache are skipped.
    fn evict(&self, state: &mut LruState) {
        while self.over_capacity(state) {
            let Some(key) = state
                .entries
                .iter()
                .rev()
                .find(|(_, chunk)| Arc::strong_count(chunk) == 1)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            if let Some(chunk) = state.entries.pop(&key) {
                state.size -= chunk.size();
                tracing::debug!(key = key.as_str(), "evicted chunk");
            }
        }
    }

    pub(super) fn get_or_fetch(
        &self,
        key: &StoreKey,
        fetch: &(dyn Fn() -> Result<DecodedChunk, ArrayError> + Sync),
    ) -> ChunkFetchResult {
        let in_flight = {
            let mut state = self.state.lock();
            if let Some(chunk) = state.entries.get(key) {
                return Ok(chunk.clone());
            }
            if let Some(in_flight) = state.in_flight.get(key).cloned() {
                drop(state);
                tracing::debug!(key = key.as_str(), "waiting on in-flight chunk fetch");
                return in_flight.wait();
            }
            let in_flight = Arc::new(InFlight::default());
            state.in_flight.insert(key.clone(), in_flight.clone());
            in_flight
        };

        let mut guard = FetchGuard {
            cache: self,
            key,
            in_flight: &in_flight,
            completed: false,
        };
        let result = fetch().map(Arc::new).map_err(Arc::new);
        guard.complete(result)
    }

    fn finish(&self, key: &StoreKey, in_flight: &Arc<InFlight>, result: &ChunkFetchResult) {
        let mut state = self.state.lock();
        if state
            .in_flight
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, in_flight))
        {
            state.in_flight.remove(key);
        }
        if let Ok(chunk) = result {
            if !in_flight.invalidated.load(Ordering::Acquire) {
                self.insert_locked(&mut state, key.clone(), chunk.clone());
            }
        }
    }

    pub(super) fn invalidate(&self, key: &StoreKey) {
        let mut state = self.state.lock();
        if let Some(chunk) = state.entries.pop(key) {
            state.size -= chunk.size();
        }
        if let Some(in_flight) = state.in_flight.get(key) {
            in_flight.invalidated.store(true, Ordering::Release);
        }
    }

    pub(super) fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub(super) fn size(&self) -> usize {
        self.state.lock().size
    }
}

/// Completes an in-flight fetch, including when the fetch panics.
struct FetchGuard<'a> {
    cache: &'a ChunkCacheLru,
    key: &'a StoreKey,
    in_flight: &'a Arc<InFlight>,
    completed: bool,
}

impl FetchGuard<'_> {
    fn complete(&mut self, result: ChunkFetchResult) -> ChunkFetchResult {
        self.completed = true;
        self.cache.finish(self.key, self.in_flight, &result);
        self.in_flight.complete(result.clone());
        result
    }
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        if !self.completed {
            let result = Err(Arc::new(ArrayError::StorageError(StorageError::Other(
                format!("fetch of chunk {} panicked", self.key),
            ))));
            self.cache.finish(self.key, self.in_flight, &result);
            self.in_flight.complete(result);
        }
    }
}
