//! A storage adapter which counts requests and bytes transferred.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::{
    byte_range::ByteRange,
    storage::{
        Bytes, MaybeBytes, ReadableStorageTraits, StorageError, StoreKey, StorePrefix,
        WritableStorageTraits,
    },
};

#[derive(Debug, Default)]
struct Counter {
    requests: AtomicUsize,
    bytes: AtomicUsize,
}

impl Counter {
    fn record(&self, requests: usize, bytes: usize) {
        self.requests.fetch_add(requests, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn requests(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    fn bytes(&self) -> usize {
        self.bytes.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.bytes.store(0, Ordering::Relaxed);
    }
}

/// A storage adapter which counts read and write requests and the bytes they transfer.
///
/// Tests use it to check how many backend requests an operation makes, e.g. that a cached chunk is fetched once.
/// Each requested byte range counts as one read, and a read of a missing key counts as a read of zero bytes.
#[derive(Debug)]
pub struct PerformanceMetricsStorageAdapter<TStorage: ?Sized> {
    storage: Arc<TStorage>,
    read: Counter,
    written: Counter,
}

impl<TStorage: ?Sized> PerformanceMetricsStorageAdapter<TStorage> {
    /// Create a new performance metrics storage adapter over `storage`.
    #[must_use]
    pub fn new(storage: Arc<TStorage>) -> Self {
        Self {
            storage,
            read: Counter::default(),
            written: Counter::default(),
        }
    }

    /// The number of bytes read.
    pub fn bytes_read(&self) -> usize {
        self.read.bytes()
    }

    /// The number of bytes written.
    pub fn bytes_written(&self) -> usize {
        self.written.bytes()
    }

    /// The number of read requests.
    pub fn reads(&self) -> usize {
        self.read.requests()
    }

    /// The number of write requests.
    pub fn writes(&self) -> usize {
        self.written.requests()
    }

    /// Zero every counter.
    pub fn reset(&self) {
        self.read.reset();
        self.written.reset();
    }
}

impl<TStorage: ?Sized + ReadableStorageTraits> ReadableStorageTraits
    for PerformanceMetricsStorageAdapter<TStorage>
{
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        let value = self.storage.get(key)?;
        self.read.record(1, value.as_ref().map_or(0, Bytes::len));
        Ok(value)
    }

    fn get_partial_values_key(
        &self,
        key: &StoreKey,
        byte_ranges: &[ByteRange],
    ) -> Result<Option<Vec<Bytes>>, StorageError> {
        let values = self.storage.get_partial_values_key(key, byte_ranges)?;
        let bytes = values
            .as_ref()
            .map_or(0, |values| values.iter().map(Bytes::len).sum());
        self.read.record(byte_ranges.len(), bytes);
        Ok(values)
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        self.storage.size_key(key)
    }

    fn exists(&self, key: &StoreKey) -> Result<bool, StorageError> {
        self.storage.exists(key)
    }
}

impl<TStorage: ?Sized + WritableStorageTraits> WritableStorageTraits
    for PerformanceMetricsStorageAdapter<TStorage>
{
    fn write(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        let len = value.len();
        self.storage.write(key, value)?;
        self.written.record(1, len);
        Ok(())
    }

    fn delete(&self, key: &StoreKey) -> Result<(), StorageError> {
        self.storage.delete(key)
    }

    fn delete_values(&self, keys: &[StoreKey]) -> Result<(), StorageError> {
        self.storage.delete_values(keys)
    }

    fn delete_prefix(&self, prefix: &StorePrefix) -> Result<(), StorageError> {
        self.storage.delete_prefix(prefix)
    }
}
