//! An async to sync storage adapter.
//!
//! The docs for the [`AsyncToSyncBlockOn`] trait include an example implementation for the `tokio` runtime.

use std::sync::Arc;

use crate::{
    byte_range::{ByteLength, ByteOffset, ByteRange},
    storage::{
        AsyncReadableStorageTraits, AsyncWritableStorageTraits, Bytes, MaybeBytes,
        ReadableStorageTraits, StorageError, StoreKey, StorePrefix, WritableStorageTraits,
    },
};

/// Trait for an asynchronous runtime implementing `block_on`.
///
/// ### Example `tokio` implementation of [`AsyncToSyncBlockOn`].
/// ```rust
/// # use chunkhub::storage::storage_adapter::async_to_sync::AsyncToSyncBlockOn;
/// struct TokioBlockOn(tokio::runtime::Handle);
///
/// impl AsyncToSyncBlockOn for TokioBlockOn {
///     fn block_on<F: core::future::Future>(&self, future: F) -> F::Output {
///         self.0.block_on(future)
///     }
/// }
/// ```
pub trait AsyncToSyncBlockOn: Send + Sync {
    /// Runs a future to completion.
    fn block_on<F: core::future::Future>(&self, future: F) -> F::Output;
}

/// An async to sync storage adapter.
///
/// This lets a [`Dataset`](crate::dataset::Dataset) read from an asynchronous store such as an
/// [`AsyncObjectStore`](crate::storage::store::AsyncObjectStore).
///
/// The [`AsyncToSyncBlockOn`] implementation must be compatible with the asynchonous store.
/// Incompatibility may result in runtime errors. For example:
/// > there is no reactor running, must be called from the context of a Tokio 1.x runtime
///
/// An [`AsyncToSyncStorageAdapter`] will panic if called within an asynchronous execution context!
pub struct AsyncToSyncStorageAdapter<TStorage: ?Sized, TBlockOn: AsyncToSyncBlockOn> {
    storage: Arc<TStorage>,
    block_on: TBlockOn,
}

impl<TStorage: ?Sized, TBlockOn: AsyncToSyncBlockOn> AsyncToSyncStorageAdapter<TStorage, TBlockOn> {
    /// Create a new async to sync storage adapter.
    #[must_use]
    pub fn new(storage: Arc<TStorage>, block_on: TBlockOn) -> Self {
        Self { storage, block_on }
    }

    fn block_on<F: core::future::Future>(&self, future: F) -> F::Output {
        self.block_on.block_on(future)
    }
}

impl<TStorage: ?Sized + AsyncReadableStorageTraits, TBlockOn: AsyncToSyncBlockOn>
    ReadableStorageTraits for AsyncToSyncStorageAdapter<TStorage, TBlockOn>
{
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        self.block_on(self.storage.get(key))
    }

    fn read_range(
        &self,
        key: &StoreKey,
        offset: ByteOffset,
        length: ByteLength,
    ) -> Result<MaybeBytes, StorageError> {
        self.block_on(self.storage.read_range(key, offset, length))
    }

    fn get_partial_values_key(
        &self,
        key: &StoreKey,
        byte_ranges: &[ByteRange],
    ) -> Result<Option<Vec<Bytes>>, StorageError> {
        self.block_on(self.storage.get_partial_values_key(key, byte_ranges))
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        self.block_on(self.storage.size_key(key))
    }
}

impl<TStorage: ?Sized + AsyncWritableStorageTraits, TBlockOn: AsyncToSyncBlockOn>
    WritableStorageTraits for AsyncToSyncStorageAdapter<TStorage, TBlockOn>
{
    fn write(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        self.block_on(self.storage.write(key, value))
    }

    fn delete(&self, key: &StoreKey) -> Result<(), StorageError> {
        self.block_on(self.storage.delete(key))
    }

    fn delete_prefix(&self, prefix: &StorePrefix) -> Result<(), StorageError> {
        self.block_on(self.storage.delete_prefix(prefix))
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::store::AsyncObjectStore;

    use super::*;

    struct TokioBlockOn(tokio::runtime::Runtime);

    impl AsyncToSyncBlockOn for TokioBlockOn {
        fn block_on<F: core::future::Future>(&self, future: F) -> F::Output {
            self.0.block_on(future)
        }
    }

    #[test]
    fn async_to_sync_object_store() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(AsyncObjectStore::new(object_store::memory::InMemory::new()));
        let block_on = TokioBlockOn(tokio::runtime::Runtime::new()?);
        let store = AsyncToSyncStorageAdapter::new(store, block_on);

        let key: StoreKey = "a/b".try_into()?;
        store.write(&key, Bytes::from_static(&[4, 5, 6]))?;
        assert_eq!(store.read_range(&key, 1, 2)?.unwrap().as_ref(), &[5, 6]);
        assert!(store.exists(&key)?);
        store.delete_prefix(&"a/".try_into()?)?;
        assert!(!store.exists(&key)?);
        Ok(())
    }
}
