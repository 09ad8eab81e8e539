use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use object_store::path::Path;

use crate::{
    byte_range::ByteRange,
    storage::{
        storage_adapter::{
            AsyncToSyncBlockOn, AsyncToSyncStorageAdapter, RetryPolicy, RetryStorageAdapter,
        },
        AsyncReadableStorageTraits, AsyncWritableStorageTraits, Bytes, MaybeBytes, StorageError,
        StoreKey, StorePrefix,
    },
};

impl From<object_store::Error> for StorageError {
    fn from(err: object_store::Error) -> Self {
        match err {
            // Request failures surface as generic errors once the object store's own retries are exhausted
            object_store::Error::Generic { .. } => Self::Transient(err.to_string()),
            err => Self::Other(err.to_string()),
        }
    }
}

/// Maps a [`StoreKey`] to an [`object_store`] path.
fn key_to_path(key: &StoreKey) -> Path {
    Path::from(key.as_str())
}

/// Map [`object_store::Error::NotFound`] to None, pass through other errors
fn handle_result<T>(result: Result<T, object_store::Error>) -> Result<Option<T>, StorageError> {
    match result {
        Ok(result) => Ok(Some(result)),
        Err(object_store::Error::NotFound { .. }) => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// An asynchronous store backed by an [`object_store::ObjectStore`].
///
/// This covers Amazon S3, Google Cloud Storage, Azure Blob Storage, HTTP and local stores through the [`object_store`] crate.
/// Byte ranges are fetched with [`get_ranges`](object_store::ObjectStore::get_ranges), so reading a chunk range never downloads the whole object.
pub struct AsyncObjectStore<T> {
    object_store: T,
}

impl<T: object_store::ObjectStore> AsyncObjectStore<T> {
    /// Create a new [`AsyncObjectStore`].
    ///
    /// Requests are retried only as configured on `object_store` itself (e.g. the `RetryConfig` of its builder).
    /// Use [`AsyncObjectStore::into_sync_with_retry`] to also retry transient failures with a [`RetryPolicy`].
    #[must_use]
    pub fn new(object_store: T) -> Self {
        Self { object_store }
    }

    /// Convert into a synchronous store which retries transient failures with `policy`.
    ///
    /// Futures are run to completion with `block_on`, see [`AsyncToSyncStorageAdapter`].
    #[must_use]
    pub fn into_sync_with_retry<TBlockOn: AsyncToSyncBlockOn>(
        self,
        block_on: TBlockOn,
        policy: RetryPolicy,
    ) -> RetryStorageAdapter<AsyncToSyncStorageAdapter<Self, TBlockOn>> {
        RetryStorageAdapter::new_with_policy(
            Arc::new(AsyncToSyncStorageAdapter::new(Arc::new(self), block_on)),
            policy,
        )
    }
}

#[async_trait::async_trait]
impl<T: object_store::ObjectStore> AsyncReadableStorageTraits for AsyncObjectStore<T> {
    async fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        let get = handle_result(self.object_store.get(&key_to_path(key)).await)?;
        if let Some(get) = get {
            Ok(Some(get.bytes().await?))
        } else {
            Ok(None)
        }
    }

    async fn get_partial_values_key(
        &self,
        key: &StoreKey,
        byte_ranges: &[ByteRange],
    ) -> Result<Option<Vec<Bytes>>, StorageError> {
        // The object size is only needed for ranges which read to the end
        let size = if byte_ranges
            .iter()
            .all(|byte_range| byte_range.explicit_length().is_some())
        {
            u64::MAX
        } else {
            let Some(size) = self.size_key(key).await? else {
                return Ok(None);
            };
            size
        };
        let ranges = byte_ranges
            .iter()
            .map(|byte_range| byte_range.to_range_usize(size))
            .collect::<Result<Vec<_>, _>>()?;
        let Some(get_ranges) =
            handle_result(self.object_store.get_ranges(&key_to_path(key), &ranges).await)?
        else {
            return Ok(None);
        };
        std::iter::zip(ranges, get_ranges)
            .map(|(range, bytes)| {
                if range.len() == bytes.len() {
                    Ok(bytes)
                } else {
                    Err(StorageError::Other(format!(
                        "unexpected length of bytes returned for {key}, expected {}, got {}",
                        range.len(),
                        bytes.len()
                    )))
                }
            })
            .collect::<Result<Vec<_>, StorageError>>()
            .map(Some)
    }

    async fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        Ok(
            handle_result(self.object_store.head(&key_to_path(key)).await)?
                .map(|meta| meta.size as u64),
        )
    }
}

#[async_trait::async_trait]
impl<T: object_store::ObjectStore> AsyncWritableStorageTraits for AsyncObjectStore<T> {
    async fn write(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        self.object_store
            .put(&key_to_path(key), value.into())
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &StoreKey) -> Result<(), StorageError> {
        handle_result(self.object_store.delete(&key_to_path(key)).await)?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &StorePrefix) -> Result<(), StorageError> {
        let prefix: Path = prefix.as_str().into();
        let locations = self
            .object_store
            .list(Some(&prefix))
            .map_ok(|m| m.location)
            .boxed();
        self.object_store
            .delete_stream(locations)
            .try_collect::<Vec<Path>>()
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ReadableStorageTraits, WritableStorageTraits};
    use std::{error::Error, time::Duration};

    struct TokioBlockOn(tokio::runtime::Runtime);

    impl AsyncToSyncBlockOn for TokioBlockOn {
        fn block_on<F: core::future::Future>(&self, future: F) -> F::Output {
            self.0.block_on(future)
        }
    }

    #[test]
    fn object_store_sync_with_retry() -> Result<(), Box<dyn Error>> {
        let policy = RetryPolicy::new(3, Duration::ZERO, Duration::ZERO);
        let store = AsyncObjectStore::new(object_store::memory::InMemory::new())
            .into_sync_with_retry(TokioBlockOn(tokio::runtime::Runtime::new()?), policy);
        assert_eq!(store.policy(), &policy);

        let key: StoreKey = "a/b".try_into()?;
        assert!(store.get(&key)?.is_none());
        store.write(&key, Bytes::from_static(&[0, 1, 2]))?;
        assert_eq!(store.get(&key)?.unwrap().as_ref(), &[0, 1, 2]);
        Ok(())
    }

    #[tokio::test]
    async fn object_store_memory() -> Result<(), Box<dyn Error>> {
        let store = AsyncObjectStore::new(object_store::memory::InMemory::new());
        let key: StoreKey = "a/b".try_into()?;
        assert!(store.get(&key).await?.is_none());
        assert!(store.read_range(&key, 0, 1).await?.is_none());

        store.write(&key, Bytes::from_static(&[0, 1, 2, 3])).await?;
        assert_eq!(store.get(&key).await?.unwrap().as_ref(), &[0, 1, 2, 3]);
        assert_eq!(store.read_range(&key, 1, 2).await?.unwrap().as_ref(), &[1, 2]);
        assert_eq!(
            store
                .get_partial_values_key(&key, &[ByteRange::from_offset(3)])
                .await?
                .unwrap(),
            vec![Bytes::from_static(&[3])]
        );
        assert_eq!(store.size_key(&key).await?, Some(4));

        store.write(&"a/c".try_into()?, Bytes::new()).await?;
        store.delete(&key).await?;
        assert!(!store.exists(&key).await?);
        store.delete_prefix(&"a/".try_into()?).await?;
        assert!(!store.exists(&"a/c".try_into()?).await?);
        Ok(())
    }
}
