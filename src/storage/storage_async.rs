use crate::byte_range::{ByteLength, ByteOffset, ByteRange};

use super::{Bytes, MaybeBytes, StorageError, StoreKey, StorePrefix};

/// Async readable storage traits.
#[async_trait::async_trait]
pub trait AsyncReadableStorageTraits: Send + Sync {
    /// Retrieve the value (bytes) associated with a given [`StoreKey`].
    ///
    /// Returns [`None`] if the key is not found.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    async fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        Ok(self
            .get_partial_values_key(key, &[ByteRange::from_offset(0)])
            .await?
            .and_then(|mut values| values.pop()))
    }

    /// Retrieve `length` bytes starting at `offset` of the value at `key`.
    ///
    /// Returns [`None`] if the key is not found.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    async fn read_range(
        &self,
        key: &StoreKey,
        offset: ByteOffset,
        length: ByteLength,
    ) -> Result<MaybeBytes, StorageError> {
        Ok(self
            .get_partial_values_key(key, &[ByteRange::new(offset, length)])
            .await?
            .and_then(|mut values| values.pop()))
    }

    /// Retrieve partial bytes from a list of byte ranges for a store key.
    ///
    /// Returns [`None`] if the key is not found.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    async fn get_partial_values_key(
        &self,
        key: &StoreKey,
        byte_ranges: &[ByteRange],
    ) -> Result<Option<Vec<Bytes>>, StorageError>;

    /// Return the size in bytes of the value at `key`.
    ///
    /// Returns [`None`] if the key is not found.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    async fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError>;

    /// Returns true if a value exists at `key`.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    async fn exists(&self, key: &StoreKey) -> Result<bool, StorageError> {
        Ok(self.size_key(key).await?.is_some())
    }
}

/// Async writable storage traits.
#[async_trait::async_trait]
pub trait AsyncWritableStorageTraits: Send + Sync {
    /// Store bytes at a [`StoreKey`], replacing any existing value.
    ///
    /// # Errors
    /// Returns a [`StorageError`] on failure to store.
    async fn write(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError>;

    /// Delete a [`StoreKey`]. Deleting a missing key succeeds.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if there is an underlying storage error.
    async fn delete(&self, key: &StoreKey) -> Result<(), StorageError>;

    /// Delete all [`StoreKey`] under [`StorePrefix`].
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the delete fails.
    async fn delete_prefix(&self, prefix: &StorePrefix) -> Result<(), StorageError>;
}

/// A supertrait of [`AsyncReadableStorageTraits`] and [`AsyncWritableStorageTraits`].
pub trait AsyncReadableWritableStorageTraits:
    AsyncReadableStorageTraits + AsyncWritableStorageTraits
{
}

impl<T> AsyncReadableWritableStorageTraits for T where
    T: AsyncReadableStorageTraits + AsyncWritableStorageTraits
{
}
