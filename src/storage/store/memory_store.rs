//! An in-memory store.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::{
    byte_range::ByteRange,
    storage::{
        Bytes, ReadableStorageTraits, StorageError, StoreKey, StoreKeys, StorePrefix,
        WritableStorageTraits,
    },
};

/// An in-memory store.
///
/// Values are reference counted [`Bytes`], so reads never copy the stored value.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data_map: RwLock<BTreeMap<StoreKey, Bytes>>,
}

impl MemoryStore {
    /// Create a new, empty memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return all keys in the store, in order.
    #[must_use]
    pub fn keys(&self) -> StoreKeys {
        self.data_map.read().keys().cloned().collect()
    }

    /// Return all keys with prefix `prefix`, in order.
    #[must_use]
    pub fn keys_prefix(&self, prefix: &StorePrefix) -> StoreKeys {
        self.data_map
            .read()
            .keys()
            .filter(|key| key.has_prefix(prefix))
            .cloned()
            .collect()
    }
}

impl ReadableStorageTraits for MemoryStore {
    fn get(&self, key: &StoreKey) -> Result<Option<Bytes>, StorageError> {
        Ok(self.data_map.read().get(key).cloned())
    }

    fn get_partial_values_key(
        &self,
        key: &StoreKey,
        byte_ranges: &[ByteRange],
    ) -> Result<Option<Vec<Bytes>>, StorageError> {
        let Some(data) = self.data_map.read().get(key).cloned() else {
            return Ok(None);
        };
        let size = data.len() as u64;
        let out = byte_ranges
            .iter()
            .map(|byte_range| Ok(data.slice(byte_range.to_range_usize(size)?)))
            .collect::<Result<Vec<_>, StorageError>>()?;
        Ok(Some(out))
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        Ok(self.data_map.read().get(key).map(|data| data.len() as u64))
    }
}

impl WritableStorageTraits for MemoryStore {
    fn write(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        self.data_map.write().insert(key.clone(), value);
        Ok(())
    }

    fn delete(&self, key: &StoreKey) -> Result<(), StorageError> {
        self.data_map.write().remove(key);
        Ok(())
    }

    fn delete_prefix(&self, prefix: &StorePrefix) -> Result<(), StorageError> {
        self.data_map.write().retain(|key, _| !key.has_prefix(prefix));
        Ok(())
    }
}
