//! A storage adapter which retries transient failures.

use std::{sync::Arc, time::Duration};

use crate::{
    byte_range::{ByteLength, ByteOffset, ByteRange},
    config::global_config,
    storage::{
        Bytes, MaybeBytes, ReadableStorageTraits, StorageError, StorageUnavailableError,
        StoreKey, StorePrefix, WritableStorageTraits,
    },
};

/// A bounded exponential backoff policy.
///
/// Attempt `n` (counting from 1) that fails with a [transient](StorageError::is_transient) error is followed by a delay of
/// `base_delay * 2^(n-1)`, capped at `max_delay`, until `max_attempts` attempts have been made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    /// The policy of the [global configuration](crate::config::Config#storage-retry-configuration-options).
    fn default() -> Self {
        let config = global_config();
        Self::new(
            config.storage_retry_attempts(),
            config.storage_retry_base_delay(),
            config.storage_retry_max_delay(),
        )
    }
}

impl RetryPolicy {
    /// Create a new retry policy. At least one attempt is always made.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// The maximum number of attempts.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The delay after failed attempt `attempt` (counting from 1).
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// A storage adapter which retries requests that fail with a [transient](StorageError::is_transient) error.
///
/// Non-transient errors are returned immediately.
/// Once the [`RetryPolicy`] is exhausted, the request fails with [`StorageError::Unavailable`].
/// Retrying blocks the calling thread for the backoff delay.
#[derive(Debug)]
pub struct RetryStorageAdapter<TStorage: ?Sized> {
    storage: Arc<TStorage>,
    policy: RetryPolicy,
}

impl<TStorage: ?Sized> RetryStorageAdapter<TStorage> {
    /// Create a new retry storage adapter with the default [`RetryPolicy`].
    #[must_use]
    pub fn new(storage: Arc<TStorage>) -> Self {
        Self::new_with_policy(storage, RetryPolicy::default())
    }

    /// Create a new retry storage adapter with a custom [`RetryPolicy`].
    #[must_use]
    pub fn new_with_policy(storage: Arc<TStorage>, policy: RetryPolicy) -> Self {
        Self { storage, policy }
    }

    /// The retry policy.
    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    fn retry<T>(
        &self,
        key: &dyn std::fmt::Display,
        mut request: impl FnMut() -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match request() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => {
                    if attempt >= self.policy.max_attempts {
                        tracing::warn!(%key, attempt, error = %err, "storage request failed, giving up");
                        return Err(
                            StorageUnavailableError::new(key.to_string(), attempt, err).into()
                        );
                    }
                    let delay = self.policy.delay(attempt);
                    tracing::warn!(%key, attempt, ?delay, error = %err, "storage request failed, retrying");
                    std::thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl<TStorage: ?Sized + ReadableStorageTraits> ReadableStorageTraits
    for RetryStorageAdapter<TStorage>
{
    fn get(&self, key: &StoreKey) -> Result<MaybeBytes, StorageError> {
        self.retry(key, || self.storage.get(key))
    }

    fn read_range(
        &self,
        key: &StoreKey,
        offset: ByteOffset,
        length: ByteLength,
    ) -> Result<MaybeBytes, StorageError> {
        self.retry(key, || self.storage.read_range(key, offset, length))
    }

    fn get_partial_values_key(
        &self,
        key: &StoreKey,
        byte_ranges: &[ByteRange],
    ) -> Result<Option<Vec<Bytes>>, StorageError> {
        self.retry(key, || self.storage.get_partial_values_key(key, byte_ranges))
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        self.retry(key, || self.storage.size_key(key))
    }

    fn exists(&self, key: &StoreKey) -> Result<bool, StorageError> {
        self.retry(key, || self.storage.exists(key))
    }
}

impl<TStorage: ?Sized + WritableStorageTraits> WritableStorageTraits
    for RetryStorageAdapter<TStorage>
{
    fn write(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        self.retry(key, || self.storage.write(key, value.clone()))
    }

    fn delete(&self, key: &StoreKey) -> Result<(), StorageError> {
        self.retry(key, || self.storage.delete(key))
    }

    fn delete_prefix(&self, prefix: &StorePrefix) -> Result<(), StorageError> {
        self.retry(prefix, || self.storage.delete_prefix(prefix))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::storage::store::MemoryStore;

    use super::*;

    /// Fails the first `failures` reads with a transient error.
    struct FlakyStore {
        inner: MemoryStore,
        failures: u32,
        attempts: AtomicU32,
    }

    impl ReadableStorageTraits for FlakyStore {
        fn get_partial_values_key(
            &self,
            key: &StoreKey,
            byte_ranges: &[ByteRange],
        ) -> Result<Option<Vec<Bytes>>, StorageError> {
            if self.attempts.fetch_add(1, Ordering::SeqCst) < self.failures {
                Err(StorageError::Transient("connection reset".to_string()))
            } else {
                self.inner.get_partial_values_key(key, byte_ranges)
            }
        }

        fn size_key(&self, _key: &StoreKey) -> Result<Option<u64>, StorageError> {
            Err(StorageError::Unsupported("size_key".to_string()))
        }
    }

    fn flaky_store(failures: u32) -> Arc<FlakyStore> {
        let inner = MemoryStore::new();
        inner
            .write(&"a".try_into().unwrap(), Bytes::from_static(&[1, 2, 3]))
            .unwrap();
        Arc::new(FlakyStore {
            inner,
            failures,
            attempts: AtomicU32::new(0),
        })
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Duration::from_millis(2))
    }

    #[test]
    fn retry_policy_delay() {
        let policy = RetryPolicy::new(5, Duration::from_millis(10), Duration::from_millis(50));
        assert_eq!(policy.delay(1), Duration::from_millis(10));
        assert_eq!(policy.delay(2), Duration::from_millis(20));
        assert_eq!(policy.delay(3), Duration::from_millis(40));
        assert_eq!(policy.delay(4), Duration::from_millis(50));
        assert_eq!(policy.delay(64), Duration::from_millis(50));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO, Duration::ZERO).max_attempts(), 1);
    }

    #[test]
    fn retry_recovers_from_transient_errors() {
        let store = flaky_store(2);
        let adapter = RetryStorageAdapter::new_with_policy(store.clone(), fast_policy(3));
        let key = "a".try_into().unwrap();
        assert_eq!(
            adapter.read_range(&key, 1, 2).unwrap().unwrap().as_ref(),
            &[2, 3]
        );
        assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retry_exhausted_is_unavailable() {
        let store = flaky_store(10);
        let adapter = RetryStorageAdapter::new_with_policy(store.clone(), fast_policy(3));
        let err = adapter.get(&"a".try_into().unwrap()).unwrap_err();
        match err {
            StorageError::Unavailable(err) => {
                assert_eq!(err.attempts(), 3);
                assert_eq!(err.key(), "a");
                assert!(err.last_error().is_transient());
            }
            err => panic!("unexpected error {err:?}"),
        }
        assert_eq!(store.attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retry_skips_permanent_errors() {
        let store = flaky_store(0);
        let adapter = RetryStorageAdapter::new_with_policy(store, fast_policy(3));
        assert!(matches!(
            adapter.size_key(&"a".try_into().unwrap()),
            Err(StorageError::Unsupported(_))
        ));
    }
}
