//! Global configuration options.

use std::{
    sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

/// Global configuration options for the chunkhub crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with [`global_config_mut`].
///
/// # Miscellaneous Configuration Options
///
/// ## Validate Checksums
///  > default: [`true`]
///
/// If enabled, checksum codecs (e.g. `crc32c`) will validate that encoded data matches stored checksums, otherwise validation is skipped.
///
/// ## Default Cache Capacity
///  > default: `256 MiB`
///
/// The capacity in bytes of the chunk cache a [`Dataset`](crate::dataset::Dataset) creates when none is supplied.
///
/// # Concurrency Configuration Options
/// ## Default Codec Concurrent Limit
/// > default: [`std::thread::available_parallelism`]`()`
///
/// The default concurrent limit for codec encoding and decoding.
/// The concurrent limit is disabled if set to zero.
///
/// ## Default Chunk Concurrency Minimum
/// > default: `4`
///
/// For view materialisation involving multiple chunks, this is the preferred minimum chunk concurrency.
/// The number of chunks fetched at once is the larger of this value and the codec concurrent limit.
///
/// # Storage Retry Configuration Options
/// ## Storage Retry Attempts
/// > default: `5`
///
/// The maximum number of attempts a [`RetryStorageAdapter`](crate::storage::storage_adapter::RetryStorageAdapter) makes for one call.
///
/// ## Storage Retry Base Delay
/// > default: `50 ms`
///
/// The delay before the first retry. Each subsequent delay doubles, up to the [storage retry max delay](#storage-retry-max-delay).
///
/// ## Storage Retry Max Delay
/// > default: `5 s`
#[derive(Debug)]
pub struct Config {
    validate_checksums: bool,
    default_cache_capacity: u64,
    codec_concurrent_limit: usize,
    chunk_concurrent_minimum: usize,
    storage_retry_attempts: u32,
    storage_retry_base_delay: Duration,
    storage_retry_max_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            validate_checksums: true,
            default_cache_capacity: 256 * 1024 * 1024,
            codec_concurrent_limit: std::thread::available_parallelism()
                .map_or(1, std::num::NonZeroUsize::get),
            chunk_concurrent_minimum: 4,
            storage_retry_attempts: 5,
            storage_retry_base_delay: Duration::from_millis(50),
            storage_retry_max_delay: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Get the [validate checksums](#validate-checksums) configuration.
    #[must_use]
    pub fn validate_checksums(&self) -> bool {
        self.validate_checksums
    }

    /// Set the [validate checksums](#validate-checksums) configuration.
    pub fn set_validate_checksums(&mut self, validate_checksums: bool) {
        self.validate_checksums = validate_checksums;
    }

    /// Get the [default cache capacity](#default-cache-capacity) configuration.
    #[must_use]
    pub fn default_cache_capacity(&self) -> u64 {
        self.default_cache_capacity
    }

    /// Set the [default cache capacity](#default-cache-capacity) configuration.
    pub fn set_default_cache_capacity(&mut self, capacity: u64) {
        self.default_cache_capacity = capacity;
    }

    /// Get the [default codec concurrent limit](#default-codec-concurrent-limit) configuration.
    #[must_use]
    pub fn codec_concurrent_limit(&self) -> usize {
        self.codec_concurrent_limit
    }

    /// Set the [default codec concurrent limit](#default-codec-concurrent-limit) configuration.
    pub fn set_codec_concurrent_limit(&mut self, concurrent_limit: usize) {
        self.codec_concurrent_limit = concurrent_limit;
    }

    /// Get the [default chunk concurrent minimum](#default-chunk-concurrency-minimum) configuration.
    #[must_use]
    pub fn chunk_concurrent_minimum(&self) -> usize {
        self.chunk_concurrent_minimum
    }

    /// Set the [default chunk concurrent minimum](#default-chunk-concurrency-minimum) configuration.
    pub fn set_chunk_concurrent_minimum(&mut self, concurrent_minimum: usize) {
        self.chunk_concurrent_minimum = concurrent_minimum;
    }

    /// Get the [storage retry attempts](#storage-retry-attempts) configuration.
    #[must_use]
    pub fn storage_retry_attempts(&self) -> u32 {
        self.storage_retry_attempts
    }

    /// Set the [storage retry attempts](#storage-retry-attempts) configuration.
    pub fn set_storage_retry_attempts(&mut self, attempts: u32) {
        self.storage_retry_attempts = attempts;
    }

    /// Get the [storage retry base delay](#storage-retry-base-delay) configuration.
    #[must_use]
    pub fn storage_retry_base_delay(&self) -> Duration {
        self.storage_retry_base_delay
    }

    /// Set the [storage retry base delay](#storage-retry-base-delay) configuration.
    pub fn set_storage_retry_base_delay(&mut self, delay: Duration) {
        self.storage_retry_base_delay = delay;
    }

    /// Get the [storage retry max delay](#storage-retry-max-delay) configuration.
    #[must_use]
    pub fn storage_retry_max_delay(&self) -> Duration {
        self.storage_retry_max_delay
    }

    /// Set the [storage retry max delay](#storage-retry-max-delay) configuration.
    pub fn set_storage_retry_max_delay(&mut self, delay: Duration) {
        self.storage_retry_max_delay = delay;
    }

    /// The number of chunks materialised concurrently by a single view computation.
    #[must_use]
    pub fn chunk_concurrent_limit(&self) -> usize {
        self.chunk_concurrent_minimum.max(self.codec_concurrent_limit).max(1)
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global chunkhub configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .read()
        .unwrap()
}

/// Returns a mutable reference to the global chunkhub configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .write()
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validate_checksums() {
        assert!(global_config().validate_checksums());
        let mut config = Config::default();
        config.set_validate_checksums(false);
        assert!(!config.validate_checksums());
    }

    #[test]
    fn config_storage_retry() {
        let config = global_config();
        assert!(config.storage_retry_attempts() >= 1);
        assert!(config.storage_retry_base_delay() <= config.storage_retry_max_delay());
    }

    #[test]
    fn config_chunk_concurrent_limit() {
        let mut config = Config::default();
        config.set_codec_concurrent_limit(0);
        config.set_chunk_concurrent_minimum(0);
        assert_eq!(config.chunk_concurrent_limit(), 1);
        config.set_chunk_concurrent_minimum(8);
        assert_eq!(config.chunk_concurrent_limit(), 8);
    }
}
