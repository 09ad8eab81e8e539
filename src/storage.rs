//! Dataset storage ([stores](store) and [storage adapters](storage_adapter)).
//!
//! A [store] is a system that can be used to store and retrieve named byte values (chunks and metadata).
//! For example: a filesystem, memory, an HTTP server, or an object store such as Amazon S3.
//!
//! A [storage adapter](storage_adapter) wraps a store and has the same interface as a store.
//! [`RetryStorageAdapter`](storage_adapter::RetryStorageAdapter) retries transient failures with bounded exponential backoff,
//! and [`PerformanceMetricsStorageAdapter`](storage_adapter::PerformanceMetricsStorageAdapter) counts reads and writes.
//!
//! Every store supports partial reads with [`ReadableStorageTraits::read_range`], so a chunk can be fetched without fetching its siblings.

pub mod storage_adapter;
mod storage_sync;
pub mod store;
mod store_key;
mod store_prefix;

#[cfg(feature = "object_store")]
mod storage_async;

use std::sync::Arc;

use thiserror::Error;

use crate::byte_range::InvalidByteRangeError;

pub use bytes::Bytes;

pub use store_key::{StoreKey, StoreKeyError, StoreKeys};
pub use store_prefix::{StorePrefix, StorePrefixError};

pub use self::storage_sync::{
    ReadableStorageTraits, ReadableWritableStorageTraits, WritableStorageTraits,
};

#[cfg(feature = "object_store")]
pub use self::storage_async::{
    AsyncReadableStorageTraits, AsyncReadableWritableStorageTraits, AsyncWritableStorageTraits,
};

/// [`Arc`] wrapped readable storage.
pub type ReadableStorage = Arc<dyn ReadableStorageTraits>;

/// [`Arc`] wrapped writable storage.
pub type WritableStorage = Arc<dyn WritableStorageTraits>;

/// [`Arc`] wrapped readable and writable storage.
pub type ReadableWritableStorage = Arc<dyn ReadableWritableStorageTraits>;

#[cfg(feature = "object_store")]
/// [`Arc`] wrapped asynchronous readable and writable storage.
pub type AsyncReadableWritableStorage = Arc<dyn AsyncReadableWritableStorageTraits>;

/// An optional [`Bytes`] value. [`None`] if the key does not exist.
pub type MaybeBytes = Option<Bytes>;

/// A storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A write operation was attempted on a read only store.
    #[error("a write operation was attempted on a read only store")]
    ReadOnly,
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// An invalid store prefix.
    #[error("invalid store prefix {0}")]
    StorePrefixError(#[from] StorePrefixError),
    /// An invalid store key.
    #[error("invalid store key {0}")]
    InvalidStoreKey(#[from] StoreKeyError),
    /// An invalid byte range.
    #[error("invalid byte range {0}")]
    InvalidByteRangeError(#[from] InvalidByteRangeError),
    /// A failure which may succeed if the request is repeated, such as a dropped connection or a throttled request.
    #[error("transient storage failure: {0}")]
    Transient(String),
    /// The storage could not be reached after exhausting all retries.
    #[error(transparent)]
    Unavailable(#[from] StorageUnavailableError),
    /// The requested method is not supported.
    #[error("{0}")]
    Unsupported(String),
    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl StorageError {
    /// Returns true if the error is worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::IOError(err) => matches!(
                err.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

impl From<&str> for StorageError {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for StorageError {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}

/// A storage request failed on every attempt.
#[derive(Debug, Error)]
#[error("storage unavailable for {key} after {attempts} attempts: {source}")]
pub struct StorageUnavailableError {
    key: String,
    attempts: u32,
    #[source]
    source: Box<StorageError>,
}

impl StorageUnavailableError {
    /// Create a new [`StorageUnavailableError`].
    #[must_use]
    pub fn new(key: impl Into<String>, attempts: u32, source: StorageError) -> Self {
        Self {
            key: key.into(),
            attempts,
            source: Box::new(source),
        }
    }

    /// The key (or prefix) of the failed request.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The number of attempts made.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The error returned by the final attempt.
    #[must_use]
    pub fn last_error(&self) -> &StorageError {
        &self.source
    }
}

/// Return the key of a value named `name` under `prefix`.
///
/// # Errors
/// Returns [`StoreKeyError`] if the resulting key is invalid.
pub fn key_under(prefix: &StorePrefix, name: &str) -> Result<StoreKey, StoreKeyError> {
    StoreKey::new(format!("{}{name}", prefix.as_str()))
}
