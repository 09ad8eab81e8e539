//! Storage adapters.
//!
//! A storage adapter wraps a store (or another adapter) and implements the same storage traits.

#[cfg(feature = "object_store")]
pub mod async_to_sync;
mod performance_metrics;
mod retry;

#[cfg(feature = "object_store")]
pub use async_to_sync::{AsyncToSyncBlockOn, AsyncToSyncStorageAdapter};
pub use performance_metrics::PerformanceMetricsStorageAdapter;
pub use retry::{RetryPolicy, RetryStorageAdapter};
