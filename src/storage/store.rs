//! Stores.
//!
//! [`MemoryStore`] and [`FilesystemStore`] are always available.
//! [`HTTPStore`] (read only) requires the `http` feature, and [`AsyncObjectStore`] requires the `object_store` feature.
//! An [`AsyncObjectStore`] is used synchronously through an [`AsyncToSyncStorageAdapter`](super::storage_adapter::AsyncToSyncStorageAdapter).

mod filesystem_store;
mod memory_store;

#[cfg(feature = "http")]
mod http_store;

#[cfg(feature = "object_store")]
mod object_store;

pub use filesystem_store::{FilesystemStore, FilesystemStoreCreateError};
pub use memory_store::MemoryStore;

#[cfg(feature = "http")]
pub use http_store::{HTTPStore, HTTPStoreCreateError};

#[cfg(feature = "object_store")]
pub use self::object_store::AsyncObjectStore;
