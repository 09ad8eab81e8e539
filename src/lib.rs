//! A rust library for chunked, compressed array datasets that stream lazily from local or remote storage.
//!
//! A [`Dataset`](dataset::Dataset) is a set of named fields which share a leading, appendable *sample dimension*.
//! Each field is a chunked N-dimensional array whose chunks are encoded by a [codec chain](array::codec::CodecChain)
//! and written to a [storage backend](storage).
//!
//! Reading is lazy.
//! [`Dataset::field`](dataset::Dataset::field) returns a [`TensorView`](array::TensorView), and slicing a view only composes an
//! [`IndexTransform`](array::IndexTransform).
//! Data is transferred and decoded by [`TensorView::compute`](array::TensorView::compute), which resolves the view to the chunks it
//! intersects, fetches them through a shared [chunk cache](array::ChunkCache), and assembles a dense [`Tensor`](array::Tensor).
//!
//! ## Getting Started
//! [`dataset::Dataset`] and [`storage`] are good places to start.
//!
//! ## Example
//! ```rust
//! # use std::sync::Arc;
//! use chunkhub::array::{DataType, Selector};
//! use chunkhub::dataset::{Dataset, FieldSpec, Sample};
//! use chunkhub::storage::store::MemoryStore;
//!
//! let store = Arc::new(MemoryStore::new());
//! let mut dataset = Dataset::create(
//!     store,
//!     "mnist",
//!     &[
//!         FieldSpec::image("image", vec![28, 28, 1], 64).png(),
//!         FieldSpec::tensor("label", DataType::UInt8, vec![], 1024),
//!     ],
//! )?;
//! dataset.append(
//!     Sample::new()
//!         .with_bytes("image", vec![28, 28, 1], vec![0u8; 28 * 28])
//!         .with_elements("label", vec![], &[7u8]),
//! )?;
//!
//! let images = dataset.field("image")?.slice(&[Selector::range(0, 1)])?;
//! assert_eq!(images.compute()?.shape(), &[1, 28, 28, 1]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Crate Features
//! #### Default
//!  - `ndarray`: [`ndarray`] utility functions for [`Tensor`](array::Tensor).
//!  - Codecs: `gzip`, `zstd`, `crc32c`, `image` (`png` and `jpeg`).
//!
//! #### Non-Default
//!  - Stores: `http`, `object_store`.
//!
//! ## Logging
//! The crate emits [`tracing`] events (chunk fetches, cache activity, storage retries) and never installs a subscriber.

#![warn(unused_variables)]
#![warn(dead_code)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![deny(clippy::missing_panics_doc)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub mod array;
pub mod array_subset;
pub mod byte_range;
pub mod config;
pub mod dataset;
pub mod metadata;
pub mod plugin;
pub mod storage;
