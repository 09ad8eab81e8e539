//! Datasets.
//!
//! A [`Dataset`] is a set of named [fields](crate::array::Field) sharing a leading *sample dimension*.
//! Fields are declared with [`FieldSpec`] when the dataset is [created](Dataset::create), and grow by one sample
//! per [`append`](Dataset::append) (or many per [`extend`](Dataset::extend)).
//!
//! The dataset metadata is stored at `<path>/dataset.json` and chunks are stored at `<path>/<field>/c/<i0>/<i1>/...`.
//!
//! ### Appending
//! A sample is validated against every field before anything is written, so a [`SchemaMismatchError`] leaves the
//! dataset unchanged.
//! Each touched chunk is then encoded and written once.
//! Only the tail chunk along the sample dimension is ever rewritten, and it is *sealed* once full.
//! The dataset metadata is written last.
//!
//! Writes are single-writer: [`append`](Dataset::append) takes `&mut self` and concurrent writers to the same storage
//! need external coordination.
//! A storage failure part way through an append can leave chunks written beyond the recorded length.
//! They are overwritten by the next successful append.
//!
//! ### Reading
//! [`Dataset::field`] returns a lazy [`TensorView`] of the whole field.
//! Every view of a dataset shares its [`ChunkCache`] and [`DatasetObserver`].
//! A [`Dataset`] is also a [`SampleSource`], the contract consumed by data loaders.

mod field_spec;
mod observer;
mod sample;
mod sample_iter;

use std::{collections::HashSet, ops::Range, sync::Arc};

use itertools::Itertools;
use thiserror::Error;

pub use field_spec::{
    FieldKind, FieldSpec, DEFAULT_GZIP_LEVEL, DEFAULT_JPEG_QUALITY, DEFAULT_ZSTD_LEVEL,
};
pub use observer::{CountingObserver, DatasetObserver, NoopObserver};
pub use sample::{Sample, SampleValue};
pub use sample_iter::{SampleIter, SampleSource, SampleTensors};

use crate::{
    array::{
        chunk_cache::DecodedChunk, codec::CorruptChunkError, ArrayBytes, ArrayError, ChunkCache,
        ChunkCacheLruSizeLimit, DataTypeSize, Field, FieldCreateError, InvalidIndexError,
        SchemaMismatchError, Selector, TensorView,
    },
    array_subset::ArraySubset,
    metadata::{DatasetMetadata, DATASET_FORMAT, DATASET_FORMAT_VERSION, DATASET_METADATA_KEY},
    storage::{
        key_under, Bytes, ReadableStorageTraits, ReadableWritableStorageTraits, StorageError,
        StoreKey, StorePrefix, StorePrefixError,
    },
};

/// A dataset creation or opening error.
#[derive(Debug, Error)]
pub enum DatasetCreateError {
    /// The field specs are invalid.
    #[error("invalid field specs: {_0}")]
    InvalidFieldSpec(String),
    /// A dataset already exists at the path.
    #[error("a dataset already exists at {_0:?}")]
    AlreadyExists(String),
    /// There is no dataset metadata at the path.
    #[error("no dataset exists at {_0:?}")]
    MissingMetadata(String),
    /// The dataset metadata is invalid or inconsistent.
    #[error("corrupt dataset metadata: {_0}")]
    CorruptMetadata(String),
    /// An invalid dataset path.
    #[error(transparent)]
    StorePrefixError(#[from] StorePrefixError),
    /// A field could not be created.
    #[error(transparent)]
    FieldCreateError(#[from] FieldCreateError),
    /// An underlying storage error.
    #[error(transparent)]
    StorageError(#[from] StorageError),
}

/// Options for creating or opening a [`Dataset`].
#[derive(Clone, Default)]
pub struct DatasetOptions {
    cache: Option<Arc<dyn ChunkCache>>,
    observer: Option<Arc<dyn DatasetObserver>>,
    chunk_concurrent_limit: Option<usize>,
}

impl DatasetOptions {
    /// Create the default options.
    ///
    /// A dataset with default options creates a [`ChunkCacheLruSizeLimit`] with the
    /// [default cache capacity](crate::config::Config::default_cache_capacity), and has a [`NoopObserver`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Share `cache` with the dataset, for example between several datasets.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn ChunkCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Report dataset activity to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn DatasetObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Set the number of chunks a view fetches concurrently.
    #[must_use]
    pub fn with_chunk_concurrent_limit(mut self, chunk_concurrent_limit: usize) -> Self {
        self.chunk_concurrent_limit = Some(chunk_concurrent_limit);
        self
    }
}

/// A set of named fields sharing a leading sample dimension.
pub struct Dataset<TStorage: ?Sized> {
    storage: Arc<TStorage>,
    path: String,
    prefix: StorePrefix,
    metadata: DatasetMetadata,
    fields: Vec<Arc<Field>>,
    cache: Arc<dyn ChunkCache>,
    observer: Arc<dyn DatasetObserver>,
    chunk_concurrent_limit: Option<usize>,
}

impl<TStorage: ?Sized> Clone for Dataset<TStorage> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            path: self.path.clone(),
            prefix: self.prefix.clone(),
            metadata: self.metadata.clone(),
            fields: self.fields.clone(),
            cache: self.cache.clone(),
            observer: self.observer.clone(),
            chunk_concurrent_limit: self.chunk_concurrent_limit,
        }
    }
}

impl<TStorage: ?Sized> core::fmt::Debug for Dataset<TStorage> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dataset")
            .field("path", &self.path)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl<TStorage: ?Sized> Dataset<TStorage> {
    fn new_with_metadata(
        storage: Arc<TStorage>,
        path: &str,
        metadata: DatasetMetadata,
        options: DatasetOptions,
    ) -> Result<Self, DatasetCreateError> {
        let prefix = StorePrefix::from_path(path)?;
        let fields = metadata
            .fields
            .iter()
            .map(|field| Field::new(&prefix, field.clone()).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        let cache = options
            .cache
            .unwrap_or_else(|| Arc::new(ChunkCacheLruSizeLimit::default()));
        let observer = options.observer.unwrap_or_else(|| Arc::new(NoopObserver));
        Ok(Self {
            storage,
            path: path.to_string(),
            prefix,
            metadata,
            fields,
            cache,
            observer,
            chunk_concurrent_limit: options.chunk_concurrent_limit,
        })
    }

    /// The dataset path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The store prefix of the dataset.
    #[must_use]
    pub const fn prefix(&self) -> &StorePrefix {
        &self.prefix
    }

    /// The dataset metadata.
    #[must_use]
    pub const fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    /// The fields, in declaration order.
    #[must_use]
    pub fn fields(&self) -> &[Arc<Field>] {
        &self.fields
    }

    /// The field names, in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name())
    }

    /// The number of samples.
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.metadata.length
    }

    /// Returns true if the dataset has no samples.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The underlying storage.
    #[must_use]
    pub fn storage(&self) -> Arc<TStorage> {
        self.storage.clone()
    }

    /// The chunk cache shared by every view of the dataset.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn ChunkCache> {
        &self.cache
    }

    /// The dataset observer.
    #[must_use]
    pub fn observer(&self) -> &Arc<dyn DatasetObserver> {
        &self.observer
    }

    /// Replace the chunk cache. Views created before are unaffected.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn ChunkCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Replace the observer. Views created before are unaffected.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn DatasetObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Return a lazy view of the whole of field `name`.
    ///
    /// The view holds a snapshot of the field, so it does not see samples appended after it was created.
    ///
    /// # Errors
    /// Returns [`ArrayError::FieldNotFound`] if there is no field `name`.
    pub fn field(&self, name: &str) -> Result<TensorView<TStorage>, ArrayError> {
        self.fields
            .iter()
            .find(|field| field.name() == name)
            .map(|field| self.view(field))
            .ok_or_else(|| ArrayError::FieldNotFound(name.to_string()))
    }

    fn view(&self, field: &Arc<Field>) -> TensorView<TStorage> {
        let view = TensorView::new(self.storage.clone(), field.clone(), self.cache.clone())
            .with_observer(self.observer.clone());
        match self.chunk_concurrent_limit {
            Some(chunk_concurrent_limit) => view.with_chunk_concurrent_limit(chunk_concurrent_limit),
            None => view,
        }
    }

    /// The store key of the dataset metadata.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the key is invalid.
    fn metadata_key(prefix: &StorePrefix) -> Result<StoreKey, StorageError> {
        Ok(key_under(prefix, DATASET_METADATA_KEY)?)
    }

    /// Invalidate every cached chunk of the dataset.
    fn invalidate_cached_chunks(&self) {
        for field in &self.fields {
            let grid_shape = field.chunk_grid().grid_shape(&field.shape());
            for chunk_indices in grid_shape.iter().map(|&n| 0..n).multi_cartesian_product() {
                if let Ok(key) = field.chunk_key(&chunk_indices) {
                    self.cache.invalidate(&key);
                }
            }
        }
    }
}

impl<TStorage: ?Sized + ReadableStorageTraits> Dataset<TStorage> {
    /// Open the dataset at `path` with default options.
    ///
    /// # Errors
    /// Returns a [`DatasetCreateError`] if there is no dataset at `path` or its metadata is invalid.
    pub fn open(storage: Arc<TStorage>, path: &str) -> Result<Self, DatasetCreateError> {
        Self::open_opt(storage, path, DatasetOptions::default())
    }

    /// Open the dataset at `path` with `options`.
    ///
    /// # Errors
    /// Returns a [`DatasetCreateError`] if:
    ///  - there is no dataset at `path`,
    ///  - the metadata cannot be parsed, has an unsupported version, or its fields disagree on the number of samples, or
    ///  - a field cannot be created.
    pub fn open_opt(
        storage: Arc<TStorage>,
        path: &str,
        options: DatasetOptions,
    ) -> Result<Self, DatasetCreateError> {
        let key = Self::metadata_key(&StorePrefix::from_path(path)?)?;
        let metadata = storage
            .get(&key)?
            .ok_or_else(|| DatasetCreateError::MissingMetadata(path.to_string()))?;
        let metadata: DatasetMetadata = serde_json::from_slice(&metadata)
            .map_err(|err| DatasetCreateError::CorruptMetadata(err.to_string()))?;
        if metadata.format != DATASET_FORMAT || metadata.version > DATASET_FORMAT_VERSION {
            return Err(DatasetCreateError::CorruptMetadata(format!(
                "unsupported format {} version {}",
                metadata.format, metadata.version
            )));
        }
        if let Some(field) = metadata
            .fields
            .iter()
            .find(|field| field.length != metadata.length)
        {
            return Err(DatasetCreateError::CorruptMetadata(format!(
                "field {} has {} samples but the dataset has {}",
                field.name, field.length, metadata.length
            )));
        }
        tracing::debug!(path, length = metadata.length, "opened dataset");
        Self::new_with_metadata(storage, path, metadata, options)
    }

    /// Fetch and decode the chunks of samples `indices` of every field into the cache.
    ///
    /// `indices` is clamped to the samples of the dataset.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if a chunk cannot be retrieved or decoded.
    pub fn prefetch_samples(&self, indices: Range<u64>) -> Result<(), ArrayError>
    where
        TStorage: 'static,
    {
        let indices = Selector::range(sample_index(indices.start)?, sample_index(indices.end)?);
        for field in &self.fields {
            self.view(field)
                .slice(&[indices.clone()])?
                .prefetch()?;
        }
        Ok(())
    }
}

fn sample_index(index: u64) -> Result<i64, InvalidIndexError> {
    i64::try_from(index)
        .map_err(|_| InvalidIndexError::new(format!("sample index {index} is too large")))
}

impl<TStorage: ?Sized + ReadableStorageTraits + 'static> SampleSource for Dataset<TStorage> {
    fn len(&self) -> u64 {
        self.metadata.length
    }

    fn sample(&self, index: u64) -> Result<SampleTensors, ArrayError> {
        let index = sample_index(index)?;
        self.fields
            .iter()
            .map(|field| {
                let tensor = self.view(field).get(index)?.compute()?;
                Ok((field.name().to_string(), tensor))
            })
            .collect()
    }

    fn prefetch(&self, indices: Range<u64>) -> Result<(), ArrayError> {
        self.prefetch_samples(indices)
    }
}

impl<TStorage: ?Sized + ReadableWritableStorageTraits> Dataset<TStorage> {
    /// Create a dataset at `path` with `fields` and default options.
    ///
    /// # Errors
    /// See [`Dataset::create_opt`].
    pub fn create(
        storage: Arc<TStorage>,
        path: &str,
        fields: &[FieldSpec],
    ) -> Result<Self, DatasetCreateError> {
        Self::create_opt(storage, path, fields, DatasetOptions::default())
    }

    /// Create a dataset at `path` with `fields` and `options`.
    ///
    /// # Errors
    /// Returns a [`DatasetCreateError`] if:
    ///  - `fields` is empty or has duplicate names,
    ///  - a field is invalid,
    ///  - a dataset already exists at `path`, or
    ///  - the metadata cannot be written.
    pub fn create_opt(
        storage: Arc<TStorage>,
        path: &str,
        fields: &[FieldSpec],
        options: DatasetOptions,
    ) -> Result<Self, DatasetCreateError> {
        if fields.is_empty() {
            return Err(DatasetCreateError::InvalidFieldSpec(
                "a dataset needs at least one field".to_string(),
            ));
        }
        let mut names = HashSet::new();
        if let Some(field) = fields.iter().find(|field| !names.insert(field.name())) {
            return Err(DatasetCreateError::InvalidFieldSpec(format!(
                "duplicate field {}",
                field.name()
            )));
        }
        let metadata = DatasetMetadata::new(fields.iter().map(FieldSpec::to_metadata).collect());
        let dataset = Self::new_with_metadata(storage, path, metadata, options)?;
        let key = Self::metadata_key(&dataset.prefix)?;
        if dataset.storage.exists(&key)? {
            return Err(DatasetCreateError::AlreadyExists(path.to_string()));
        }
        dataset.store_metadata(&dataset.metadata)?;
        tracing::debug!(path, fields = fields.len(), "created dataset");
        Ok(dataset)
    }

    /// Open the dataset at `path`, or create it with `fields` if it does not exist.
    ///
    /// # Errors
    /// Returns a [`DatasetCreateError`] if the dataset cannot be opened or created.
    pub fn open_or_create(
        storage: Arc<TStorage>,
        path: &str,
        fields: &[FieldSpec],
        options: DatasetOptions,
    ) -> Result<Self, DatasetCreateError> {
        match Self::open_opt(storage.clone(), path, options.clone()) {
            Err(DatasetCreateError::MissingMetadata(_)) => {
                Self::create_opt(storage, path, fields, options)
            }
            result => result,
        }
    }

    fn store_metadata(&self, metadata: &DatasetMetadata) -> Result<(), StorageError> {
        let key = Self::metadata_key(&self.prefix)?;
        let json = serde_json::to_vec_pretty(metadata)
            .map_err(|err| StorageError::Other(err.to_string()))?;
        self.storage.write(&key, Bytes::from(json))
    }

    /// Append one sample.
    ///
    /// The sample must have a value for every field and no others.
    ///
    /// # Errors
    /// Returns [`ArrayError::SchemaMismatch`] if the sample does not match the fields, in which case the dataset is unchanged.
    /// Returns another [`ArrayError`] if a chunk or the metadata cannot be read or written.
    pub fn append(&mut self, sample: Sample) -> Result<(), ArrayError> {
        self.extend(std::iter::once(sample))
    }

    /// Append many samples, encoding and writing each touched chunk once.
    ///
    /// # Errors
    /// Returns [`ArrayError::SchemaMismatch`] if any sample does not match the fields, in which case the dataset is unchanged.
    /// Returns another [`ArrayError`] if a chunk or the metadata cannot be read or written.
    pub fn extend(&mut self, samples: impl IntoIterator<Item = Sample>) -> Result<(), ArrayError> {
        let samples = samples.into_iter().collect::<Vec<_>>();
        if samples.is_empty() {
            return Ok(());
        }

        // Validate every sample before anything is written
        let mut values = vec![Vec::with_capacity(samples.len()); self.fields.len()];
        for sample in &samples {
            if let Some(name) = sample
                .names()
                .find(|name| self.metadata.field(name).is_none())
            {
                return Err(SchemaMismatchError::new(name, "the dataset has no such field").into());
            }
            for (field, values) in std::iter::zip(&self.fields, &mut values) {
                let value = sample.get(field.name()).ok_or_else(|| {
                    SchemaMismatchError::new(field.name(), "the sample has no value for the field")
                })?;
                values.push(value.to_array_bytes(field.metadata())?);
            }
        }

        let start = self.len();
        let length = start + samples.len() as u64;
        for (field, values) in std::iter::zip(&self.fields, &values) {
            self.append_field(field, start, values)?;
        }

        let mut metadata = self.metadata.clone();
        metadata.length = length;
        for field in &mut metadata.fields {
            field.length = length;
        }
        self.store_metadata(&metadata)?;
        self.metadata = metadata;
        self.fields = self
            .fields
            .iter()
            .map(|field| Arc::new(field.with_length(length)))
            .collect();
        tracing::debug!(path = self.path, length, "appended samples");
        self.observer.samples_appended(length);
        Ok(())
    }

    /// Write `samples` to `field` starting at sample `start`.
    fn append_field(
        &self,
        field: &Field,
        start: u64,
        samples: &[ArrayBytes<'static>],
    ) -> Result<(), ArrayError> {
        let length = start + samples.len() as u64;
        let extended = field.with_length(length);
        let chunk_shape = field.chunk_grid().chunk_shape();
        let chunk_samples = chunk_shape[0];
        let sample_shape = field.sample_shape();
        let data_type_size = field.data_type().size();

        // The chunk grid indices of a sample
        let sample_grid = if sample_shape.is_empty() {
            vec![vec![]]
        } else {
            std::iter::zip(sample_shape, &chunk_shape[1..])
                .map(|(&size, &chunk_size)| 0..size.div_ceil(chunk_size))
                .multi_cartesian_product()
                .collect::<Vec<_>>()
        };

        for chunk_sample_index in start / chunk_samples..length.div_ceil(chunk_samples) {
            let chunk_start = chunk_sample_index * chunk_samples;
            let chunk_end = (chunk_start + chunk_samples).min(length);
            let existing = start.saturating_sub(chunk_start);
            // offsets into `samples` are bounded by its length
            #[allow(clippy::cast_possible_truncation)]
            let new_samples = &samples
                [(chunk_start.max(start) - start) as usize..(chunk_end - start) as usize];

            for sample_chunk_indices in &sample_grid {
                let chunk_indices = std::iter::once(chunk_sample_index)
                    .chain(sample_chunk_indices.iter().copied())
                    .collect::<Vec<_>>();
                let corrupt = |message: &str| {
                    ArrayError::chunk(
                        field.name(),
                        &chunk_indices,
                        CorruptChunkError::new(message),
                    )
                };
                let representation = extended.chunk_representation(&chunk_indices);
                let sample_subset = ArraySubset::new_with_start_shape(
                    extended.chunk_grid().chunk_origin(&chunk_indices)[1..].to_vec(),
                    representation.shape()[1..].to_vec(),
                )
                .map_err(|err| corrupt(&err.to_string()))?;
                let elements_per_sample = usize::try_from(sample_subset.num_elements())
                    .map_err(|_| corrupt("chunk is too large"))?;

                let tail = if existing > 0 {
                    Some(self.tail_chunk(field, &chunk_indices)?)
                } else {
                    None
                };
                let mut builder = ChunkBuilder::new(data_type_size);
                if let Some(tail) = &tail {
                    let num_elements = usize::try_from(existing)
                        .map_err(|_| corrupt("chunk is too large"))?
                        * elements_per_sample;
                    builder
                        .push(tail.bytes(), 0, num_elements)
                        .ok_or_else(|| corrupt("the tail chunk has too few samples"))?;
                }
                for sample in new_samples {
                    for (index, len) in sample_subset.contiguous_linearised_indices(sample_shape) {
                        #[allow(clippy::cast_possible_truncation)]
                        builder
                            .push(sample, index as usize, len as usize)
                            .ok_or_else(|| corrupt("sample is too short"))?;
                    }
                }

                let key = extended.store_chunk(
                    &*self.storage,
                    &chunk_indices,
                    builder.finish(),
                    &representation,
                )?;
                self.cache.invalidate(&key);
                self.observer.chunk_written(&key);
                if chunk_end == chunk_start + chunk_samples {
                    tracing::debug!(key = key.as_str(), "sealed chunk");
                    self.observer.chunk_sealed(&key);
                }
            }
        }
        Ok(())
    }

    /// Read the partially filled tail chunk at `chunk_indices`, preferring the cache.
    fn tail_chunk(
        &self,
        field: &Field,
        chunk_indices: &[u64],
    ) -> Result<Arc<DecodedChunk>, ArrayError> {
        let key = field
            .chunk_key(chunk_indices)
            .map_err(|err| ArrayError::chunk(field.name(), chunk_indices, err))?;
        if let Some(chunk) = self.cache.get(&key) {
            return Ok(chunk);
        }
        let representation = field.chunk_representation(chunk_indices);
        field
            .retrieve_chunk(&*self.storage, chunk_indices, &representation)
            .map(Arc::new)
    }

    /// Delete the dataset and every chunk from storage.
    ///
    /// Chunks of the dataset are removed from the cache.
    ///
    /// # Errors
    /// Returns a [`StorageError`] if the dataset cannot be deleted.
    pub fn delete(self) -> Result<(), StorageError> {
        self.invalidate_cached_chunks();
        self.storage.delete_prefix(&self.prefix)?;
        tracing::debug!(path = self.path, "deleted dataset");
        Ok(())
    }
}

/// Assembles the decoded bytes of a chunk from runs of elements.
enum ChunkBuilder<'a> {
    Fixed(usize, Vec<u8>),
    Variable(Vec<&'a [u8]>),
}

impl<'a> ChunkBuilder<'a> {
    fn new(data_type_size: DataTypeSize) -> Self {
        match data_type_size {
            DataTypeSize::Fixed(size) => Self::Fixed(size, Vec::new()),
            DataTypeSize::Variable => Self::Variable(Vec::new()),
        }
    }

    /// Push elements `start..start + len` of `bytes`. Returns [`None`] if they are out of bounds.
    fn push(&mut self, bytes: &'a ArrayBytes<'_>, start: usize, len: usize) -> Option<()> {
        match (self, bytes) {
            (Self::Fixed(size, output), ArrayBytes::Fixed(bytes)) => {
                output.extend_from_slice(bytes.get(start * *size..(start + len) * *size)?);
            }
            (Self::Variable(output), bytes @ ArrayBytes::Variable(..)) => {
                for index in start..start + len {
                    output.push(bytes.element(index, DataTypeSize::Variable)?);
                }
            }
            _ => return None,
        }
        Some(())
    }

    fn finish(self) -> ArrayBytes<'static> {
        match self {
            Self::Fixed(_, bytes) => ArrayBytes::new_flen(bytes),
            Self::Variable(elements) => ArrayBytes::from_elements(elements),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        array::DataType,
        storage::{
            storage_adapter::PerformanceMetricsStorageAdapter, store::MemoryStore,
            WritableStorageTraits,
        },
    };

    use super::*;

    fn labels() -> [FieldSpec; 2] {
        [
            FieldSpec::tensor("label", DataType::UInt16, vec![], 3),
            FieldSpec::tensor("point", DataType::Float32, vec![2], 2).with_chunk_shape(vec![2, 1]),
        ]
    }

    fn sample(i: u16) -> Sample {
        let x = f32::from(i);
        Sample::new()
            .with_elements("label", vec![], &[i])
            .with_elements("point", vec![2], &[x, -x])
    }

    #[test]
    fn dataset_create_and_open() {
        let store = Arc::new(MemoryStore::new());
        let dataset = Dataset::create(store.clone(), "a/b", &labels()).unwrap();
        assert_eq!(dataset.len(), 0);
        assert_eq!(dataset.field_names().collect::<Vec<_>>(), vec!["label", "point"]);
        assert!(store.get(&StoreKey::new("a/b/dataset.json").unwrap()).unwrap().is_some());

        assert!(matches!(
            Dataset::create(store.clone(), "a/b", &labels()),
            Err(DatasetCreateError::AlreadyExists(_))
        ));
        assert!(matches!(
            Dataset::open(store.clone(), "a/c"),
            Err(DatasetCreateError::MissingMetadata(_))
        ));
        let opened = Dataset::open(store.clone(), "a/b").unwrap();
        assert_eq!(opened.metadata(), dataset.metadata());

        assert!(matches!(
            Dataset::create(store.clone(), "c", &[]),
            Err(DatasetCreateError::InvalidFieldSpec(_))
        ));
        let duplicate = [labels()[0].clone(), labels()[0].clone()];
        assert!(matches!(
            Dataset::create(store.clone(), "c", &duplicate),
            Err(DatasetCreateError::InvalidFieldSpec(_))
        ));
        let mismatched = [FieldSpec::tensor("x", DataType::UInt8, vec![2, 2], 1).png()];
        assert!(matches!(
            Dataset::create(store, "c", &mismatched),
            Err(DatasetCreateError::FieldCreateError(FieldCreateError::KindMismatch { .. }))
        ));
    }

    #[test]
    fn dataset_append_seals_chunks() {
        let store = Arc::new(PerformanceMetricsStorageAdapter::new(Arc::new(MemoryStore::new())));
        let observer = Arc::new(CountingObserver::new());
        let mut dataset = Dataset::create_opt(
            store.clone(),
            "d",
            &labels(),
            DatasetOptions::new().with_observer(observer.clone()),
        )
        .unwrap();
        for i in 0..4 {
            dataset.append(sample(i)).unwrap();
        }
        assert_eq!(dataset.len(), 4);
        // label chunks [0] and point chunks [0, 0], [0, 1], [1, 0], [1, 1] are full
        assert_eq!(observer.chunks_sealed(), 5);

        let labels = dataset.field("label").unwrap().compute().unwrap();
        assert_eq!(labels.to_elements::<u16>().unwrap(), vec![0, 1, 2, 3]);
        let points = dataset.field("point").unwrap().compute().unwrap();
        assert_eq!(points.shape(), &[4, 2]);
        assert_eq!(
            points.to_elements::<f32>().unwrap(),
            vec![0.0, -0.0, 1.0, -1.0, 2.0, -2.0, 3.0, -3.0]
        );

        let reopened = Dataset::open(store, "d").unwrap();
        assert_eq!(reopened.len(), 4);
        assert_eq!(reopened.field("label").unwrap().compute().unwrap(), labels);
    }

    #[test]
    fn dataset_extend_writes_each_chunk_once() {
        let store = Arc::new(PerformanceMetricsStorageAdapter::new(Arc::new(MemoryStore::new())));
        let mut dataset = Dataset::create(store.clone(), "d", &labels()).unwrap();
        store.reset();
        dataset.extend((0..5).map(sample)).unwrap();
        // label chunks [0], [1], point chunks [0..3, 0..2] and the metadata
        assert_eq!(store.writes(), 2 + 6 + 1);
        assert_eq!(store.reads(), 0);

        store.reset();
        dataset.extend((5..7).map(sample)).unwrap();
        // the tail chunks of both fields are read and rewritten
        assert_eq!(store.reads(), 1 + 2);
        assert_eq!(
            dataset.field("label").unwrap().compute().unwrap().to_elements::<u16>().unwrap(),
            (0..7).collect::<Vec<_>>()
        );
        dataset.extend(Vec::new()).unwrap();
        assert_eq!(dataset.len(), 7);
    }

    #[test]
    fn dataset_schema_mismatch_leaves_dataset_unchanged() {
        let store = Arc::new(PerformanceMetricsStorageAdapter::new(Arc::new(MemoryStore::new())));
        let mut dataset = Dataset::create(store.clone(), "d", &labels()).unwrap();
        dataset.append(sample(0)).unwrap();
        store.reset();
        for invalid in [
            Sample::new().with_elements("label", vec![], &[1u16]),
            sample(1).with_elements("extra", vec![], &[1u8]),
            sample(1).with_elements("label", vec![], &[1u32]),
            sample(1).with_elements("point", vec![3], &[1f32, 2.0, 3.0]),
        ] {
            let err = dataset.extend([sample(1), invalid]).unwrap_err();
            assert!(matches!(err, ArrayError::SchemaMismatch(_)), "{err}");
        }
        assert_eq!(store.writes(), 0);
        assert_eq!(dataset.len(), 1);
        assert_eq!(Dataset::open(store, "d").unwrap().len(), 1);
    }

    #[test]
    fn dataset_open_inconsistent_metadata() {
        let store = Arc::new(MemoryStore::new());
        let dataset = Dataset::create(store.clone(), "d", &labels()).unwrap();
        let mut metadata = dataset.metadata().clone();
        metadata.fields[1].length = 3;
        dataset.store_metadata(&metadata).unwrap();
        assert!(matches!(
            Dataset::open(store.clone(), "d"),
            Err(DatasetCreateError::CorruptMetadata(_))
        ));
        let key = StoreKey::new("d/dataset.json").unwrap();
        store.write(&key, Bytes::from_static(b"{")).unwrap();
        assert!(matches!(
            Dataset::open(store, "d"),
            Err(DatasetCreateError::CorruptMetadata(_))
        ));
    }

    #[test]
    fn dataset_views_are_snapshots() {
        let store = Arc::new(MemoryStore::new());
        let mut dataset = Dataset::create(store, "d", &labels()).unwrap();
        dataset.extend((0..2).map(sample)).unwrap();
        let before = dataset.field("label").unwrap();
        assert_eq!(before.compute().unwrap().to_elements::<u16>().unwrap(), vec![0, 1]);
        dataset.append(sample(2)).unwrap();
        // the cached tail chunk was invalidated, and the old view still has two samples
        assert_eq!(before.compute().unwrap().to_elements::<u16>().unwrap(), vec![0, 1]);
        assert_eq!(
            dataset.field("label").unwrap().compute().unwrap().to_elements::<u16>().unwrap(),
            vec![0, 1, 2]
        );
        assert!(dataset.field("missing").is_err());
    }

    #[test]
    fn dataset_samples() {
        let store = Arc::new(MemoryStore::new());
        let mut dataset = Dataset::create(
            store,
            "d",
            &[
                FieldSpec::text("caption", 2).zstd(),
                FieldSpec::tensor("label", DataType::UInt16, vec![], 3),
            ],
        )
        .unwrap();
        dataset
            .extend((0..5u16).map(|i| {
                Sample::new()
                    .with_text("caption", &format!("sample {i}"))
                    .with_elements("label", vec![], &[i])
            }))
            .unwrap();
        let sample = dataset.sample(3).unwrap();
        assert_eq!(sample["caption"].to_strings().unwrap(), vec!["sample 3"]);
        assert_eq!(sample["label"].to_elements::<u16>().unwrap(), vec![3]);
        assert!(dataset.sample(5).is_err());

        let captions = dataset
            .iter_samples()
            .with_prefetch(2)
            .map(|sample| sample.unwrap()["caption"].to_strings().unwrap().remove(0))
            .collect::<Vec<_>>();
        assert_eq!(captions.len(), 5);
        assert_eq!(captions[4], "sample 4");
    }

    #[test]
    fn dataset_delete() {
        let store = Arc::new(MemoryStore::new());
        let mut dataset = Dataset::create(store.clone(), "d", &labels()).unwrap();
        dataset.append(sample(0)).unwrap();
        dataset.field("label").unwrap().compute().unwrap();
        let cache = dataset.cache().clone();
        assert!(!cache.is_empty());
        dataset.delete().unwrap();
        assert!(cache.is_empty());
        assert!(store.keys().is_empty());
    }
}
