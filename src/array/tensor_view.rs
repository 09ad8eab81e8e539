//! Lazy views of a field.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use bytes::Bytes;
use rayon::prelude::*;
use rayon_iter_concurrent_limit::iter_concurrent_limit;

use crate::{
    config::global_config,
    dataset::{DatasetObserver, NoopObserver},
    storage::{ReadableStorageTraits, StoreKey},
};

use super::{
    chunk_cache::{ChunkCache, ChunkCacheLruSizeLimit, DecodedChunk},
    chunk_grid::{chunk_coords_for, ChunkSelection},
    codec::CorruptChunkError,
    ArrayBytes, ArrayError, ArrayShape, ChunkErrorSource, DataType, DataTypeSize, Field,
    IndexTransform, InvalidIndexError, Selector, Tensor,
};

/// A lazy, sliceable view of a [`Field`].
///
/// Slicing a view composes its [`IndexTransform`] and never touches storage.
/// [`compute`](TensorView::compute) resolves the view to the chunks it intersects, fetches and decodes them through the
/// shared [`ChunkCache`], and assembles a dense [`Tensor`].
///
/// A view holds a snapshot of its field, so samples appended after the view was created are not visible through it.
pub struct TensorView<TStorage: ?Sized> {
    storage: Arc<TStorage>,
    field: Arc<Field>,
    transform: IndexTransform,
    cache: Arc<dyn ChunkCache>,
    observer: Arc<dyn DatasetObserver>,
    chunk_concurrent_limit: Option<usize>,
}

impl<TStorage: ?Sized> Clone for TensorView<TStorage> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            field: self.field.clone(),
            transform: self.transform.clone(),
            cache: self.cache.clone(),
            observer: self.observer.clone(),
            chunk_concurrent_limit: self.chunk_concurrent_limit,
        }
    }
}

impl<TStorage: ?Sized> core::fmt::Debug for TensorView<TStorage> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TensorView")
            .field("field", &self.field.name())
            .field("shape", &self.shape())
            .field("transform", &self.transform)
            .finish_non_exhaustive()
    }
}

/// The bytes of the part of a view held by one chunk.
enum SelectionBytes {
    /// The decoded chunk.
    Chunk(Arc<DecodedChunk>),
    /// The selected bytes of a passthrough chunk, in run order.
    Ranges(Vec<Bytes>),
}

impl<TStorage: ?Sized> TensorView<TStorage> {
    /// Create a view of the whole of `field`.
    ///
    /// Chunks are cached in `cache`.
    #[must_use]
    pub fn new(storage: Arc<TStorage>, field: Arc<Field>, cache: Arc<dyn ChunkCache>) -> Self {
        let transform = IndexTransform::identity(field.shape());
        Self {
            storage,
            field,
            transform,
            cache,
            observer: Arc::new(NoopObserver),
            chunk_concurrent_limit: None,
        }
    }

    /// Create a view of the whole of `field` with a new cache of the default capacity.
    #[must_use]
    pub fn new_uncached(storage: Arc<TStorage>, field: Arc<Field>) -> Self {
        Self::new(storage, field, Arc::new(ChunkCacheLruSizeLimit::default()))
    }

    /// Report chunk fetches and cache hits to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn DatasetObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Set the number of chunks fetched concurrently by [`compute`](TensorView::compute).
    ///
    /// Defaults to [`Config::chunk_concurrent_limit`](crate::config::Config::chunk_concurrent_limit).
    #[must_use]
    pub fn with_chunk_concurrent_limit(mut self, chunk_concurrent_limit: usize) -> Self {
        self.chunk_concurrent_limit = Some(chunk_concurrent_limit.max(1));
        self
    }

    /// The viewed field.
    #[must_use]
    pub fn field(&self) -> &Field {
        &self.field
    }

    /// The index transform from the view to the field.
    #[must_use]
    pub const fn transform(&self) -> &IndexTransform {
        &self.transform
    }

    /// The chunk cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn ChunkCache> {
        &self.cache
    }

    /// The shape of the view.
    #[must_use]
    pub fn shape(&self) -> ArrayShape {
        self.transform.shape()
    }

    /// The element data type.
    #[must_use]
    pub fn data_type(&self) -> &DataType {
        self.field.data_type()
    }

    /// The number of elements in the view.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.transform.num_elements()
    }

    /// The length of the first dimension of the view, or 0 for a scalar view.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.shape().first().copied().unwrap_or(0)
    }

    /// Returns true if [`len`](TensorView::len) is 0.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Select `selectors` from the view. Missing trailing selectors select whole dimensions.
    ///
    /// # Errors
    /// Returns an [`InvalidIndexError`] if a selector is out of bounds or malformed.
    pub fn slice(&self, selectors: &[Selector]) -> Result<Self, InvalidIndexError> {
        let transform = self.transform.slice(selectors)?;
        Ok(self.with_transform(transform))
    }

    /// Apply `transform`, a transform over this view, to the view.
    ///
    /// # Errors
    /// Returns an [`InvalidIndexError`] if the source shape of `transform` is not the shape of the view.
    pub fn slice_transform(&self, transform: &IndexTransform) -> Result<Self, InvalidIndexError> {
        let transform = self.transform.compose(transform)?;
        Ok(self.with_transform(transform))
    }

    fn with_transform(&self, transform: IndexTransform) -> Self {
        Self {
            transform,
            ..self.clone()
        }
    }

    /// Select index `index` of the first dimension of the view.
    ///
    /// # Errors
    /// Returns an [`InvalidIndexError`] if `index` is out of bounds or the view is a scalar.
    pub fn get(&self, index: i64) -> Result<Self, InvalidIndexError> {
        self.slice(&[Selector::Index(index)])
    }

    /// Iterate over the first dimension of the view.
    ///
    /// The iterator yields lazy views and can be recreated at any time.
    #[must_use]
    pub fn iter(&self) -> TensorViewIter<TStorage> {
        TensorViewIter {
            view: self.clone(),
            range: 0..self.len(),
        }
    }
}

impl<TStorage: ?Sized + ReadableStorageTraits + 'static> TensorView<TStorage> {
    /// Return the store keys of every chunk [`compute`](TensorView::compute) would read, in layout order.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the view does not fit the field or a chunk key is invalid.
    pub fn chunk_keys(&self) -> Result<Vec<StoreKey>, ArrayError> {
        self.chunk_selections()?
            .iter()
            .map(|selection| {
                self.field
                    .chunk_key(selection.chunk_indices())
                    .map_err(|err| {
                        ArrayError::chunk(
                            self.field.name(),
                            selection.chunk_indices(),
                            ChunkErrorSource::from(err),
                        )
                    })
            })
            .collect()
    }

    fn chunk_selections(&self) -> Result<Vec<ChunkSelection>, InvalidIndexError> {
        chunk_coords_for(
            &self.field.shape(),
            self.field.chunk_grid().chunk_shape(),
            &self.transform,
        )
    }

    /// Fetch and decode every chunk in the view, and return the view as a dense [`Tensor`].
    ///
    /// Chunks are fetched concurrently, but the result is assembled in layout order.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if a chunk cannot be retrieved or decoded.
    /// Chunk errors carry the field name and chunk grid indices.
    pub fn compute(&self) -> Result<Tensor, ArrayError> {
        let selections = self.chunk_selections()?;
        let shape = self.shape();
        let data_type = *self.field.data_type();
        let num_elements = usize::try_from(self.num_elements())
            .map_err(|_| InvalidIndexError::new(format!("view with shape {shape:?} is too large")))?;
        tracing::debug!(
            field = self.field.name(),
            chunks = selections.len(),
            elements = num_elements,
            "computing view"
        );

        let chunk_concurrent_limit = self
            .chunk_concurrent_limit
            .unwrap_or_else(|| global_config().chunk_concurrent_limit());
        let retrieve = |selection: ChunkSelection| {
            self.retrieve_selection(&selection)
                .map(|bytes| (selection, bytes))
        };
        let chunks = iter_concurrent_limit!(chunk_concurrent_limit, selections, map, retrieve)
            .collect::<Result<Vec<_>, ArrayError>>()?;

        let bytes = match data_type.size() {
            DataTypeSize::Fixed(data_type_size) => {
                let mut output = vec![0u8; num_elements * data_type_size];
                for (selection, bytes) in &chunks {
                    self.copy_fixed(selection, bytes, data_type_size, &mut output)?;
                }
                ArrayBytes::new_flen(output)
            }
            DataTypeSize::Variable => {
                let empty: &[u8] = &[];
                let mut elements = vec![empty; num_elements];
                for (selection, bytes) in &chunks {
                    let SelectionBytes::Chunk(chunk) = bytes else {
                        return Err(self.corrupt(selection, "expected a decoded chunk"));
                    };
                    for run in selection.runs() {
                        for i in 0..run.len {
                            let element = chunk
                                .bytes()
                                .element((run.local_start + i) as usize, DataTypeSize::Variable)
                                .ok_or_else(|| self.corrupt(selection, "element out of bounds"))?;
                            elements[(run.output_start + i) as usize] = element;
                        }
                    }
                }
                ArrayBytes::from_elements(elements)
            }
        };
        Tensor::new(shape, data_type, bytes)
    }

    fn corrupt(&self, selection: &ChunkSelection, message: &str) -> ArrayError {
        ArrayError::chunk(
            self.field.name(),
            selection.chunk_indices(),
            CorruptChunkError::new(message),
        )
    }

    fn copy_fixed(
        &self,
        selection: &ChunkSelection,
        bytes: &SelectionBytes,
        data_type_size: usize,
        output: &mut [u8],
    ) -> Result<(), ArrayError> {
        let runs = selection.runs();
        match bytes {
            SelectionBytes::Chunk(chunk) => {
                let ArrayBytes::Fixed(chunk_bytes) = chunk.bytes() else {
                    return Err(self.corrupt(selection, "expected fixed length bytes"));
                };
                for run in runs {
                    let src = (run.local_start as usize) * data_type_size;
                    let dst = (run.output_start as usize) * data_type_size;
                    let len = (run.len as usize) * data_type_size;
                    let src = chunk_bytes
                        .get(src..src + len)
                        .ok_or_else(|| self.corrupt(selection, "chunk is too short"))?;
                    output[dst..dst + len].copy_from_slice(src);
                }
            }
            SelectionBytes::Ranges(ranges) => {
                let read = ranges.concat();
                let mut offset = 0;
                for run in runs {
                    let dst = (run.output_start as usize) * data_type_size;
                    let len = (run.len as usize) * data_type_size;
                    let src = read
                        .get(offset..offset + len)
                        .ok_or_else(|| self.corrupt(selection, "chunk is too short"))?;
                    output[dst..dst + len].copy_from_slice(src);
                    offset += len;
                }
            }
        }
        Ok(())
    }

    fn retrieve_selection(&self, selection: &ChunkSelection) -> Result<SelectionBytes, ArrayError> {
        let field = &self.field;
        let chunk_indices = selection.chunk_indices();
        let key = field.chunk_key(chunk_indices).map_err(|err| {
            ArrayError::chunk(field.name(), chunk_indices, ChunkErrorSource::from(err))
        })?;

        if let DataTypeSize::Fixed(data_type_size) = field.data_type().size() {
            if field.codecs().is_passthrough() && !selection.is_whole_chunk() {
                if let Some(chunk) = self.cache.get(&key) {
                    self.observer.cache_hit(&key);
                    return Ok(SelectionBytes::Chunk(chunk));
                }
                let byte_ranges = selection.byte_ranges(data_type_size);
                let ranges =
                    field.retrieve_chunk_byte_ranges(&*self.storage, chunk_indices, &byte_ranges)?;
                self.observer.chunk_fetched(&key);
                return Ok(SelectionBytes::Ranges(ranges));
            }
        }

        self.retrieve_cached(&key, chunk_indices)
            .map(SelectionBytes::Chunk)
    }

    /// Fetch the whole chunk at `chunk_indices` through the cache.
    fn retrieve_cached(
        &self,
        key: &StoreKey,
        chunk_indices: &[u64],
    ) -> Result<Arc<DecodedChunk>, ArrayError> {
        let field = &self.field;
        let representation = field.chunk_representation(chunk_indices);
        let fetched = AtomicBool::new(false);
        let chunk = self
            .cache
            .get_or_fetch(key, &|| {
                fetched.store(true, Ordering::Relaxed);
                field.retrieve_chunk(&*self.storage, chunk_indices, &representation)
            })
            .map_err(ArrayError::Shared)?;
        if fetched.load(Ordering::Relaxed) {
            self.observer.chunk_fetched(key);
        } else {
            self.observer.cache_hit(key);
        }
        Ok(chunk)
    }

    /// Fetch and decode every chunk in the view into the cache without assembling a [`Tensor`].
    ///
    /// Unlike [`compute`](TensorView::compute), uncompressed chunks are always read whole so that later reads of the
    /// view are served from the cache.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if a chunk cannot be retrieved or decoded.
    pub fn prefetch(&self) -> Result<(), ArrayError> {
        let selections = self.chunk_selections()?;
        let chunk_concurrent_limit = self
            .chunk_concurrent_limit
            .unwrap_or_else(|| global_config().chunk_concurrent_limit());
        let prefetch = |selection: ChunkSelection| {
            let chunk_indices = selection.chunk_indices();
            let key = self.field.chunk_key(chunk_indices).map_err(|err| {
                ArrayError::chunk(self.field.name(), chunk_indices, ChunkErrorSource::from(err))
            })?;
            self.retrieve_cached(&key, chunk_indices).map(|_| ())
        };
        iter_concurrent_limit!(chunk_concurrent_limit, selections, try_for_each, prefetch)
    }
}

/// An iterator over the first dimension of a [`TensorView`].
pub struct TensorViewIter<TStorage: ?Sized> {
    view: TensorView<TStorage>,
    range: std::ops::Range<u64>,
}

impl<TStorage: ?Sized> Iterator for TensorViewIter<TStorage> {
    type Item = TensorView<TStorage>;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.range.next()?;
        self.view.get(i64::try_from(index).ok()?).ok()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.range.size_hint()
    }
}

impl<TStorage: ?Sized> ExactSizeIterator for TensorViewIter<TStorage> {}

impl<'a, TStorage: ?Sized> IntoIterator for &'a TensorView<TStorage> {
    type Item = TensorView<TStorage>;
    type IntoIter = TensorViewIter<TStorage>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        array::chunk_cache::ChunkCacheLruChunkLimit,
        array::chunk_key_encoding::ChunkKeyEncoding,
        array::codec::ChunkRepresentation,
        dataset::FieldKind,
        metadata::{FieldMetadata, Metadata},
        storage::{
            storage_adapter::PerformanceMetricsStorageAdapter, store::MemoryStore, StorePrefix,
        },
    };

    use super::*;

    /// A 2-d u16 field with shape [5, 3] and chunk shape [2, 2] holding `10 * row + col`.
    fn view(
        codecs: Vec<Metadata>,
    ) -> TensorView<PerformanceMetricsStorageAdapter<MemoryStore>> {
        let store = Arc::new(PerformanceMetricsStorageAdapter::new(Arc::new(MemoryStore::new())));
        let field = Field::new(
            &StorePrefix::root(),
            FieldMetadata {
                name: "x".to_string(),
                kind: FieldKind::Tensor,
                data_type: DataType::UInt16,
                sample_shape: vec![3],
                chunk_shape: vec![2, 2],
                chunk_key_encoding: ChunkKeyEncoding::default(),
                codecs,
                length: 5,
            },
        )
        .unwrap();
        for i in 0..3u64 {
            for j in 0..2u64 {
                let subset = field.chunk_grid().chunk_subset(&[i, j], &field.shape()).unwrap();
                let elements = (subset.start()[0]..subset.end_exc()[0])
                    .flat_map(|row| {
                        (subset.start()[1]..subset.end_exc()[1]).map(move |col| (10 * row + col) as u16)
                    })
                    .collect::<Vec<_>>();
                let representation = ChunkRepresentation::new(subset.shape().to_vec(), DataType::UInt16);
                field
                    .store_chunk(
                        &*store,
                        &[i, j],
                        ArrayBytes::new_flen(bytemuck::cast_slice(&elements).to_vec()),
                        &representation,
                    )
                    .unwrap();
            }
        }
        store.reset();
        TensorView::new(store, Arc::new(field), Arc::new(ChunkCacheLruChunkLimit::new(16)))
    }

    #[test]
    fn tensor_view_compute() {
        let view = view(vec![Metadata::new("bytes")]);
        assert_eq!(view.shape(), vec![5, 3]);
        let tensor = view.compute().unwrap();
        assert_eq!(
            tensor.to_elements::<u16>().unwrap(),
            vec![0, 1, 2, 10, 11, 12, 20, 21, 22, 30, 31, 32, 40, 41, 42]
        );

        let sliced = view
            .slice(&[Selector::range_step(4, 0, 1), Selector::full()])
            .unwrap();
        assert_eq!(sliced.shape(), vec![0, 3]);
        assert_eq!(sliced.compute().unwrap().num_elements(), 0);

        let sliced = view
            .slice(&[Selector::list([4, 1, 1]), Selector::range_step(0, 3, 2)])
            .unwrap();
        assert_eq!(
            sliced.compute().unwrap().to_elements::<u16>().unwrap(),
            vec![40, 42, 10, 12, 10, 12]
        );

        let element = view.get(-2).unwrap().get(1).unwrap();
        assert_eq!(element.shape(), Vec::<u64>::new());
        assert_eq!(element.compute().unwrap().to_elements::<u16>().unwrap(), vec![31]);
    }

    #[test]
    fn tensor_view_compute_passthrough_reads_ranges() {
        let view = view(vec![Metadata::new("bytes")]);
        let sliced = view.slice(&[Selector::range(1, 2)]).unwrap();
        let tensor = sliced.compute().unwrap();
        assert_eq!(tensor.shape(), &[1, 3]);
        assert_eq!(tensor.to_elements::<u16>().unwrap(), vec![10, 11, 12]);
        // partial reads are not cached
        assert!(view.cache().is_empty());
        assert_eq!(view.storage.reads(), 2);
        assert_eq!(view.storage.bytes_read(), 6);
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn tensor_view_compute_cached() {
        let view = view(vec![
            Metadata::new("bytes"),
            Metadata::new_with_configuration("gzip", serde_json::from_str(r#"{"level":1}"#).unwrap()),
        ]);
        let sliced = view.slice(&[Selector::range(1, 3), Selector::index(2)]).unwrap();
        assert_eq!(sliced.chunk_keys().unwrap().len(), 2);
        assert_eq!(
            sliced.compute().unwrap().to_elements::<u16>().unwrap(),
            vec![12, 22]
        );
        assert_eq!(view.storage.reads(), 2);
        assert_eq!(view.cache().len(), 2);
        sliced.compute().unwrap();
        assert_eq!(view.storage.reads(), 2);
    }

    #[test]
    fn tensor_view_prefetch() {
        let view = view(vec![Metadata::new("bytes")]);
        let sliced = view.slice(&[Selector::range(1, 2)]).unwrap();
        sliced.prefetch().unwrap();
        assert_eq!(view.cache().len(), 2);
        assert_eq!(view.storage.reads(), 2);
        // partial reads of cached chunks are served from the cache
        assert_eq!(
            sliced.compute().unwrap().to_elements::<u16>().unwrap(),
            vec![10, 11, 12]
        );
        assert_eq!(view.storage.reads(), 2);
    }

    #[test]
    fn tensor_view_iter() {
        let view = view(vec![Metadata::new("bytes")]);
        let rows = view
            .iter()
            .map(|row| row.compute().unwrap().to_elements::<u16>().unwrap()[0])
            .collect::<Vec<_>>();
        assert_eq!(rows, vec![0, 10, 20, 30, 40]);
        assert_eq!(view.iter().len(), 5);
        // restartable
        assert_eq!(view.iter().count(), 5);
        assert!(view.get(5).is_err());
    }

    #[test]
    fn tensor_view_slice_associative() {
        let view = view(vec![Metadata::new("bytes")]);
        let a = [Selector::range_step(0, 5, 2), Selector::range(1, 3)];
        let b = [Selector::list([2, 0]), Selector::index(0)];
        let ta = IndexTransform::from_selectors(view.shape(), &a).unwrap();
        let tb = IndexTransform::from_selectors(ta.shape(), &b).unwrap();
        let chained = view.slice(&a).unwrap().slice(&b).unwrap();
        let composed = view.slice_transform(&ta.compose(&tb).unwrap()).unwrap();
        assert_eq!(chained.transform(), composed.transform());
        assert_eq!(
            chained.compute().unwrap().to_elements::<u16>().unwrap(),
            vec![41, 1]
        );
    }

    #[test]
    fn tensor_view_missing_chunk() {
        let view = view(vec![Metadata::new("bytes")]);
        let key = view.field().chunk_key(&[1, 1]).unwrap();
        crate::storage::WritableStorageTraits::delete(&*view.storage, &key).unwrap();
        let err = view.compute().unwrap_err();
        assert!(err.is_corrupt_chunk());
        assert!(err.to_string().starts_with("field x chunk [1, 1]"));
    }
}
