use crate::{
    byte_range::ByteRange,
    metadata::FieldMetadata,
    storage::{
        Bytes, ReadableStorageTraits, StoreKey, StoreKeyError, StorePrefix, WritableStorageTraits,
    },
};

use super::{
    chunk_cache::DecodedChunk,
    chunk_grid::RegularChunkGrid,
    codec::{ChunkRepresentation, CodecChain, CorruptChunkError},
    ArrayBytes, ArrayError, ArrayShape, ChunkErrorSource, DataType, FieldCreateError,
};

/// A field of a dataset: a chunked array whose first dimension is the sample dimension.
///
/// A [`Field`] is an immutable snapshot of the field metadata, including its length.
/// Appending to a dataset replaces its fields, so views created before an append keep their length.
#[derive(Clone, Debug)]
pub struct Field {
    metadata: FieldMetadata,
    codecs: CodecChain,
    chunk_grid: RegularChunkGrid,
    prefix: StorePrefix,
}

impl Field {
    /// Create a field of the dataset at `dataset_prefix` from its metadata.
    ///
    /// # Errors
    /// Returns a [`FieldCreateError`] if:
    ///  - the field name is not a single path component,
    ///  - the chunk shape is invalid or its dimensionality differs from the field,
    ///  - the data type, sample shape or codecs do not suit the [field kind](crate::dataset::FieldKind), or
    ///  - the codec chain cannot be created or does not support the field.
    pub fn new(dataset_prefix: &StorePrefix, metadata: FieldMetadata) -> Result<Self, FieldCreateError> {
        if metadata.name.is_empty() || metadata.name.contains('/') {
            return Err(FieldCreateError::InvalidName(metadata.name));
        }
        if metadata.chunk_shape.len() != metadata.sample_shape.len() + 1 {
            return Err(FieldCreateError::InvalidChunkShape(format!(
                "chunk shape {:?} must have one more dimension than sample shape {:?}",
                metadata.chunk_shape, metadata.sample_shape
            )));
        }
        metadata.kind.validate(&metadata)?;
        let chunk_grid = RegularChunkGrid::new(metadata.chunk_shape.clone())
            .map_err(|err| FieldCreateError::InvalidChunkShape(err.to_string()))?;
        let codecs = CodecChain::from_metadata(&metadata.codecs)?;
        codecs.validate(&ChunkRepresentation::new(
            metadata.chunk_shape.clone(),
            metadata.data_type,
        ))?;
        let prefix = dataset_prefix.child(&metadata.name)?;
        Ok(Self {
            metadata,
            codecs,
            chunk_grid,
            prefix,
        })
    }

    /// Return a copy of this field with `length` samples.
    #[must_use]
    pub fn with_length(&self, length: u64) -> Self {
        let mut field = self.clone();
        field.metadata.length = length;
        field
    }

    /// The field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// The field metadata.
    #[must_use]
    pub const fn metadata(&self) -> &FieldMetadata {
        &self.metadata
    }

    /// The element data type.
    #[must_use]
    pub const fn data_type(&self) -> &DataType {
        &self.metadata.data_type
    }

    /// The shape of one sample.
    #[must_use]
    pub fn sample_shape(&self) -> &[u64] {
        &self.metadata.sample_shape
    }

    /// The number of samples.
    #[must_use]
    pub const fn length(&self) -> u64 {
        self.metadata.length
    }

    /// The field shape, the sample dimension followed by the sample shape.
    #[must_use]
    pub fn shape(&self) -> ArrayShape {
        self.metadata.shape()
    }

    /// The codec chain.
    #[must_use]
    pub const fn codecs(&self) -> &CodecChain {
        &self.codecs
    }

    /// The chunk grid.
    #[must_use]
    pub const fn chunk_grid(&self) -> &RegularChunkGrid {
        &self.chunk_grid
    }

    /// The store prefix of the field, `<dataset>/<field>/`.
    #[must_use]
    pub const fn prefix(&self) -> &StorePrefix {
        &self.prefix
    }

    /// The store key of the chunk at `chunk_indices`.
    ///
    /// # Errors
    /// Returns a [`StoreKeyError`] if the key is invalid.
    pub fn chunk_key(&self, chunk_indices: &[u64]) -> Result<StoreKey, StoreKeyError> {
        self.metadata
            .chunk_key_encoding
            .encode_key(&self.prefix, chunk_indices)
    }

    /// The representation of the chunk at `chunk_indices`, clipped to the current field shape.
    #[must_use]
    pub fn chunk_representation(&self, chunk_indices: &[u64]) -> ChunkRepresentation {
        let shape = self
            .chunk_grid
            .chunk_subset(chunk_indices, &self.shape())
            .map_or_else(
                || self.metadata.chunk_shape.clone(),
                |subset| subset.shape().to_vec(),
            );
        ChunkRepresentation::new(shape, self.metadata.data_type)
    }

    /// Read and decode the chunk at `chunk_indices`.
    ///
    /// # Errors
    /// Returns an [`ArrayError::Chunk`] if the chunk is missing, cannot be retrieved, or cannot be decoded.
    pub fn retrieve_chunk<TStorage: ?Sized + ReadableStorageTraits>(
        &self,
        storage: &TStorage,
        chunk_indices: &[u64],
        representation: &ChunkRepresentation,
    ) -> Result<DecodedChunk, ArrayError> {
        let chunk_error = |source: ChunkErrorSource| ArrayError::chunk(self.name(), chunk_indices, source);
        let key = self.chunk_key(chunk_indices).map_err(|err| chunk_error(err.into()))?;
        let encoded = storage
            .get(&key)
            .map_err(|err| chunk_error(err.into()))?
            .ok_or_else(|| chunk_error(missing_chunk(&key).into()))?;
        tracing::debug!(key = key.as_str(), size = encoded.len(), "decoding chunk");
        self.codecs
            .decode(encoded.to_vec(), representation)
            .and_then(|bytes| DecodedChunk::new(bytes, representation))
            .map_err(|err| chunk_error(err.into()))
    }

    /// Read `byte_ranges` of the decoded chunk at `chunk_indices` without decoding the chunk.
    ///
    /// Only valid if the codec chain is a [passthrough](CodecChain::is_passthrough).
    ///
    /// # Errors
    /// Returns an [`ArrayError::Chunk`] if the chunk is missing or cannot be retrieved.
    pub fn retrieve_chunk_byte_ranges<TStorage: ?Sized + ReadableStorageTraits>(
        &self,
        storage: &TStorage,
        chunk_indices: &[u64],
        byte_ranges: &[ByteRange],
    ) -> Result<Vec<Bytes>, ArrayError> {
        let chunk_error = |source: ChunkErrorSource| ArrayError::chunk(self.name(), chunk_indices, source);
        let key = self.chunk_key(chunk_indices).map_err(|err| chunk_error(err.into()))?;
        tracing::debug!(
            key = key.as_str(),
            ranges = byte_ranges.len(),
            "reading chunk byte ranges"
        );
        storage
            .get_partial_values_key(&key, byte_ranges)
            .map_err(|err| chunk_error(err.into()))?
            .ok_or_else(|| chunk_error(missing_chunk(&key).into()))
    }

    /// Encode and write the chunk at `chunk_indices`.
    ///
    /// # Errors
    /// Returns an [`ArrayError::Chunk`] if the chunk cannot be encoded or written.
    pub fn store_chunk<TStorage: ?Sized + WritableStorageTraits>(
        &self,
        storage: &TStorage,
        chunk_indices: &[u64],
        bytes: ArrayBytes<'_>,
        representation: &ChunkRepresentation,
    ) -> Result<StoreKey, ArrayError> {
        let chunk_error = |source: ChunkErrorSource| ArrayError::chunk(self.name(), chunk_indices, source);
        let key = self.chunk_key(chunk_indices).map_err(|err| chunk_error(err.into()))?;
        let encoded = self
            .codecs
            .encode(bytes, representation)
            .map_err(|err| chunk_error(err.into()))?;
        tracing::debug!(key = key.as_str(), size = encoded.len(), "writing chunk");
        storage
            .write(&key, Bytes::from(encoded))
            .map_err(|err| chunk_error(err.into()))?;
        Ok(key)
    }
}

fn missing_chunk(key: &StoreKey) -> CorruptChunkError {
    CorruptChunkError::new(format!("chunk {key} is missing"))
}
