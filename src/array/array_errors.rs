use std::sync::Arc;

use thiserror::Error;

use crate::{
    dataset::FieldKind,
    storage::{StorageError, StoreKeyError, StorePrefixError},
};

use super::{
    codec::{CodecError, CorruptChunkError},
    ArrayIndices,
};

/// An out of bounds or malformed selection.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid index: {_0}")]
pub struct InvalidIndexError(String);

impl InvalidIndexError {
    /// Create a new invalid index error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// An appended sample disagrees with the declared fields of a dataset.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("sample does not match the schema of field {field}: {message}")]
pub struct SchemaMismatchError {
    field: String,
    message: String,
}

impl SchemaMismatchError {
    /// Create a new schema mismatch error.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// The name of the mismatched field.
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }
}

/// The underlying cause of a chunk error.
#[derive(Debug, Error)]
pub enum ChunkErrorSource {
    /// The chunk could not be decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// The chunk could not be retrieved or stored.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<CorruptChunkError> for ChunkErrorSource {
    fn from(err: CorruptChunkError) -> Self {
        Self::Codec(err.into())
    }
}

impl From<StoreKeyError> for ChunkErrorSource {
    fn from(err: StoreKeyError) -> Self {
        Self::Storage(err.into())
    }
}

/// A field creation error.
#[derive(Debug, Error)]
pub enum FieldCreateError {
    /// The field name is empty or contains `/`.
    #[error("invalid field name {_0:?}")]
    InvalidName(String),
    /// The chunk shape is invalid.
    #[error("invalid chunk shape: {_0}")]
    InvalidChunkShape(String),
    /// The data type, sample shape or codecs do not suit the field kind.
    #[error("invalid {kind} field: {message}")]
    KindMismatch {
        /// The field kind.
        kind: FieldKind,
        /// What does not suit the kind.
        message: String,
    },
    /// The codec chain could not be created or does not support the field.
    #[error(transparent)]
    CodecError(#[from] CodecError),
    /// An invalid store prefix.
    #[error(transparent)]
    StorePrefixError(#[from] StorePrefixError),
}

/// Array errors.
#[derive(Debug, Error)]
pub enum ArrayError {
    /// An invalid index or selection.
    #[error(transparent)]
    InvalidIndex(#[from] InvalidIndexError),
    /// Retrieving, decoding, or encoding a chunk failed.
    #[error("field {field} chunk {chunk_indices:?}: {source}")]
    Chunk {
        /// The field name.
        field: String,
        /// The chunk grid indices.
        chunk_indices: ArrayIndices,
        /// The underlying cause.
        source: ChunkErrorSource,
    },
    /// A written sample does not match the field schema.
    #[error(transparent)]
    SchemaMismatch(#[from] SchemaMismatchError),
    /// A storage error outside of a chunk (e.g. metadata).
    #[error(transparent)]
    StorageError(#[from] StorageError),
    /// A codec error outside of a chunk.
    #[error(transparent)]
    CodecError(#[from] CodecError),
    /// The element type is incompatible with the data type.
    #[error("the element type is incompatible with the data type")]
    IncompatibleElementType,
    /// An element value is invalid for its type.
    #[error("an element value is invalid")]
    InvalidElementValue,
    /// The field does not exist.
    #[error("field {_0} does not exist")]
    FieldNotFound(String),
    /// An error shared by all callers waiting on the same chunk fetch.
    #[error(transparent)]
    Shared(#[from] Arc<ArrayError>),
}

impl ArrayError {
    /// Create a new chunk error.
    pub fn chunk(
        field: impl Into<String>,
        chunk_indices: &[u64],
        source: impl Into<ChunkErrorSource>,
    ) -> Self {
        Self::Chunk {
            field: field.into(),
            chunk_indices: chunk_indices.to_vec(),
            source: source.into(),
        }
    }

    /// Return the underlying error, looking through errors shared between concurrent callers.
    #[must_use]
    pub fn unshared(&self) -> &Self {
        match self {
            Self::Shared(err) => err.unshared(),
            err => err,
        }
    }

    /// Returns true if a chunk could not be decoded because it is corrupt.
    #[must_use]
    pub fn is_corrupt_chunk(&self) -> bool {
        matches!(
            self.unshared(),
            Self::Chunk {
                source: ChunkErrorSource::Codec(err),
                ..
            } if err.is_corrupt_chunk()
        )
    }

    /// Returns true if storage was unavailable after exhausting retries.
    #[must_use]
    pub fn is_storage_unavailable(&self) -> bool {
        matches!(
            self.unshared(),
            Self::Chunk {
                source: ChunkErrorSource::Storage(StorageError::Unavailable(_)),
                ..
            } | Self::StorageError(StorageError::Unavailable(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_error_chunk_context() {
        let err = ArrayError::chunk(
            "image",
            &[2, 0, 0],
            CodecError::from(CorruptChunkError::new("truncated")),
        );
        assert_eq!(
            err.to_string(),
            "field image chunk [2, 0, 0]: corrupt chunk: truncated"
        );
        assert!(err.is_corrupt_chunk());
        let shared = ArrayError::Shared(Arc::new(err));
        assert!(shared.is_corrupt_chunk());
        assert!(!shared.is_storage_unavailable());
    }
}
