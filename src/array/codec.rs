//! Chunk codecs.
//!
//! Chunks are encoded by a [`CodecChain`]: one array to bytes codec followed by any number of bytes to bytes codecs.
//!
//! Array to bytes codecs:
//!  - `bytes`: uncompressed passthrough of fixed size elements in little endian order,
//!  - `vlen`: variable length elements (text),
//!  - `png` (lossless) and `jpeg` (lossy): one image per sample (`image` feature).
//!
//! Bytes to bytes codecs:
//!  - `gzip` (`gzip` feature),
//!  - `zstd` (`zstd` feature),
//!  - `crc32c`: an integrity checksum (`crc32c` feature).
//!
//! Codecs are [plugins](crate::plugin) registered with [inventory].
//! [`Codec::from_metadata`] creates a codec from [`Metadata`] by name, so new codecs can be registered without modifying callers.

pub mod array_to_bytes;
pub mod bytes_to_bytes;

pub use array_to_bytes::{
    bytes::{BytesCodec, BytesCodecConfiguration},
    codec_chain::CodecChain,
    vlen::VlenCodec,
};

#[cfg(feature = "image")]
pub use array_to_bytes::image::{ImageCodec, ImageCodecConfiguration, ImageFormat};

#[cfg(feature = "crc32c")]
pub use bytes_to_bytes::crc32c::Crc32cCodec;
#[cfg(feature = "gzip")]
pub use bytes_to_bytes::gzip::{GzipCodec, GzipCodecConfiguration};
#[cfg(feature = "zstd")]
pub use bytes_to_bytes::zstd::{ZstdCodec, ZstdCodecConfiguration};

use dyn_clone::DynClone;
use thiserror::Error;

use crate::{
    metadata::Metadata,
    plugin::{Plugin, PluginCreateError},
};

use super::{ArrayBytes, DataType, DataTypeSize};

/// A codec plugin.
pub type CodecPlugin = Plugin<Codec>;
inventory::collect!(CodecPlugin);

/// An array to bytes or bytes to bytes codec.
#[derive(Debug)]
pub enum Codec {
    /// An array to bytes codec.
    ArrayToBytes(Box<dyn ArrayToBytesCodecTraits>),
    /// A bytes to bytes codec.
    BytesToBytes(Box<dyn BytesToBytesCodecTraits>),
}

impl Codec {
    /// Create a codec from metadata.
    ///
    /// # Errors
    /// Returns [`CodecError::UnsupportedCodec`] if no registered codec plugin matches the metadata name,
    /// or [`CodecError::InvalidConfiguration`] if the configuration is invalid.
    pub fn from_metadata(metadata: &Metadata) -> Result<Self, CodecError> {
        for plugin in inventory::iter::<CodecPlugin> {
            if plugin.match_name(metadata.name()) {
                return Ok(plugin.create(metadata)?);
            }
        }
        Err(UnsupportedCodecError::new(metadata.name()).into())
    }
}

/// Codec traits.
pub trait CodecTraits: Send + Sync {
    /// Create the metadata which recreates this codec with [`Codec::from_metadata`].
    fn create_metadata(&self) -> Metadata;
}

/// The representation of a decoded chunk: its shape and data type.
///
/// The first dimension is the sample dimension.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChunkRepresentation {
    shape: Vec<u64>,
    data_type: DataType,
}

impl ChunkRepresentation {
    /// Create a new chunk representation.
    #[must_use]
    pub fn new(shape: Vec<u64>, data_type: DataType) -> Self {
        Self { shape, data_type }
    }

    /// The chunk shape.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// The shape of one sample in the chunk (every dimension after the first).
    #[must_use]
    pub fn sample_shape(&self) -> &[u64] {
        self.shape.get(1..).unwrap_or_default()
    }

    /// The number of samples in the chunk.
    #[must_use]
    pub fn num_samples(&self) -> u64 {
        self.shape.first().copied().unwrap_or(1)
    }

    /// The chunk data type.
    #[must_use]
    pub const fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// The number of elements in the chunk.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// The number of elements in one sample.
    #[must_use]
    pub fn num_elements_per_sample(&self) -> u64 {
        self.sample_shape().iter().product()
    }

    /// The size in bytes of the decoded chunk. Returns [`None`] for a variable sized data type.
    #[must_use]
    pub fn fixed_size(&self) -> Option<u64> {
        match self.data_type.size() {
            DataTypeSize::Fixed(size) => Some(self.num_elements() * size as u64),
            DataTypeSize::Variable => None,
        }
    }
}

/// Traits for array to bytes codecs.
pub trait ArrayToBytesCodecTraits: CodecTraits + DynClone + core::fmt::Debug {
    /// Check that the codec supports chunks with `representation`.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if the codec cannot encode chunks with this representation.
    fn validate(&self, representation: &ChunkRepresentation) -> Result<(), CodecError>;

    /// Encode chunk bytes.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if `bytes` does not match `representation` or encoding fails.
    fn encode(
        &self,
        bytes: ArrayBytes<'_>,
        representation: &ChunkRepresentation,
    ) -> Result<Vec<u8>, CodecError>;

    /// Decode chunk bytes.
    ///
    /// Only the sample shape of `representation` is binding.
    /// The number of decoded samples is determined by the encoded value.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if the encoded value is invalid.
    fn decode(
        &self,
        encoded_value: Vec<u8>,
        representation: &ChunkRepresentation,
    ) -> Result<ArrayBytes<'static>, CodecError>;

    /// Returns true if the encoded bytes of an element are its decoded bytes at the same offset.
    ///
    /// Elements of a passthrough chunk can be read directly with byte range requests.
    fn is_passthrough(&self) -> bool {
        false
    }
}

dyn_clone::clone_trait_object!(ArrayToBytesCodecTraits);

/// Traits for bytes to bytes codecs.
pub trait BytesToBytesCodecTraits: CodecTraits + DynClone + core::fmt::Debug {
    /// Encode bytes.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if encoding fails.
    fn encode(&self, decoded_value: Vec<u8>) -> Result<Vec<u8>, CodecError>;

    /// Decode bytes.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if the encoded value is invalid.
    fn decode(&self, encoded_value: Vec<u8>) -> Result<Vec<u8>, CodecError>;
}

dyn_clone::clone_trait_object!(BytesToBytesCodecTraits);

/// An unsupported codec error.
#[derive(Debug, Error)]
#[error("codec {name} is not supported")]
pub struct UnsupportedCodecError {
    name: String,
}

impl UnsupportedCodecError {
    /// Create a new unsupported codec error.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    /// The codec name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A chunk could not be decoded to its expected shape or size.
#[derive(Debug, Error)]
#[error("corrupt chunk: {_0}")]
pub struct CorruptChunkError(String);

impl CorruptChunkError {
    /// Create a new corrupt chunk error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A codec error.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The codec is not supported.
    #[error(transparent)]
    UnsupportedCodec(#[from] UnsupportedCodecError),
    /// The encoded chunk is corrupt.
    #[error(transparent)]
    CorruptChunk(#[from] CorruptChunkError),
    /// The codec configuration is invalid.
    #[error(transparent)]
    InvalidConfiguration(#[from] PluginCreateError),
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// The codec chain does not start with an array to bytes codec.
    #[error("a codec chain must start with exactly one array to bytes codec")]
    InvalidCodecChain,
    /// The chunk representation is not supported by the codec.
    #[error("{_0}")]
    UnsupportedRepresentation(String),
    /// Fixed length array bytes were expected.
    #[error("expected fixed length array bytes")]
    ExpectedFixedLengthBytes,
    /// Variable length array bytes were expected.
    #[error("expected variable length array bytes")]
    ExpectedVariableLengthBytes,
    /// Other
    #[error("{_0}")]
    Other(String),
}

impl From<&str> for CodecError {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for CodecError {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}

impl CodecError {
    /// Returns true if the error reports a corrupt encoded chunk.
    #[must_use]
    pub const fn is_corrupt_chunk(&self) -> bool {
        matches!(self, Self::CorruptChunk(_))
    }
}

/// Read a little endian `u64` at `offset` of `bytes`.
pub(crate) fn read_u64_le(bytes: &[u8], offset: usize) -> Result<u64, CorruptChunkError> {
    bytes
        .get(offset..offset + core::mem::size_of::<u64>())
        .and_then(|bytes| bytes.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or_else(|| CorruptChunkError::new(format!("truncated header at byte {offset}")))
}

/// Encode `items` as a little endian `u64` count followed by `count + 1` offsets and the concatenated items.
pub(crate) fn encode_offsets_table<'a>(items: impl ExactSizeIterator<Item = &'a [u8]>) -> Vec<u8> {
    let count = items.len();
    let mut header = Vec::with_capacity((count + 2) * core::mem::size_of::<u64>());
    let mut data = Vec::new();
    header.extend_from_slice(&(count as u64).to_le_bytes());
    header.extend_from_slice(&0u64.to_le_bytes());
    for item in items {
        data.extend_from_slice(item);
        header.extend_from_slice(&(data.len() as u64).to_le_bytes());
    }
    header.extend_from_slice(&data);
    header
}

/// Decode an offsets table written by [`encode_offsets_table`], returning the item data and item offsets.
pub(crate) fn decode_offsets_table(
    encoded_value: &[u8],
) -> Result<(&[u8], Vec<usize>), CorruptChunkError> {
    const U64_SIZE: usize = core::mem::size_of::<u64>();
    let count = usize::try_from(read_u64_le(encoded_value, 0)?)
        .map_err(|_| CorruptChunkError::new("item count exceeds usize"))?;
    let header_size = count
        .checked_add(2)
        .and_then(|n| n.checked_mul(U64_SIZE))
        .filter(|&size| size <= encoded_value.len())
        .ok_or_else(|| CorruptChunkError::new(format!("truncated offsets table for {count} items")))?;
    let data = &encoded_value[header_size..];
    let mut offsets = Vec::with_capacity(count + 1);
    for i in 0..=count {
        let offset = usize::try_from(read_u64_le(encoded_value, (i + 1) * U64_SIZE)?)
            .map_err(|_| CorruptChunkError::new("offset exceeds usize"))?;
        if offset > data.len() || offsets.last().is_some_and(|&last| offset < last) {
            return Err(CorruptChunkError::new(format!(
                "invalid offset {offset} for item {i}"
            )));
        }
        offsets.push(offset);
    }
    if offsets.first() != Some(&0) || offsets.last() != Some(&data.len()) {
        return Err(CorruptChunkError::new(
            "offsets do not span the chunk data",
        ));
    }
    Ok((data, offsets))
}
