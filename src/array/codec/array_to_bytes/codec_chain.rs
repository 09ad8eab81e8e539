//! An array to bytes codec formed by joining an array to bytes codec and bytes to bytes codecs.

use crate::{
    array::{
        codec::{
            ArrayToBytesCodecTraits, BytesToBytesCodecTraits, ChunkRepresentation, Codec,
            CodecError,
        },
        ArrayBytes,
    },
    metadata::Metadata,
};

/// A codec chain is a sequence of one array to bytes codec and any number of bytes to bytes codecs.
///
/// Encoding applies the codecs in order, and decoding applies them in reverse order.
#[derive(Debug, Clone)]
pub struct CodecChain {
    array_to_bytes: Box<dyn ArrayToBytesCodecTraits>,
    bytes_to_bytes: Vec<Box<dyn BytesToBytesCodecTraits>>,
}

impl CodecChain {
    /// Create a new codec chain.
    #[must_use]
    pub fn new(
        array_to_bytes: Box<dyn ArrayToBytesCodecTraits>,
        bytes_to_bytes: Vec<Box<dyn BytesToBytesCodecTraits>>,
    ) -> Self {
        Self {
            array_to_bytes,
            bytes_to_bytes,
        }
    }

    /// Create a new codec chain from a list of metadata.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if:
    ///  - a codec could not be created,
    ///  - the first codec is not an array to bytes codec, or
    ///  - any subsequent codec is not a bytes to bytes codec.
    pub fn from_metadata(metadatas: &[Metadata]) -> Result<Self, CodecError> {
        let mut array_to_bytes: Option<Box<dyn ArrayToBytesCodecTraits>> = None;
        let mut bytes_to_bytes = Vec::with_capacity(metadatas.len().saturating_sub(1));
        for metadata in metadatas {
            let first = array_to_bytes.is_none();
            match Codec::from_metadata(metadata)? {
                Codec::ArrayToBytes(codec) if first => array_to_bytes = Some(codec),
                Codec::BytesToBytes(codec) if !first => bytes_to_bytes.push(codec),
                _ => return Err(CodecError::InvalidCodecChain),
            }
        }
        let array_to_bytes = array_to_bytes.ok_or(CodecError::InvalidCodecChain)?;
        Ok(Self::new(array_to_bytes, bytes_to_bytes))
    }

    /// Create the metadata of every codec in the chain.
    #[must_use]
    pub fn create_metadatas(&self) -> Vec<Metadata> {
        std::iter::once(self.array_to_bytes.create_metadata())
            .chain(self.bytes_to_bytes.iter().map(|codec| codec.create_metadata()))
            .collect()
    }

    /// Get the array to bytes codec.
    #[must_use]
    pub fn array_to_bytes_codec(&self) -> &dyn ArrayToBytesCodecTraits {
        self.array_to_bytes.as_ref()
    }

    /// Get the bytes to bytes codecs.
    #[must_use]
    pub fn bytes_to_bytes_codecs(&self) -> &[Box<dyn BytesToBytesCodecTraits>] {
        &self.bytes_to_bytes
    }

    /// Returns true if encoded chunks hold their decoded elements unchanged.
    ///
    /// Elements of a passthrough chunk can be read with byte range requests without decoding the chunk.
    #[must_use]
    pub fn is_passthrough(&self) -> bool {
        self.bytes_to_bytes.is_empty() && self.array_to_bytes.is_passthrough()
    }

    /// Check that the codec chain supports chunks with `representation`.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if the array to bytes codec does not support the representation.
    pub fn validate(&self, representation: &ChunkRepresentation) -> Result<(), CodecError> {
        self.array_to_bytes.validate(representation)
    }

    /// Encode chunk bytes.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if a codec fails.
    pub fn encode(
        &self,
        bytes: ArrayBytes<'_>,
        representation: &ChunkRepresentation,
    ) -> Result<Vec<u8>, CodecError> {
        let mut encoded = self.array_to_bytes.encode(bytes, representation)?;
        for codec in &self.bytes_to_bytes {
            encoded = codec.encode(encoded)?;
        }
        Ok(encoded)
    }

    /// Decode chunk bytes.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if a codec fails or the encoded value is corrupt.
    pub fn decode(
        &self,
        encoded_value: Vec<u8>,
        representation: &ChunkRepresentation,
    ) -> Result<ArrayBytes<'static>, CodecError> {
        let mut decoded = encoded_value;
        for codec in self.bytes_to_bytes.iter().rev() {
            decoded = codec.decode(decoded)?;
        }
        self.array_to_bytes.decode(decoded, representation)
    }
}

#[cfg(test)]
mod tests {
    use crate::array::DataType;

    use super::*;

    #[cfg(all(feature = "gzip", feature = "crc32c"))]
    #[test]
    fn codec_chain_round_trip() {
        let metadatas: Vec<Metadata> = serde_json::from_str(
            r#"["bytes", {"name": "gzip", "configuration": {"level": 5}}, "crc32c"]"#,
        )
        .unwrap();
        let chain = CodecChain::from_metadata(&metadatas).unwrap();
        assert!(!chain.is_passthrough());
        assert_eq!(chain.bytes_to_bytes_codecs().len(), 2);
        assert_eq!(chain.create_metadatas(), metadatas);

        let representation = ChunkRepresentation::new(vec![10, 4], DataType::Float32);
        let elements: Vec<f32> = (0..40).map(|i| i as f32 * 0.5).collect();
        let bytes: Vec<u8> = bytemuck::cast_slice(&elements).to_vec();
        let encoded = chain
            .encode(ArrayBytes::from(bytes.as_slice()), &representation)
            .unwrap();
        let decoded = chain.decode(encoded, &representation).unwrap();
        assert_eq!(decoded, ArrayBytes::from(bytes));
    }

    #[test]
    fn codec_chain_passthrough() {
        let chain = CodecChain::from_metadata(&[Metadata::new("bytes")]).unwrap();
        assert_eq!(chain.is_passthrough(), cfg!(target_endian = "little"));
        assert_eq!(chain.array_to_bytes_codec().create_metadata(), Metadata::new("bytes"));
    }

    #[test]
    fn codec_chain_invalid() {
        assert!(matches!(
            CodecChain::from_metadata(&[]),
            Err(CodecError::InvalidCodecChain)
        ));
        assert!(matches!(
            CodecChain::from_metadata(&[Metadata::new("bytes"), Metadata::new("vlen")]),
            Err(CodecError::InvalidCodecChain)
        ));
        assert!(matches!(
            CodecChain::from_metadata(&[Metadata::new("bytes"), Metadata::new("lz4")]),
            Err(CodecError::UnsupportedCodec(_))
        ));
    }

    #[cfg(feature = "zstd")]
    #[test]
    fn codec_chain_bytes_to_bytes_first_is_invalid() {
        assert!(matches!(
            CodecChain::from_metadata(&[Metadata::new("zstd"), Metadata::new("bytes")]),
            Err(CodecError::InvalidCodecChain)
        ));
    }
}
