//! The `bytes` array to bytes codec.
//!
//! Encodes fixed size elements in little or big endian order without compression.

use serde::{Deserialize, Serialize};

use crate::{
    array::{
        codec::{
            ArrayToBytesCodecTraits, ChunkRepresentation, Codec, CodecError, CodecPlugin,
            CodecTraits, CorruptChunkError,
        },
        ArrayBytes, DataTypeSize,
    },
    metadata::Metadata,
    plugin::PluginCreateError,
};

/// The identifier for the `bytes` codec.
pub const IDENTIFIER: &str = "bytes";

// Register the codec.
inventory::submit! {
    CodecPlugin::new(IDENTIFIER, is_name_bytes, create_codec_bytes)
}

fn is_name_bytes(name: &str) -> bool {
    name.eq(IDENTIFIER)
}

fn create_codec_bytes(metadata: &Metadata) -> Result<Codec, PluginCreateError> {
    let configuration: BytesCodecConfiguration = metadata.to_configuration()?;
    let codec = Box::new(BytesCodec::new_with_configuration(&configuration));
    Ok(Codec::ArrayToBytes(codec))
}

/// The endianness of each element.
#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum Endianness {
    /// Little endian.
    #[default]
    Little,
    /// Big endian.
    Big,
}

impl Endianness {
    /// The endianness of the target platform.
    pub const NATIVE: Self = if cfg!(target_endian = "big") {
        Self::Big
    } else {
        Self::Little
    };
}

/// A `bytes` codec configuration.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct BytesCodecConfiguration {
    /// The target endianness. Defaults to little endian.
    #[serde(default)]
    pub endian: Endianness,
}

/// A `bytes` codec implementation.
#[derive(Debug, Clone, Default)]
pub struct BytesCodec {
    endian: Endianness,
}

impl BytesCodec {
    /// Create a new `bytes` codec.
    #[must_use]
    pub const fn new(endian: Endianness) -> Self {
        Self { endian }
    }

    /// Create a new `bytes` codec for little endian data.
    #[must_use]
    pub const fn little() -> Self {
        Self::new(Endianness::Little)
    }

    /// Create a new `bytes` codec from configuration.
    #[must_use]
    pub const fn new_with_configuration(configuration: &BytesCodecConfiguration) -> Self {
        Self::new(configuration.endian)
    }

    fn element_size(representation: &ChunkRepresentation) -> Result<usize, CodecError> {
        match representation.data_type().size() {
            DataTypeSize::Fixed(size) => Ok(size),
            DataTypeSize::Variable => Err(CodecError::UnsupportedRepresentation(format!(
                "the bytes codec does not support variable sized data type {}",
                representation.data_type()
            ))),
        }
    }

    fn swap_endianness(&self, bytes: &mut [u8], element_size: usize) {
        if self.endian != Endianness::NATIVE && element_size > 1 {
            for element in bytes.chunks_exact_mut(element_size) {
                element.reverse();
            }
        }
    }
}

impl CodecTraits for BytesCodec {
    fn create_metadata(&self) -> Metadata {
        if self.endian == Endianness::Little {
            Metadata::new(IDENTIFIER)
        } else {
            let configuration = BytesCodecConfiguration { endian: self.endian };
            Metadata::new_with_serializable_configuration(IDENTIFIER, &configuration)
                .unwrap_or_else(|_| Metadata::new(IDENTIFIER))
        }
    }
}

impl ArrayToBytesCodecTraits for BytesCodec {
    fn validate(&self, representation: &ChunkRepresentation) -> Result<(), CodecError> {
        Self::element_size(representation).map(|_| ())
    }

    fn encode(
        &self,
        bytes: ArrayBytes<'_>,
        representation: &ChunkRepresentation,
    ) -> Result<Vec<u8>, CodecError> {
        let element_size = Self::element_size(representation)?;
        bytes.validate(representation.num_elements(), DataTypeSize::Fixed(element_size))?;
        let mut bytes = bytes.into_fixed()?.into_owned();
        self.swap_endianness(&mut bytes, element_size);
        Ok(bytes)
    }

    fn decode(
        &self,
        mut encoded_value: Vec<u8>,
        representation: &ChunkRepresentation,
    ) -> Result<ArrayBytes<'static>, CodecError> {
        let element_size = Self::element_size(representation)?;
        let sample_size = representation.num_elements_per_sample() as usize * element_size;
        if sample_size > 0 && encoded_value.len() % sample_size != 0 {
            return Err(CorruptChunkError::new(format!(
                "{} bytes is not a whole number of {sample_size} byte samples",
                encoded_value.len()
            ))
            .into());
        }
        self.swap_endianness(&mut encoded_value, element_size);
        Ok(ArrayBytes::new_flen(encoded_value))
    }

    fn is_passthrough(&self) -> bool {
        self.endian == Endianness::NATIVE
    }
}

#[cfg(test)]
mod tests {
    use crate::array::DataType;

    use super::*;

    #[test]
    fn codec_bytes_configuration() {
        let configuration: BytesCodecConfiguration =
            serde_json::from_str(r#"{"endian":"big"}"#).unwrap();
        assert_eq!(configuration.endian, Endianness::Big);
        let configuration: BytesCodecConfiguration = serde_json::from_str("{}").unwrap();
        assert_eq!(configuration.endian, Endianness::Little);
        assert!(serde_json::from_str::<BytesCodecConfiguration>(r#"{"endian":"middle"}"#).is_err());
    }

    #[test]
    fn codec_bytes_round_trip() {
        let elements: Vec<u16> = (0..32).collect();
        let bytes: Vec<u8> = bytemuck::cast_slice(&elements).to_vec();
        let representation = ChunkRepresentation::new(vec![4, 8], DataType::UInt16);
        for codec in [BytesCodec::new(Endianness::Little), BytesCodec::new(Endianness::Big)] {
            let encoded = codec
                .encode(ArrayBytes::from(bytes.as_slice()), &representation)
                .unwrap();
            if codec.is_passthrough() {
                assert_eq!(encoded, bytes);
            } else {
                assert_ne!(encoded, bytes);
            }
            let decoded = codec.decode(encoded, &representation).unwrap();
            assert_eq!(decoded.into_fixed().unwrap().as_ref(), bytes.as_slice());
        }
    }

    #[test]
    fn codec_bytes_big_endian_layout() {
        let representation = ChunkRepresentation::new(vec![1], DataType::UInt32);
        let encoded = BytesCodec::new(Endianness::Big)
            .encode(ArrayBytes::from(0x0102_0304u32.to_ne_bytes().to_vec()), &representation)
            .unwrap();
        assert_eq!(encoded, vec![1, 2, 3, 4]);
    }

    #[test]
    fn codec_bytes_invalid() {
        let codec = BytesCodec::little();
        let representation = ChunkRepresentation::new(vec![2, 2], DataType::UInt16);
        assert!(codec
            .encode(ArrayBytes::from(vec![0u8; 6]), &representation)
            .is_err());
        assert!(matches!(
            codec.decode(vec![0u8; 6], &representation),
            Err(CodecError::CorruptChunk(_))
        ));
        assert!(codec
            .validate(&ChunkRepresentation::new(vec![2], DataType::String))
            .is_err());
    }

    #[test]
    fn codec_bytes_from_metadata() {
        let codec = Codec::from_metadata(&Metadata::new("bytes")).unwrap();
        let Codec::ArrayToBytes(codec) = codec else {
            panic!("bytes is an array to bytes codec")
        };
        assert_eq!(codec.create_metadata(), Metadata::new("bytes"));
    }
}
