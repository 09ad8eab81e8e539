//! The `vlen` array to bytes codec.
//!
//! Encodes variable length elements as a little endian `u64` element count, `count + 1` little endian `u64` offsets, then the concatenated element bytes.

use crate::{
    array::{
        codec::{
            decode_offsets_table, encode_offsets_table, ArrayToBytesCodecTraits,
            ChunkRepresentation, Codec, CodecError, CodecPlugin, CodecTraits, CorruptChunkError,
        },
        ArrayBytes, DataType, DataTypeSize,
    },
    metadata::Metadata,
    plugin::{PluginCreateError, PluginMetadataInvalidError},
};

/// The identifier for the `vlen` codec.
pub const IDENTIFIER: &str = "vlen";

// Register the codec.
inventory::submit! {
    CodecPlugin::new(IDENTIFIER, is_name_vlen, create_codec_vlen)
}

fn is_name_vlen(name: &str) -> bool {
    name.eq(IDENTIFIER)
}

fn create_codec_vlen(metadata: &Metadata) -> Result<Codec, PluginCreateError> {
    if metadata.configuration_is_none_or_empty() {
        Ok(Codec::ArrayToBytes(Box::new(VlenCodec::new())))
    } else {
        Err(PluginMetadataInvalidError::new(IDENTIFIER, "codec", metadata.clone()).into())
    }
}

/// A `vlen` codec implementation.
#[derive(Debug, Clone, Default)]
pub struct VlenCodec;

impl VlenCodec {
    /// Create a new `vlen` codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl CodecTraits for VlenCodec {
    fn create_metadata(&self) -> Metadata {
        Metadata::new(IDENTIFIER)
    }
}

impl ArrayToBytesCodecTraits for VlenCodec {
    fn validate(&self, representation: &ChunkRepresentation) -> Result<(), CodecError> {
        match representation.data_type().size() {
            DataTypeSize::Variable => Ok(()),
            DataTypeSize::Fixed(_) => Err(CodecError::UnsupportedRepresentation(format!(
                "the vlen codec does not support fixed size data type {}",
                representation.data_type()
            ))),
        }
    }

    fn encode(
        &self,
        bytes: ArrayBytes<'_>,
        representation: &ChunkRepresentation,
    ) -> Result<Vec<u8>, CodecError> {
        self.validate(representation)?;
        bytes.validate(representation.num_elements(), DataTypeSize::Variable)?;
        let (bytes, offsets) = bytes.into_variable()?;
        let elements = offsets.windows(2).map(|w| &bytes[w[0]..w[1]]);
        Ok(encode_offsets_table(elements))
    }

    fn decode(
        &self,
        encoded_value: Vec<u8>,
        representation: &ChunkRepresentation,
    ) -> Result<ArrayBytes<'static>, CodecError> {
        self.validate(representation)?;
        let (data, offsets) = decode_offsets_table(&encoded_value)?;
        let num_elements = offsets.len() - 1;
        let per_sample = usize::try_from(representation.num_elements_per_sample())
            .map_err(|_| CodecError::from("sample shape exceeds usize"))?;
        if per_sample > 0 && num_elements % per_sample != 0 {
            return Err(CorruptChunkError::new(format!(
                "{num_elements} elements is not a whole number of {per_sample} element samples"
            ))
            .into());
        }
        if representation.data_type() == &DataType::String {
            for (i, w) in offsets.windows(2).enumerate() {
                if std::str::from_utf8(&data[w[0]..w[1]]).is_err() {
                    return Err(
                        CorruptChunkError::new(format!("element {i} is not valid UTF-8")).into(),
                    );
                }
            }
        }
        Ok(ArrayBytes::new_vlen(data.to_vec(), offsets))
    }
}
