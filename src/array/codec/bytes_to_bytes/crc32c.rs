//! The `crc32c` bytes to bytes codec.
//!
//! Appends a CRC32C checksum of the input bytes as 4 little endian bytes.
//! The checksum is validated on decode if [validate checksums](crate::config::Config#validate-checksums) is enabled.

use crate::{
    array::codec::{
        BytesToBytesCodecTraits, Codec, CodecError, CodecPlugin, CodecTraits, CorruptChunkError,
    },
    metadata::Metadata,
    plugin::{PluginCreateError, PluginMetadataInvalidError},
};

/// The identifier for the `crc32c` codec.
pub const IDENTIFIER: &str = "crc32c";

const CHECKSUM_SIZE: usize = core::mem::size_of::<u32>();

// Register the codec.
inventory::submit! {
    CodecPlugin::new(IDENTIFIER, is_name_crc32c, create_codec_crc32c)
}

fn is_name_crc32c(name: &str) -> bool {
    name.eq(IDENTIFIER)
}

fn create_codec_crc32c(metadata: &Metadata) -> Result<Codec, PluginCreateError> {
    if metadata.configuration_is_none_or_empty() {
        Ok(Codec::BytesToBytes(Box::new(Crc32cCodec::new())))
    } else {
        Err(PluginMetadataInvalidError::new(IDENTIFIER, "codec", metadata.clone()).into())
    }
}

/// A `crc32c` checksum codec implementation.
#[derive(Clone, Debug, Default)]
pub struct Crc32cCodec;

impl Crc32cCodec {
    /// Create a new `crc32c` checksum codec.
    #[must_use]
    pub const fn new() -> Self {
        Self {}
    }

    fn decode_opt(
        mut encoded_value: Vec<u8>,
        validate_checksums: bool,
    ) -> Result<Vec<u8>, CodecError> {
        let Some(decoded_size) = encoded_value.len().checked_sub(CHECKSUM_SIZE) else {
            return Err(CorruptChunkError::new(format!(
                "crc32c: {} bytes is too short for a checksum",
                encoded_value.len()
            ))
            .into());
        };
        if validate_checksums {
            let checksum = crc32c::crc32c(&encoded_value[..decoded_size]).to_le_bytes();
            if checksum != encoded_value[decoded_size..] {
                return Err(CorruptChunkError::new("crc32c: checksum mismatch").into());
            }
        }
        encoded_value.truncate(decoded_size);
        Ok(encoded_value)
    }
}

impl CodecTraits for Crc32cCodec {
    fn create_metadata(&self) -> Metadata {
        Metadata::new(IDENTIFIER)
    }
}

impl BytesToBytesCodecTraits for Crc32cCodec {
    fn encode(&self, mut decoded_value: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        let checksum = crc32c::crc32c(&decoded_value).to_le_bytes();
        decoded_value.reserve_exact(checksum.len());
        decoded_value.extend(&checksum);
        Ok(decoded_value)
    }

    fn decode(&self, encoded_value: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        Self::decode_opt(
            encoded_value,
            crate::config::global_config().validate_checksums(),
        )
    }
}
