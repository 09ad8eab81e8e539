//! The `zstd` bytes to bytes codec.
//!
//! Applies [Zstandard](https://facebook.github.io/zstd/) compression.

use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::{
    array::codec::{
        BytesToBytesCodecTraits, Codec, CodecError, CodecPlugin, CodecTraits, CorruptChunkError,
    },
    metadata::Metadata,
    plugin::PluginCreateError,
};

/// The identifier for the `zstd` codec.
pub const IDENTIFIER: &str = "zstd";

// Register the codec.
inventory::submit! {
    CodecPlugin::new(IDENTIFIER, is_name_zstd, create_codec_zstd)
}

fn is_name_zstd(name: &str) -> bool {
    name.eq(IDENTIFIER)
}

fn create_codec_zstd(metadata: &Metadata) -> Result<Codec, PluginCreateError> {
    let configuration: ZstdCodecConfiguration = metadata.to_configuration()?;
    let codec = Box::new(ZstdCodec::new_with_configuration(&configuration));
    Ok(Codec::BytesToBytes(codec))
}

/// A `zstd` codec configuration.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct ZstdCodecConfiguration {
    /// The compression level. `0` selects the zstd default.
    #[serde(default)]
    pub level: i32,
    /// Whether to store a checksum of the uncompressed data in each frame.
    #[serde(default)]
    pub checksum: bool,
}

/// A `zstd` codec implementation.
#[derive(Clone, Debug, Default)]
pub struct ZstdCodec {
    level: i32,
    checksum: bool,
}

impl ZstdCodec {
    /// Create a new `zstd` codec.
    #[must_use]
    pub const fn new(level: i32, checksum: bool) -> Self {
        Self { level, checksum }
    }

    /// Create a new `zstd` codec from configuration.
    #[must_use]
    pub const fn new_with_configuration(configuration: &ZstdCodecConfiguration) -> Self {
        Self::new(configuration.level, configuration.checksum)
    }
}

impl CodecTraits for ZstdCodec {
    fn create_metadata(&self) -> Metadata {
        let configuration = ZstdCodecConfiguration {
            level: self.level,
            checksum: self.checksum,
        };
        Metadata::new_with_serializable_configuration(IDENTIFIER, &configuration)
            .unwrap_or_else(|_| Metadata::new(IDENTIFIER))
    }
}

impl BytesToBytesCodecTraits for ZstdCodec {
    fn encode(&self, decoded_value: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        let mut encoder = zstd::Encoder::new(Vec::new(), self.level)?;
        encoder.include_checksum(self.checksum)?;
        encoder.write_all(&decoded_value)?;
        Ok(encoder.finish()?)
    }

    fn decode(&self, encoded_value: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        Ok(zstd::decode_all(encoded_value.as_slice())
            .map_err(|err| CorruptChunkError::new(format!("zstd: {err}")))?)
    }
}
