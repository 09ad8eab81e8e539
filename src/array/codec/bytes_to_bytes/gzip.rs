//! The `gzip` bytes to bytes codec.
//!
//! Applies gzip compression.

use std::io::{Cursor, Read};

use flate2::bufread::{GzDecoder, GzEncoder};
use serde::{Deserialize, Serialize};

use crate::{
    array::codec::{
        BytesToBytesCodecTraits, Codec, CodecError, CodecPlugin, CodecTraits, CorruptChunkError,
    },
    metadata::Metadata,
    plugin::{PluginCreateError, PluginMetadataInvalidError},
};

/// The identifier for the `gzip` codec.
pub const IDENTIFIER: &str = "gzip";

/// The default `gzip` compression level.
pub const DEFAULT_LEVEL: u32 = 5;

// Register the codec.
inventory::submit! {
    CodecPlugin::new(IDENTIFIER, is_name_gzip, create_codec_gzip)
}

fn is_name_gzip(name: &str) -> bool {
    name.eq(IDENTIFIER)
}

fn create_codec_gzip(metadata: &Metadata) -> Result<Codec, PluginCreateError> {
    let configuration: GzipCodecConfiguration = metadata.to_configuration()?;
    let codec = GzipCodec::new(configuration.level)
        .ok_or_else(|| PluginMetadataInvalidError::new(IDENTIFIER, "codec", metadata.clone()))?;
    Ok(Codec::BytesToBytes(Box::new(codec)))
}

/// A `gzip` codec configuration.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug)]
#[serde(deny_unknown_fields)]
pub struct GzipCodecConfiguration {
    /// The compression level in `0..=9`.
    #[serde(default = "default_level")]
    pub level: u32,
}

const fn default_level() -> u32 {
    DEFAULT_LEVEL
}

/// A `gzip` codec implementation.
#[derive(Clone, Debug)]
pub struct GzipCodec {
    compression_level: u32,
}

impl Default for GzipCodec {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_LEVEL,
        }
    }
}

impl GzipCodec {
    /// Create a new `gzip` codec. Returns [`None`] if `compression_level` is not in `0..=9`.
    #[must_use]
    pub fn new(compression_level: u32) -> Option<Self> {
        (compression_level <= 9).then_some(Self { compression_level })
    }
}

impl CodecTraits for GzipCodec {
    fn create_metadata(&self) -> Metadata {
        let configuration = GzipCodecConfiguration {
            level: self.compression_level,
        };
        Metadata::new_with_serializable_configuration(IDENTIFIER, &configuration)
            .unwrap_or_else(|_| Metadata::new(IDENTIFIER))
    }
}

impl BytesToBytesCodecTraits for GzipCodec {
    fn encode(&self, decoded_value: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        let mut encoder = GzEncoder::new(
            Cursor::new(decoded_value),
            flate2::Compression::new(self.compression_level),
        );
        let mut out: Vec<u8> = Vec::new();
        encoder.read_to_end(&mut out)?;
        Ok(out)
    }

    fn decode(&self, encoded_value: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        let mut decoder = GzDecoder::new(Cursor::new(encoded_value));
        let mut out: Vec<u8> = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|err| CorruptChunkError::new(format!("gzip: {err}")))?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_gzip_configuration() {
        let configuration: GzipCodecConfiguration =
            serde_json::from_str(r#"{"level": 1}"#).unwrap();
        assert_eq!(configuration.level, 1);
        assert!(serde_json::from_str::<GzipCodecConfiguration>(r#"{"level": -1}"#).is_err());
        let metadata: Metadata = r#"{"name":"gzip","configuration":{"level":10}}"#
            .try_into()
            .unwrap();
        assert!(Codec::from_metadata(&metadata).is_err());
        let metadata: Metadata = r#""gzip""#.try_into().unwrap();
        assert!(Codec::from_metadata(&metadata).is_ok());
    }

    #[test]
    fn codec_gzip_round_trip() {
        let codec = GzipCodec::new(1).unwrap();
        for bytes in [Vec::new(), (0..1024u32).map(|i| (i % 7) as u8).collect()] {
            let encoded = codec.encode(bytes.clone()).unwrap();
            assert_eq!(codec.decode(encoded).unwrap(), bytes);
        }
    }

    #[test]
    fn codec_gzip_corrupt() {
        let codec = GzipCodec::default();
        let encoded = codec.encode(vec![1, 2, 3, 4]).unwrap();
        assert!(matches!(
            codec.decode(encoded[..encoded.len() / 2].to_vec()),
            Err(CodecError::CorruptChunk(_))
        ));
    }
}
