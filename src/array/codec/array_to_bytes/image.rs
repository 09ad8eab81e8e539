//! The `png` and `jpeg` array to bytes codecs.
//!
//! Each sample of a chunk is encoded as one image, and the images are stored behind an offsets table
//! (a little endian `u64` image count and `count + 1` little endian `u64` offsets).
//!
//! The sample shape must be `[height, width]` or `[height, width, channels]` with 1 (grayscale) or 3 (RGB) channels and the data type must be `uint8`.
//! `png` is lossless. `jpeg` is lossy, so decoded values only approximate the encoded values.

use ::image::{
    codecs::{jpeg::JpegEncoder, png::PngEncoder},
    ExtendedColorType, ImageEncoder,
};
use serde::{Deserialize, Serialize};

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

/// The identifier for the `png` codec.
pub const IDENTIFIER_PNG: &str = "png";

/// The identifier for the `jpeg` codec.
pub const IDENTIFIER_JPEG: &str = "jpeg";

/// The default `jpeg` quality.
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

// Register the codecs.
inventory::submit! {
    CodecPlugin::new(IDENTIFIER_PNG, is_name_png, create_codec_png)
}
inventory::submit! {
    CodecPlugin::new(IDENTIFIER_JPEG, is_name_jpeg, create_codec_jpeg)
}

fn is_name_png(name: &str) -> bool {
    name.eq(IDENTIFIER_PNG)
}

fn is_name_jpeg(name: &str) -> bool {
    name.eq(IDENTIFIER_JPEG)
}

fn create_codec_png(metadata: &Metadata) -> Result<Codec, PluginCreateError> {
    if metadata.configuration_is_none_or_empty() {
        Ok(Codec::ArrayToBytes(Box::new(ImageCodec::png())))
    } else {
        Err(PluginMetadataInvalidError::new(IDENTIFIER_PNG, "codec", metadata.clone()).into())
    }
}

fn create_codec_jpeg(metadata: &Metadata) -> Result<Codec, PluginCreateError> {
    let configuration: ImageCodecConfiguration = metadata.to_configuration()?;
    let quality = configuration.quality.unwrap_or(DEFAULT_JPEG_QUALITY);
    ImageCodec::jpeg(quality)
        .map(|codec| Codec::ArrayToBytes(Box::new(codec)))
        .ok_or_else(|| {
            PluginMetadataInvalidError::new(IDENTIFIER_JPEG, "codec", metadata.clone()).into()
        })
}

/// An image format.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ImageFormat {
    /// Lossless PNG.
    Png,
    /// Lossy JPEG with a quality in `1..=100`.
    Jpeg(u8),
}

/// A `jpeg` codec configuration.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct ImageCodecConfiguration {
    /// The JPEG quality in `1..=100`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<u8>,
}

/// A `png` or `jpeg` codec implementation.
#[derive(Debug, Clone)]
pub struct ImageCodec {
    format: ImageFormat,
}

#[derive(Clone, Copy)]
struct ImageShape {
    height: u32,
    width: u32,
    channels: u8,
}

impl ImageShape {
    fn num_bytes(self) -> usize {
        self.height as usize * self.width as usize * usize::from(self.channels)
    }

    fn color_type(self) -> ExtendedColorType {
        if self.channels == 1 {
            ExtendedColorType::L8
        } else {
            ExtendedColorType::Rgb8
        }
    }
}

impl ImageCodec {
    /// Create a new `png` codec.
    #[must_use]
    pub const fn png() -> Self {
        Self {
            format: ImageFormat::Png,
        }
    }

    /// Create a new `jpeg` codec. Returns [`None`] if `quality` is not in `1..=100`.
    #[must_use]
    pub fn jpeg(quality: u8) -> Option<Self> {
        (1..=100).contains(&quality).then_some(Self {
            format: ImageFormat::Jpeg(quality),
        })
    }

    /// Return the image format.
    #[must_use]
    pub const fn format(&self) -> ImageFormat {
        self.format
    }

    fn identifier(&self) -> &'static str {
        match self.format {
            ImageFormat::Png => IDENTIFIER_PNG,
            ImageFormat::Jpeg(_) => IDENTIFIER_JPEG,
        }
    }

    fn image_shape(&self, representation: &ChunkRepresentation) -> Result<ImageShape, CodecError> {
        let unsupported = |reason: &str| {
            CodecError::UnsupportedRepresentation(format!(
                "the {} codec does not support sample shape {:?} with data type {}: {reason}",
                self.identifier(),
                representation.sample_shape(),
                representation.data_type(),
            ))
        };
        if representation.data_type() != &DataType::UInt8 {
            return Err(unsupported("the data type must be uint8"));
        }
        let (height, width, channels) = match *representation.sample_shape() {
            [height, width] => (height, width, 1),
            [height, width, channels] => (height, width, channels),
            _ => return Err(unsupported("expected [height, width, channels]")),
        };
        let channels = match channels {
            1 => 1,
            3 => 3,
            _ => return Err(unsupported("expected 1 or 3 channels")),
        };
        match (u32::try_from(height), u32::try_from(width)) {
            (Ok(height), Ok(width)) if height > 0 && width > 0 => Ok(ImageShape {
                height,
                width,
                channels,
            }),
            _ => Err(unsupported("the image dimensions must be non-zero u32 values")),
        }
    }

    fn encode_image(&self, image: &[u8], shape: ImageShape) -> Result<Vec<u8>, CodecError> {
        let mut encoded = Vec::new();
        let result = match self.format {
            ImageFormat::Png => PngEncoder::new(&mut encoded).write_image(
                image,
                shape.width,
                shape.height,
                shape.color_type(),
            ),
            ImageFormat::Jpeg(quality) => JpegEncoder::new_with_quality(&mut encoded, quality)
                .write_image(image, shape.width, shape.height, shape.color_type()),
        };
        result.map_err(|err| CodecError::Other(err.to_string()))?;
        Ok(encoded)
    }

    fn decode_image(&self, encoded: &[u8], shape: ImageShape) -> Result<Vec<u8>, CodecError> {
        let format = match self.format {
            ImageFormat::Png => ::image::ImageFormat::Png,
            ImageFormat::Jpeg(_) => ::image::ImageFormat::Jpeg,
        };
        let image = ::image::load_from_memory_with_format(encoded, format)
            .map_err(|err| CorruptChunkError::new(err.to_string()))?;
        if image.width() != shape.width || image.height() != shape.height {
            return Err(CorruptChunkError::new(format!(
                "decoded a {}x{} image, expected {}x{}",
                image.height(),
                image.width(),
                shape.height,
                shape.width
            ))
            .into());
        }
        Ok(if shape.channels == 1 {
            image.into_luma8().into_raw()
        } else {
            image.into_rgb8().into_raw()
        })
    }
}

impl CodecTraits for ImageCodec {
    fn create_metadata(&self) -> Metadata {
        match self.format {
            ImageFormat::Png => Metadata::new(IDENTIFIER_PNG),
            ImageFormat::Jpeg(quality) => {
                let configuration = ImageCodecConfiguration {
                    quality: Some(quality),
                };
                Metadata::new_with_serializable_configuration(IDENTIFIER_JPEG, &configuration)
                    .unwrap_or_else(|_| Metadata::new(IDENTIFIER_JPEG))
            }
        }
    }
}

impl ArrayToBytesCodecTraits for ImageCodec {
    fn validate(&self, representation: &ChunkRepresentation) -> Result<(), CodecError> {
        self.image_shape(representation).map(|_| ())
    }

    fn encode(
        &self,
        bytes: ArrayBytes<'_>,
        representation: &ChunkRepresentation,
    ) -> Result<Vec<u8>, CodecError> {
        let shape = self.image_shape(representation)?;
        bytes.validate(representation.num_elements(), DataTypeSize::Fixed(1))?;
        let bytes = bytes.into_fixed()?;
        let images = bytes
            .chunks(shape.num_bytes())
            .map(|image| self.encode_image(image, shape))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(encode_offsets_table(images.iter().map(Vec::as_slice)))
    }

    fn decode(
        &self,
        encoded_value: Vec<u8>,
        representation: &ChunkRepresentation,
    ) -> Result<ArrayBytes<'static>, CodecError> {
        let shape = self.image_shape(representation)?;
        let (data, offsets) = decode_offsets_table(&encoded_value)?;
        let images = offsets
            .windows(2)
            .map(|w| self.decode_image(&data[w[0]..w[1]], shape))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ArrayBytes::new_flen(images.concat()))
    }
}
