use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{
    array::{chunk_key_encoding::ChunkKeyEncoding, ArrayShape, DataType, DataTypeSize, FieldCreateError},
    metadata::{FieldMetadata, Metadata, MetadataConfiguration},
};

const BYTES: &str = "bytes";
const VLEN: &str = "vlen";
const PNG: &str = "png";
const JPEG: &str = "jpeg";

/// The default `zstd` compression level of [`FieldSpec::zstd`].
pub const DEFAULT_ZSTD_LEVEL: i32 = 3;

/// The default `gzip` compression level of [`FieldSpec::gzip`].
pub const DEFAULT_GZIP_LEVEL: u32 = 5;

/// The default `jpeg` quality of [`FieldSpec::jpeg`].
pub const DEFAULT_JPEG_QUALITY: u8 = 90;

/// The kind of a field.
///
/// Each kind binds to the array to bytes codecs which can encode it.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug, Display)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// `uint8` images with shape `[height, width]` or `[height, width, channels]`, encoded as `png` or `jpeg`.
    #[display("image")]
    Image,
    /// Arbitrary N-dimensional arrays, encoded with `bytes` (or `vlen` for strings).
    #[display("tensor")]
    Tensor,
    /// Scalar UTF-8 strings, encoded with `vlen`.
    #[display("text")]
    Text,
}

impl FieldKind {
    /// Validate that the data type, sample shape and array to bytes codec of `metadata` suit this kind.
    ///
    /// # Errors
    /// Returns [`FieldCreateError::KindMismatch`] if they do not.
    pub fn validate(self, metadata: &FieldMetadata) -> Result<(), FieldCreateError> {
        let mismatch = |message: String| {
            Err(FieldCreateError::KindMismatch {
                kind: self,
                message,
            })
        };
        let codec = metadata.codecs.first().map_or("", Metadata::name);
        match self {
            Self::Image => {
                if metadata.data_type != DataType::UInt8 {
                    return mismatch(format!("data type {} is not uint8", metadata.data_type));
                }
                if !matches!(metadata.sample_shape.len(), 2 | 3) {
                    return mismatch(format!(
                        "sample shape {:?} is not [height, width] or [height, width, channels]",
                        metadata.sample_shape
                    ));
                }
                if codec != PNG && codec != JPEG {
                    return mismatch(format!("codec {codec:?} is not an image codec"));
                }
            }
            Self::Tensor => {
                let expected = match metadata.data_type.size() {
                    DataTypeSize::Fixed(_) => BYTES,
                    DataTypeSize::Variable => VLEN,
                };
                if codec != expected {
                    return mismatch(format!(
                        "codec {codec:?} cannot encode {}, expected {expected:?}",
                        metadata.data_type
                    ));
                }
            }
            Self::Text => {
                if metadata.data_type != DataType::String {
                    return mismatch(format!("data type {} is not string", metadata.data_type));
                }
                if !metadata.sample_shape.is_empty() {
                    return mismatch(format!(
                        "sample shape {:?} is not scalar",
                        metadata.sample_shape
                    ));
                }
                if codec != VLEN {
                    return mismatch(format!("codec {codec:?} is not {VLEN:?}"));
                }
            }
        }
        Ok(())
    }
}

/// The declaration of a field passed to [`Dataset::create`](super::Dataset::create).
///
/// ```rust
/// # use chunkhub::array::DataType;
/// # use chunkhub::dataset::FieldSpec;
/// let fields = [
///     FieldSpec::image("image", vec![28, 28], 64).jpeg_quality(80),
///     FieldSpec::tensor("embedding", DataType::Float32, vec![512], 256).zstd(),
///     FieldSpec::text("caption", 1024).gzip(),
/// ];
/// assert_eq!(fields[1].to_metadata().chunk_shape, vec![256, 512]);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    name: String,
    kind: FieldKind,
    data_type: DataType,
    sample_shape: ArrayShape,
    chunk_shape: ArrayShape,
    array_to_bytes: Metadata,
    bytes_to_bytes: Vec<Metadata>,
}

impl FieldSpec {
    fn new(
        name: &str,
        kind: FieldKind,
        data_type: DataType,
        sample_shape: ArrayShape,
        chunk_samples: u64,
        array_to_bytes: Metadata,
    ) -> Self {
        let chunk_shape = std::iter::once(chunk_samples)
            .chain(sample_shape.iter().copied())
            .collect();
        Self {
            name: name.to_string(),
            kind,
            data_type,
            sample_shape,
            chunk_shape,
            array_to_bytes,
            bytes_to_bytes: Vec::new(),
        }
    }

    /// An image field of `uint8` samples with shape `sample_shape` stored `chunk_samples` samples per chunk.
    ///
    /// Images are encoded losslessly with `png` unless [`jpeg`](FieldSpec::jpeg) is selected.
    #[must_use]
    pub fn image(name: &str, sample_shape: ArrayShape, chunk_samples: u64) -> Self {
        Self::new(
            name,
            FieldKind::Image,
            DataType::UInt8,
            sample_shape,
            chunk_samples,
            Metadata::new(PNG),
        )
    }

    /// A tensor field with samples of `data_type` and shape `sample_shape` stored `chunk_samples` samples per chunk.
    #[must_use]
    pub fn tensor(
        name: &str,
        data_type: DataType,
        sample_shape: ArrayShape,
        chunk_samples: u64,
    ) -> Self {
        let array_to_bytes = match data_type.size() {
            DataTypeSize::Fixed(_) => Metadata::new(BYTES),
            DataTypeSize::Variable => Metadata::new(VLEN),
        };
        Self::new(
            name,
            FieldKind::Tensor,
            data_type,
            sample_shape,
            chunk_samples,
            array_to_bytes,
        )
    }

    /// A text field with one string per sample stored `chunk_samples` samples per chunk.
    #[must_use]
    pub fn text(name: &str, chunk_samples: u64) -> Self {
        Self::new(
            name,
            FieldKind::Text,
            DataType::String,
            vec![],
            chunk_samples,
            Metadata::new(VLEN),
        )
    }

    /// Encode images with lossless `png`.
    #[must_use]
    pub fn png(mut self) -> Self {
        self.array_to_bytes = Metadata::new(PNG);
        self
    }

    /// Encode images with lossy `jpeg` at the default quality.
    #[must_use]
    pub fn jpeg(self) -> Self {
        self.jpeg_quality(DEFAULT_JPEG_QUALITY)
    }

    /// Encode images with lossy `jpeg` at `quality` (`1..=100`).
    #[must_use]
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.array_to_bytes = Metadata::new_with_configuration(
            JPEG,
            MetadataConfiguration::from_iter([("quality".to_string(), quality.into())]),
        );
        self
    }

    /// Compress chunks with `gzip` at the default level.
    #[must_use]
    pub fn gzip(self) -> Self {
        self.gzip_level(DEFAULT_GZIP_LEVEL)
    }

    /// Compress chunks with `gzip` at `level` (`0..=9`).
    #[must_use]
    pub fn gzip_level(self, level: u32) -> Self {
        self.with_bytes_to_bytes(Metadata::new_with_configuration(
            "gzip",
            MetadataConfiguration::from_iter([("level".to_string(), level.into())]),
        ))
    }

    /// Compress chunks with `zstd` at the default level.
    #[must_use]
    pub fn zstd(self) -> Self {
        self.zstd_level(DEFAULT_ZSTD_LEVEL)
    }

    /// Compress chunks with `zstd` at `level`.
    #[must_use]
    pub fn zstd_level(self, level: i32) -> Self {
        self.with_bytes_to_bytes(Metadata::new_with_configuration(
            "zstd",
            MetadataConfiguration::from_iter([
                ("level".to_string(), level.into()),
                ("checksum".to_string(), false.into()),
            ]),
        ))
    }

    /// Append a `crc32c` checksum to chunks.
    #[must_use]
    pub fn crc32c(self) -> Self {
        self.with_bytes_to_bytes(Metadata::new("crc32c"))
    }

    /// Add a bytes to bytes codec, applied after those already added.
    #[must_use]
    pub fn with_bytes_to_bytes(mut self, codec: Metadata) -> Self {
        self.bytes_to_bytes.push(codec);
        self
    }

    /// Override the chunk shape, including the sample dimension.
    ///
    /// Chunking within a sample lets views of part of a sample read less.
    #[must_use]
    pub fn with_chunk_shape(mut self, chunk_shape: ArrayShape) -> Self {
        self.chunk_shape = chunk_shape;
        self
    }

    /// The field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The field kind.
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Create the metadata of an empty field.
    #[must_use]
    pub fn to_metadata(&self) -> FieldMetadata {
        FieldMetadata {
            name: self.name.clone(),
            kind: self.kind,
            data_type: self.data_type,
            sample_shape: self.sample_shape.clone(),
            chunk_shape: self.chunk_shape.clone(),
            chunk_key_encoding: ChunkKeyEncoding::default(),
            codecs: std::iter::once(self.array_to_bytes.clone())
                .chain(self.bytes_to_bytes.iter().cloned())
                .collect(),
            length: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_spec_metadata() {
        let metadata = FieldSpec::image("image", vec![28, 28, 1], 64).to_metadata();
        assert_eq!(metadata.chunk_shape, vec![64, 28, 28, 1]);
        assert_eq!(metadata.codecs, vec![Metadata::new("png")]);
        assert_eq!(metadata.length, 0);

        let metadata = FieldSpec::text("caption", 16).zstd().crc32c().to_metadata();
        assert_eq!(metadata.data_type, DataType::String);
        assert_eq!(
            serde_json::to_string(&metadata.codecs).unwrap(),
            r#"["vlen",{"name":"zstd","configuration":{"level":3,"checksum":false}},"crc32c"]"#
        );

        let metadata = FieldSpec::tensor("x", DataType::Float32, vec![4, 4], 8)
            .with_chunk_shape(vec![8, 2, 4])
            .to_metadata();
        assert_eq!(metadata.chunk_shape, vec![8, 2, 4]);
        assert_eq!(metadata.codecs, vec![Metadata::new("bytes")]);
    }

    #[test]
    fn field_kind_validate() {
        for spec in [
            FieldSpec::image("a", vec![4, 4], 2).jpeg(),
            FieldSpec::tensor("b", DataType::Int64, vec![], 2).gzip(),
            FieldSpec::tensor("c", DataType::String, vec![2], 2),
            FieldSpec::text("d", 2),
        ] {
            assert!(spec.kind().validate(&spec.to_metadata()).is_ok());
        }
        for spec in [
            FieldSpec::image("a", vec![4], 2),
            FieldSpec::tensor("b", DataType::UInt8, vec![4, 4], 2).png(),
        ] {
            assert!(spec.kind().validate(&spec.to_metadata()).is_err());
        }
        let mut metadata = FieldSpec::text("d", 2).to_metadata();
        metadata.sample_shape = vec![2];
        metadata.chunk_shape = vec![2, 2];
        assert!(FieldKind::Text.validate(&metadata).is_err());
    }

    #[test]
    fn field_kind_json() {
        assert_eq!(serde_json::to_string(&FieldKind::Image).unwrap(), r#""image""#);
        assert_eq!(
            serde_json::from_str::<FieldKind>(r#""text""#).unwrap(),
            FieldKind::Text
        );
        assert_eq!(FieldKind::Tensor.to_string(), "tensor");
    }
}
