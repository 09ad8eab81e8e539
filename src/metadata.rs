//! Dataset and field metadata.
//!
//! A dataset stores a single JSON document, [`DatasetMetadata`], at `<path>/dataset.json`.
//! It lists every field with its kind, data type, sample shape, chunk shape and codec chain.
//!
//! Codecs are described by [`Metadata`], a name with an optional configuration.
//! For example:
//! ```json
//! "bytes"
//! ```
//! or
//! ```json
//! {
//!     "name": "gzip",
//!     "configuration": {
//!       "level": 5
//!     }
//! }
//! ```

use derive_more::From;
use serde::{de::DeserializeOwned, ser::SerializeMap, Deserialize, Serialize};
use thiserror::Error;

use crate::{
    array::{chunk_key_encoding::ChunkKeyEncoding, DataType},
    dataset::FieldKind,
};

/// The name of the dataset metadata document.
pub const DATASET_METADATA_KEY: &str = "dataset.json";

/// The format identifier written to [`DatasetMetadata`].
pub const DATASET_FORMAT: &str = "chunkhub";

/// The current dataset metadata version.
pub const DATASET_FORMAT_VERSION: u32 = 1;

/// Metadata with a name and optional configuration.
///
/// Can be deserialised from a JSON string or name/configuration map.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Metadata {
    name: String,
    configuration: Option<MetadataConfiguration>,
}

/// Configuration metadata.
pub type MetadataConfiguration = serde_json::Map<String, serde_json::Value>;

impl TryFrom<&str> for Metadata {
    type Error = serde_json::Error;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        serde_json::from_str(s)
    }
}

impl core::fmt::Display for Metadata {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if let Some(configuration) = &self.configuration {
            write!(f, "{} {:?}", self.name, configuration)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

impl serde::Serialize for Metadata {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        if let Some(configuration) = &self.configuration {
            let mut s = s.serialize_map(Some(2))?;
            s.serialize_entry("name", &self.name)?;
            s.serialize_entry("configuration", configuration)?;
            s.end()
        } else {
            s.serialize_str(self.name.as_str())
        }
    }
}

impl<'de> serde::Deserialize<'de> for Metadata {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct MetadataNameConfiguration {
            name: String,
            #[serde(default)]
            configuration: Option<MetadataConfiguration>,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum MetadataIntermediate {
            Name(String),
            NameConfiguration(MetadataNameConfiguration),
        }

        match MetadataIntermediate::deserialize(d)? {
            MetadataIntermediate::Name(name) => Ok(Self {
                name,
                configuration: None,
            }),
            MetadataIntermediate::NameConfiguration(metadata) => Ok(Self {
                name: metadata.name,
                configuration: metadata.configuration,
            }),
        }
    }
}

impl Metadata {
    /// Create metadata from `name`.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            configuration: None,
        }
    }

    /// Create metadata from `name` and `configuration`.
    #[must_use]
    pub fn new_with_configuration(name: &str, configuration: MetadataConfiguration) -> Self {
        Self {
            name: name.into(),
            configuration: Some(configuration),
        }
    }

    /// Convert a serializable configuration to [`Metadata`].
    ///
    /// # Errors
    /// Returns [`serde_json::Error`] if `configuration` does not serialize to a JSON object.
    pub fn new_with_serializable_configuration<TConfiguration: serde::Serialize>(
        name: &str,
        configuration: &TConfiguration,
    ) -> Result<Self, serde_json::Error> {
        let serde_json::Value::Object(configuration) = serde_json::to_value(configuration)? else {
            return Err(serde::ser::Error::custom(
                "the configuration is not a JSON object",
            ));
        };
        Ok(Self::new_with_configuration(name, configuration))
    }

    /// Try and convert [`Metadata`] to a deserializable configuration.
    ///
    /// Metadata without a configuration is treated as an empty configuration.
    ///
    /// # Errors
    /// Returns a [`ConfigurationInvalidError`] if the configuration cannot be deserialized.
    pub fn to_configuration<TConfiguration: DeserializeOwned>(
        &self,
    ) -> Result<TConfiguration, ConfigurationInvalidError> {
        let configuration = self.configuration.clone().unwrap_or_default();
        serde_json::from_value(serde_json::Value::Object(configuration))
            .map_err(|_| ConfigurationInvalidError::new(&self.name, self.configuration.clone()))
    }

    /// Returns the metadata name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the metadata configuration.
    #[must_use]
    pub const fn configuration(&self) -> Option<&MetadataConfiguration> {
        self.configuration.as_ref()
    }

    /// Returns true if the configuration is none or an empty map.
    #[must_use]
    pub fn configuration_is_none_or_empty(&self) -> bool {
        self.configuration
            .as_ref()
            .map_or(true, serde_json::Map::is_empty)
    }
}

/// An invalid configuration error.
#[derive(Debug, Error, From)]
#[error("{name} is unsupported, configuration: {configuration:?}")]
pub struct ConfigurationInvalidError {
    name: String,
    configuration: Option<MetadataConfiguration>,
}

impl ConfigurationInvalidError {
    /// Create a new invalid configuration error.
    #[must_use]
    pub fn new(name: &str, configuration: Option<MetadataConfiguration>) -> Self {
        Self {
            name: name.to_string(),
            configuration,
        }
    }

    /// Return the name of the invalid configuration.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// The metadata of one field of a dataset.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
#[serde(deny_unknown_fields)]
pub struct FieldMetadata {
    /// The field name.
    pub name: String,
    /// The kind of field.
    pub kind: FieldKind,
    /// The element data type.
    pub data_type: DataType,
    /// The shape of one sample.
    pub sample_shape: Vec<u64>,
    /// The chunk shape, including the sample dimension.
    pub chunk_shape: Vec<u64>,
    /// The chunk key encoding.
    #[serde(default)]
    pub chunk_key_encoding: ChunkKeyEncoding,
    /// The codec chain, ordered from the array to bytes codec to the last bytes to bytes codec.
    pub codecs: Vec<Metadata>,
    /// The number of samples written to the field.
    pub length: u64,
}

impl FieldMetadata {
    /// The field shape, the sample dimension followed by the sample shape.
    #[must_use]
    pub fn shape(&self) -> Vec<u64> {
        std::iter::once(self.length)
            .chain(self.sample_shape.iter().copied())
            .collect()
    }
}

/// The metadata of a dataset.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug)]
#[serde(deny_unknown_fields)]
pub struct DatasetMetadata {
    /// The format identifier. Always `chunkhub`.
    pub format: String,
    /// The format version.
    pub version: u32,
    /// The number of samples in the dataset.
    pub length: u64,
    /// The fields.
    pub fields: Vec<FieldMetadata>,
}

impl DatasetMetadata {
    /// Create new dataset metadata with no samples.
    #[must_use]
    pub fn new(fields: Vec<FieldMetadata>) -> Self {
        Self {
            format: DATASET_FORMAT.to_string(),
            version: DATASET_FORMAT_VERSION,
            length: 0,
            fields,
        }
    }

    /// Return the metadata of the field named `name`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldMetadata> {
        self.fields.iter().find(|field| field.name == name)
    }
}
