//! Data types.
//!
//! Every field has one [`DataType`]. Numeric and boolean types have a fixed size.
//! [`DataType::String`] elements are variable length UTF-8.

use derive_more::Display;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A data type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display)]
#[non_exhaustive]
pub enum DataType {
    /// `bool` Boolean.
    #[display("bool")]
    Bool,
    /// `int8` Integer in `[-2^7, 2^7-1]`.
    #[display("int8")]
    Int8,
    /// `int16` Integer in `[-2^15, 2^15-1]`.
    #[display("int16")]
    Int16,
    /// `int32` Integer in `[-2^31, 2^31-1]`.
    #[display("int32")]
    Int32,
    /// `int64` Integer in `[-2^63, 2^63-1]`.
    #[display("int64")]
    Int64,
    /// `uint8` Integer in `[0, 2^8-1]`.
    #[display("uint8")]
    UInt8,
    /// `uint16` Integer in `[0, 2^16-1]`.
    #[display("uint16")]
    UInt16,
    /// `uint32` Integer in `[0, 2^32-1]`.
    #[display("uint32")]
    UInt32,
    /// `uint64` Integer in `[0, 2^64-1]`.
    #[display("uint64")]
    UInt64,
    /// `float32` IEEE 754 single-precision floating point.
    #[display("float32")]
    Float32,
    /// `float64` IEEE 754 double-precision floating point.
    #[display("float64")]
    Float64,
    /// `string` A UTF-8 encoded string.
    #[display("string")]
    String,
}

/// The size of a data type.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DataTypeSize {
    /// Fixed size (in bytes).
    Fixed(usize),
    /// Variable sized.
    Variable,
}

/// An unsupported data type error.
#[derive(Debug, Error)]
#[error("data type {_0} is not supported")]
pub struct UnsupportedDataTypeError(String);

const ALL: [DataType; 12] = [
    DataType::Bool,
    DataType::Int8,
    DataType::Int16,
    DataType::Int32,
    DataType::Int64,
    DataType::UInt8,
    DataType::UInt16,
    DataType::UInt32,
    DataType::UInt64,
    DataType::Float32,
    DataType::Float64,
    DataType::String,
];

impl DataType {
    /// Returns the name.
    #[must_use]
    pub fn name(&self) -> String {
        self.to_string()
    }

    /// Create a data type from its name.
    ///
    /// # Errors
    /// Returns [`UnsupportedDataTypeError`] if `name` is not a known data type.
    pub fn from_name(name: &str) -> Result<Self, UnsupportedDataTypeError> {
        ALL.into_iter()
            .find(|data_type| data_type.to_string() == name)
            .ok_or_else(|| UnsupportedDataTypeError(name.to_string()))
    }

    /// Returns the [`DataTypeSize`].
    #[must_use]
    pub const fn size(&self) -> DataTypeSize {
        match self {
            Self::Bool | Self::Int8 | Self::UInt8 => DataTypeSize::Fixed(1),
            Self::Int16 | Self::UInt16 => DataTypeSize::Fixed(2),
            Self::Int32 | Self::UInt32 | Self::Float32 => DataTypeSize::Fixed(4),
            Self::Int64 | Self::UInt64 | Self::Float64 => DataTypeSize::Fixed(8),
            Self::String => DataTypeSize::Variable,
        }
    }

    /// Returns the size in bytes of a fixed-size data type, otherwise returns [`None`].
    #[must_use]
    pub const fn fixed_size(&self) -> Option<usize> {
        match self.size() {
            DataTypeSize::Fixed(size) => Some(size),
            DataTypeSize::Variable => None,
        }
    }
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DataType {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let name = String::deserialize(d)?;
        Self::from_name(&name).map_err(serde::de::Error::custom)
    }
}
