use ArrayError::IncompatibleElementType as IET;

use super::{ArrayBytes, ArrayError, DataType};

/// A trait representing an array element type.
pub trait Element: Sized + Clone {
    /// Validate the data type.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the data type is incompatible with [`Element`].
    fn validate_data_type(data_type: &DataType) -> Result<(), ArrayError>;

    /// Convert a slice of elements into [`ArrayBytes`].
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the data type is incompatible with [`Element`].
    fn into_array_bytes<'a>(
        data_type: &DataType,
        elements: &'a [Self],
    ) -> Result<ArrayBytes<'a>, ArrayError>;
}

/// A trait representing an owned array element type.
pub trait ElementOwned: Element {
    /// Convert bytes into a [`Vec<ElementOwned>`].
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the data type is incompatible with [`Element`] or an element value is invalid.
    fn from_array_bytes(data_type: &DataType, bytes: ArrayBytes<'_>)
        -> Result<Vec<Self>, ArrayError>;
}

impl Element for bool {
    fn validate_data_type(data_type: &DataType) -> Result<(), ArrayError> {
        (data_type == &DataType::Bool).then_some(()).ok_or(IET)
    }

    fn into_array_bytes<'a>(
        data_type: &DataType,
        elements: &'a [Self],
    ) -> Result<ArrayBytes<'a>, ArrayError> {
        Self::validate_data_type(data_type)?;
        let bytes: Vec<u8> = elements.iter().map(|&b| u8::from(b)).collect();
        Ok(bytes.into())
    }
}

impl ElementOwned for bool {
    fn from_array_bytes(
        data_type: &DataType,
        bytes: ArrayBytes<'_>,
    ) -> Result<Vec<Self>, ArrayError> {
        Self::validate_data_type(data_type)?;
        let bytes = bytes.into_fixed()?;
        if bytes.iter().all(|&u| u <= 1) {
            Ok(bytes.iter().map(|&u| u == 1).collect())
        } else {
            Err(ArrayError::InvalidElementValue)
        }
    }
}

macro_rules! impl_element_pod {
    ($raw_type:ty, $pattern:pat $(,)?) => {
        impl Element for $raw_type {
            fn validate_data_type(data_type: &DataType) -> Result<(), ArrayError> {
                if matches!(data_type, $pattern) {
                    Ok(())
                } else {
                    Err(IET)
                }
            }

            fn into_array_bytes<'a>(
                data_type: &DataType,
                elements: &'a [Self],
            ) -> Result<ArrayBytes<'a>, ArrayError> {
                Self::validate_data_type(data_type)?;
                Ok(bytemuck::cast_slice::<Self, u8>(elements).into())
            }
        }

        impl ElementOwned for $raw_type {
            fn from_array_bytes(
                data_type: &DataType,
                bytes: ArrayBytes<'_>,
            ) -> Result<Vec<Self>, ArrayError> {
                Self::validate_data_type(data_type)?;
                let bytes = bytes.into_fixed()?;
                if bytes.len() % core::mem::size_of::<Self>() != 0 {
                    return Err(ArrayError::InvalidElementValue);
                }
                Ok(bytemuck::pod_collect_to_vec::<u8, Self>(&bytes))
            }
        }
    };
}

impl_element_pod!(i8, DataType::Int8);
impl_element_pod!(i16, DataType::Int16);
impl_element_pod!(i32, DataType::Int32);
impl_element_pod!(i64, DataType::Int64);
impl_element_pod!(u8, DataType::UInt8);
impl_element_pod!(u16, DataType::UInt16);
impl_element_pod!(u32, DataType::UInt32);
impl_element_pod!(u64, DataType::UInt64);
impl_element_pod!(f32, DataType::Float32);
impl_element_pod!(f64, DataType::Float64);

impl Element for &str {
    fn validate_data_type(data_type: &DataType) -> Result<(), ArrayError> {
        (data_type == &DataType::String).then_some(()).ok_or(IET)
    }

    fn into_array_bytes<'a>(
        data_type: &DataType,
        elements: &'a [Self],
    ) -> Result<ArrayBytes<'a>, ArrayError> {
        Self::validate_data_type(data_type)?;
        Ok(ArrayBytes::from_elements(
            elements.iter().map(|element| element.as_bytes()),
        ))
    }
}

impl Element for String {
    fn validate_data_type(data_type: &DataType) -> Result<(), ArrayError> {
        (data_type == &DataType::String).then_some(()).ok_or(IET)
    }

    fn into_array_bytes<'a>(
        data_type: &DataType,
        elements: &'a [Self],
    ) -> Result<ArrayBytes<'a>, ArrayError> {
        Self::validate_data_type(data_type)?;
        Ok(ArrayBytes::from_elements(
            elements.iter().map(String::as_bytes),
        ))
    }
}

impl ElementOwned for String {
    fn from_array_bytes(
        data_type: &DataType,
        bytes: ArrayBytes<'_>,
    ) -> Result<Vec<Self>, ArrayError> {
        Self::validate_data_type(data_type)?;
        let (bytes, offsets) = bytes.into_variable()?;
        offsets
            .windows(2)
            .map(|w| {
                let element = bytes
                    .get(w[0]..w[1])
                    .ok_or(ArrayError::InvalidElementValue)?;
                std::str::from_utf8(element)
                    .map(str::to_string)
                    .map_err(|_| ArrayError::InvalidElementValue)
            })
            .collect()
    }
}
