use std::borrow::Cow;

use super::{
    codec::{CodecError, CorruptChunkError},
    DataTypeSize,
};

/// Array element bytes.
pub type RawBytes<'a> = Cow<'a, [u8]>;

/// Array element byte offsets.
pub type RawBytesOffsets<'a> = Cow<'a, [usize]>;

/// Fixed or variable length array bytes.
///
/// Fixed length elements are stored contiguously in native endianness.
/// Variable length elements are stored contiguously, and element `i` spans `offsets[i]..offsets[i + 1]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ArrayBytes<'a> {
    /// Bytes for a fixed length array.
    Fixed(RawBytes<'a>),
    /// Bytes and element byte offsets for a variable length array.
    Variable(RawBytes<'a>, RawBytesOffsets<'a>),
}

impl<'a> ArrayBytes<'a> {
    /// Create a new fixed length array bytes from `bytes`.
    pub fn new_flen(bytes: impl Into<RawBytes<'a>>) -> Self {
        Self::Fixed(bytes.into())
    }

    /// Create a new variable length array bytes from `bytes` and `offsets`.
    pub fn new_vlen(
        bytes: impl Into<RawBytes<'a>>,
        offsets: impl Into<RawBytesOffsets<'a>>,
    ) -> Self {
        Self::Variable(bytes.into(), offsets.into())
    }

    /// Create variable length array bytes from a sequence of elements.
    pub fn from_elements<'e>(elements: impl IntoIterator<Item = &'e [u8]>) -> ArrayBytes<'static> {
        let mut bytes = Vec::new();
        let mut offsets = vec![0];
        for element in elements {
            bytes.extend_from_slice(element);
            offsets.push(bytes.len());
        }
        ArrayBytes::new_vlen(bytes, offsets)
    }

    /// Convert the array bytes into fixed size bytes.
    ///
    /// # Errors
    /// Returns a [`CodecError::ExpectedFixedLengthBytes`] if the bytes are variable length.
    pub fn into_fixed(self) -> Result<RawBytes<'a>, CodecError> {
        match self {
            Self::Fixed(bytes) => Ok(bytes),
            Self::Variable(_, _) => Err(CodecError::ExpectedFixedLengthBytes),
        }
    }

    /// Convert the array bytes into variable sized bytes and element byte offsets.
    ///
    /// # Errors
    /// Returns a [`CodecError::ExpectedVariableLengthBytes`] if the bytes are fixed length.
    pub fn into_variable(self) -> Result<(RawBytes<'a>, RawBytesOffsets<'a>), CodecError> {
        match self {
            Self::Fixed(_) => Err(CodecError::ExpectedVariableLengthBytes),
            Self::Variable(bytes, offsets) => Ok((bytes, offsets)),
        }
    }

    /// Returns the size (in bytes) of the underlying element bytes.
    ///
    /// This only considers the size of the element bytes, and does not include the element offsets for a variable sized array.
    #[must_use]
    pub fn size(&self) -> usize {
        match self {
            Self::Fixed(bytes) | Self::Variable(bytes, _) => bytes.len(),
        }
    }

    /// Returns the approximate memory held by the array bytes, including variable length offsets.
    #[must_use]
    pub fn memory_size(&self) -> usize {
        match self {
            Self::Fixed(bytes) => bytes.len(),
            Self::Variable(bytes, offsets) => {
                bytes.len() + offsets.len() * std::mem::size_of::<usize>()
            }
        }
    }

    /// Return the byte offsets for variable sized bytes. Returns [`None`] for fixed size bytes.
    #[must_use]
    pub fn offsets(&self) -> Option<&RawBytesOffsets<'a>> {
        match self {
            Self::Fixed(_) => None,
            Self::Variable(_, offsets) => Some(offsets),
        }
    }

    /// Returns the bytes of element `index`, given the data type size.
    ///
    /// Returns [`None`] if `index` is out of bounds.
    #[must_use]
    pub fn element(&self, index: usize, data_type_size: DataTypeSize) -> Option<&[u8]> {
        match (self, data_type_size) {
            (Self::Fixed(bytes), DataTypeSize::Fixed(size)) => {
                bytes.get(index * size..(index + 1) * size)
            }
            (Self::Variable(bytes, offsets), DataTypeSize::Variable) => {
                let start = *offsets.get(index)?;
                let end = *offsets.get(index + 1)?;
                bytes.get(start..end)
            }
            _ => None,
        }
    }

    /// Convert into owned [`ArrayBytes<'_>`].
    #[must_use]
    pub fn into_owned<'b>(self) -> ArrayBytes<'b> {
        match self {
            Self::Fixed(bytes) => ArrayBytes::<'b>::new_flen(bytes.into_owned()),
            Self::Variable(bytes, offsets) => {
                ArrayBytes::<'b>::new_vlen(bytes.into_owned(), offsets.into_owned())
            }
        }
    }

    /// Validate that the array bytes hold `num_elements` elements of a data type with size `data_type_size`.
    ///
    /// For a fixed-length array, check it matches the expected size.
    /// For a variable-length array, check that there are `num_elements + 1` offsets, the offsets are monotonically increasing, and the largest offset is equal to the array length.
    ///
    /// # Errors
    /// Returns a [`CodecError`] if the array bytes are not valid.
    pub fn validate(
        &self,
        num_elements: u64,
        data_type_size: DataTypeSize,
    ) -> Result<(), CodecError> {
        match (self, data_type_size) {
            (Self::Fixed(bytes), DataTypeSize::Fixed(size)) => {
                let expected = num_elements * size as u64;
                if bytes.len() as u64 == expected {
                    Ok(())
                } else {
                    Err(CorruptChunkError::new(format!(
                        "got {} bytes, expected {expected}",
                        bytes.len()
                    ))
                    .into())
                }
            }
            (Self::Variable(bytes, offsets), DataTypeSize::Variable) => {
                if offsets.len() as u64 != num_elements + 1 {
                    return Err(CorruptChunkError::new(format!(
                        "got {} offsets, expected {}",
                        offsets.len(),
                        num_elements + 1
                    ))
                    .into());
                }
                let monotonic = offsets.windows(2).all(|w| w[1] >= w[0]);
                if !monotonic || offsets.first() != Some(&0) || offsets.last() != Some(&bytes.len())
                {
                    return Err(CorruptChunkError::new("invalid variable length offsets").into());
                }
                Ok(())
            }
            (Self::Fixed(_), DataTypeSize::Variable) => {
                Err(CodecError::ExpectedVariableLengthBytes)
            }
            (Self::Variable(_, _), DataTypeSize::Fixed(_)) => {
                Err(CodecError::ExpectedFixedLengthBytes)
            }
        }
    }
}

impl<'a> From<&'a [u8]> for ArrayBytes<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        ArrayBytes::new_flen(bytes)
    }
}

impl From<Vec<u8>> for ArrayBytes<'_> {
    fn from(bytes: Vec<u8>) -> Self {
        ArrayBytes::new_flen(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_bytes_validate() {
        let bytes = ArrayBytes::new_flen(vec![0u8; 8]);
        assert!(bytes.validate(4, DataTypeSize::Fixed(2)).is_ok());
        assert!(bytes.validate(3, DataTypeSize::Fixed(2)).is_err());
        assert!(bytes.validate(8, DataTypeSize::Variable).is_err());

        let bytes = ArrayBytes::from_elements([b"ab".as_slice(), b"".as_slice(), b"cde".as_slice()]);
        assert_eq!(bytes.offsets().unwrap().as_ref(), &[0, 2, 2, 5]);
        assert!(bytes.validate(3, DataTypeSize::Variable).is_ok());
        assert!(bytes.validate(2, DataTypeSize::Variable).is_err());

        let bytes = ArrayBytes::new_vlen(vec![0u8; 4], vec![0, 3, 2, 4]);
        assert!(bytes.validate(3, DataTypeSize::Variable).is_err());
    }

    #[test]
    fn array_bytes_element() {
        let bytes = ArrayBytes::from_elements([b"ab".as_slice(), b"".as_slice(), b"cde".as_slice()]);
        assert_eq!(bytes.element(2, DataTypeSize::Variable), Some(b"cde".as_slice()));
        assert_eq!(bytes.element(1, DataTypeSize::Variable), Some(b"".as_slice()));
        assert_eq!(bytes.element(3, DataTypeSize::Variable), None);

        let bytes = ArrayBytes::new_flen(vec![1u8, 2, 3, 4]);
        assert_eq!(bytes.element(1, DataTypeSize::Fixed(2)), Some([3u8, 4].as_slice()));
        assert_eq!(bytes.element(0, DataTypeSize::Variable), None);
        assert_eq!(bytes.memory_size(), 4);
    }
}
