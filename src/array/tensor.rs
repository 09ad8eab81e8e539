use super::{ArrayBytes, ArrayError, ArrayShape, DataType, ElementOwned};

/// A dense array materialised from a [`TensorView`](super::TensorView).
///
/// Elements are stored in row-major order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tensor {
    shape: ArrayShape,
    data_type: DataType,
    bytes: ArrayBytes<'static>,
}

impl Tensor {
    /// Create a new tensor.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if `bytes` does not hold exactly the elements of `shape` with `data_type`.
    pub fn new(
        shape: ArrayShape,
        data_type: DataType,
        bytes: ArrayBytes<'static>,
    ) -> Result<Self, ArrayError> {
        let num_elements = shape.iter().product::<u64>();
        bytes.validate(num_elements, data_type.size())?;
        Ok(Self {
            shape,
            data_type,
            bytes,
        })
    }

    /// The tensor shape.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// The tensor data type.
    #[must_use]
    pub const fn data_type(&self) -> &DataType {
        &self.data_type
    }

    /// The number of elements.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.shape.iter().product()
    }

    /// The element bytes.
    #[must_use]
    pub fn bytes(&self) -> &ArrayBytes<'static> {
        &self.bytes
    }

    /// Convert the tensor into its element bytes.
    #[must_use]
    pub fn into_bytes(self) -> ArrayBytes<'static> {
        self.bytes
    }

    /// Convert the tensor into a vector of elements.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if `T` is incompatible with the data type.
    pub fn to_elements<T: ElementOwned>(&self) -> Result<Vec<T>, ArrayError> {
        T::from_array_bytes(&self.data_type, self.bytes.clone())
    }

    /// Convert a text tensor into a vector of strings.
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if the data type is not [`DataType::String`] or an element is not valid UTF-8.
    pub fn to_strings(&self) -> Result<Vec<String>, ArrayError> {
        self.to_elements::<String>()
    }

    #[cfg(feature = "ndarray")]
    /// Convert the tensor into an [`ndarray::ArrayD`].
    ///
    /// # Errors
    /// Returns an [`ArrayError`] if `T` is incompatible with the data type.
    pub fn to_ndarray<T: ElementOwned>(&self) -> Result<ndarray::ArrayD<T>, ArrayError> {
        let elements = self.to_elements::<T>()?;
        let shape = self
            .shape
            .iter()
            .map(|&size| usize::try_from(size).map_err(|_| ArrayError::InvalidElementValue))
            .collect::<Result<Vec<_>, _>>()?;
        ndarray::ArrayD::<T>::from_shape_vec(shape, elements)
            .map_err(|_| ArrayError::IncompatibleElementType)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tensor_elements() {
        let tensor = Tensor::new(
            vec![2, 2],
            DataType::UInt16,
            ArrayBytes::new_flen(bytemuck::cast_slice(&[1u16, 2, 3, 4]).to_vec()),
        )
        .unwrap();
        assert_eq!(tensor.num_elements(), 4);
        assert_eq!(tensor.to_elements::<u16>().unwrap(), vec![1, 2, 3, 4]);
        assert!(tensor.to_elements::<f32>().is_err());
        #[cfg(feature = "ndarray")]
        assert_eq!(
            tensor.to_ndarray::<u16>().unwrap(),
            ndarray::array![[1u16, 2], [3, 4]].into_dyn()
        );
        assert!(Tensor::new(vec![3], DataType::UInt16, ArrayBytes::new_flen(vec![0u8; 4])).is_err());
    }

    #[test]
    fn tensor_strings() {
        let tensor = Tensor::new(
            vec![2],
            DataType::String,
            ArrayBytes::from_elements([b"hello".as_slice(), b"world".as_slice()]),
        )
        .unwrap();
        assert_eq!(tensor.to_strings().unwrap(), vec!["hello", "world"]);
    }
}
