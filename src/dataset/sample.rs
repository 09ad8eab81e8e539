use std::{collections::BTreeMap, sync::Arc};

use crate::{
    array::{ArrayBytes, ArrayError, ArrayShape, DataType, DataTypeSize, Element, SchemaMismatchError},
    metadata::FieldMetadata,
};

type ElementsFn = dyn Fn(&DataType) -> Result<ArrayBytes<'static>, ArrayError> + Send + Sync;

#[derive(Clone)]
enum SampleData {
    /// Raw elements of a fixed size data type, in native endianness.
    Bytes(Vec<u8>),
    /// Typed elements, converted once the field data type is known.
    Elements(Arc<ElementsFn>),
}

/// The value of one field of a [`Sample`].
#[derive(Clone)]
pub struct SampleValue {
    shape: ArrayShape,
    data: SampleData,
}

impl core::fmt::Debug for SampleValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let data = match &self.data {
            SampleData::Bytes(bytes) => format!("{} bytes", bytes.len()),
            SampleData::Elements(_) => "elements".to_string(),
        };
        f.debug_struct("SampleValue")
            .field("shape", &self.shape)
            .field("data", &data)
            .finish()
    }
}

impl SampleValue {
    /// The sample shape.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// Convert the value to the elements of one sample of `field`.
    ///
    /// # Errors
    /// Returns a [`SchemaMismatchError`] if the shape, data type or number of elements does not match the field.
    pub(crate) fn to_array_bytes(
        &self,
        field: &FieldMetadata,
    ) -> Result<ArrayBytes<'static>, SchemaMismatchError> {
        let mismatch = |message: String| SchemaMismatchError::new(&field.name, message);
        if self.shape != field.sample_shape {
            return Err(mismatch(format!(
                "sample shape {:?} is not {:?}",
                self.shape, field.sample_shape
            )));
        }
        let bytes = match &self.data {
            SampleData::Bytes(bytes) => {
                if field.data_type.size() == DataTypeSize::Variable {
                    return Err(mismatch(format!(
                        "raw bytes cannot hold {} elements",
                        field.data_type
                    )));
                }
                ArrayBytes::new_flen(bytes.clone())
            }
            SampleData::Elements(elements) => elements(&field.data_type)
                .map_err(|err| mismatch(format!("{err} {}", field.data_type)))?,
        };
        let num_elements = self.shape.iter().product::<u64>();
        bytes
            .validate(num_elements, field.data_type.size())
            .map_err(|err| mismatch(err.to_string()))?;
        Ok(bytes)
    }
}

/// One sample to append to a [`Dataset`](super::Dataset): a value for every field.
///
/// ```rust
/// # use chunkhub::dataset::Sample;
/// let sample = Sample::new()
///     .with_bytes("image", vec![2, 2], vec![0, 64, 128, 255])
///     .with_elements("boxes", vec![1, 4], &[0.1f32, 0.1, 0.5, 0.5])
///     .with_text("caption", "a cat");
/// assert_eq!(sample.len(), 3);
/// ```
#[derive(Clone, Debug, Default)]
pub struct Sample {
    values: BTreeMap<String, SampleValue>,
}

impl Sample {
    /// Create an empty sample.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set field `name` to raw `bytes` with shape `shape`.
    ///
    /// The bytes are the elements of the field data type in native endianness, so this suits `uint8` fields such as images.
    #[must_use]
    pub fn with_bytes(mut self, name: &str, shape: ArrayShape, bytes: Vec<u8>) -> Self {
        self.values.insert(
            name.to_string(),
            SampleValue {
                shape,
                data: SampleData::Bytes(bytes),
            },
        );
        self
    }

    /// Set field `name` to `elements` with shape `shape`.
    ///
    /// The element type must match the field data type.
    #[must_use]
    pub fn with_elements<T: Element + Send + Sync + 'static>(
        mut self,
        name: &str,
        shape: ArrayShape,
        elements: &[T],
    ) -> Self {
        let elements = elements.to_vec();
        let convert = move |data_type: &DataType| {
            T::into_array_bytes(data_type, &elements).map(ArrayBytes::into_owned)
        };
        self.values.insert(
            name.to_string(),
            SampleValue {
                shape,
                data: SampleData::Elements(Arc::new(convert)),
            },
        );
        self
    }

    /// Set the text field `name` to `text`.
    #[must_use]
    pub fn with_text(self, name: &str, text: &str) -> Self {
        self.with_elements(name, vec![], &[text.to_string()])
    }

    /// Return the value of field `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SampleValue> {
        self.values.get(name)
    }

    /// Iterate over the field names of the sample in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// The number of fields in the sample.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the sample has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
