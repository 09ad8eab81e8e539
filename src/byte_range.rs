//! Byte ranges.
//!
//! A [`ByteRange`] is an offset into a stored value with an optional length, which if omitted means to read all remaining bytes.
//!
//! [`extract_byte_ranges`] is a convenience function for extracting byte ranges from a slice of bytes.
//! [`coalesce_byte_ranges`] merges adjacent ranges, so that a contiguous run of elements can be fetched with one request.

use std::ops::Range;

use thiserror::Error;

/// A byte offset.
pub type ByteOffset = u64;

/// A byte length.
pub type ByteLength = u64;

/// A byte range relative to the start of a value.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct ByteRange {
    offset: ByteOffset,
    length: Option<ByteLength>,
}

impl ByteRange {
    /// Create a byte range of `length` bytes starting at `offset`.
    #[must_use]
    pub const fn new(offset: ByteOffset, length: ByteLength) -> Self {
        Self {
            offset,
            length: Some(length),
        }
    }

    /// Create a byte range from `offset` to the end of the value.
    #[must_use]
    pub const fn from_offset(offset: ByteOffset) -> Self {
        Self {
            offset,
            length: None,
        }
    }

    /// Return the offset of the byte range.
    #[must_use]
    pub const fn offset(&self) -> ByteOffset {
        self.offset
    }

    /// Return the explicit length of the byte range, if it has one.
    #[must_use]
    pub const fn explicit_length(&self) -> Option<ByteLength> {
        self.length
    }

    /// Return the exclusive end of a byte range. `size` is the size of the entire value.
    #[must_use]
    pub fn end(&self, size: u64) -> u64 {
        self.length.map_or(size, |length| self.offset + length)
    }

    /// Return the length of a byte range. `size` is the size of the entire value.
    #[must_use]
    pub fn length(&self, size: u64) -> u64 {
        self.length.unwrap_or_else(|| size.saturating_sub(self.offset))
    }

    /// Convert the byte range to a [`Range<u64>`].
    #[must_use]
    pub fn to_range(&self, size: u64) -> Range<u64> {
        self.offset..self.end(size)
    }

    /// Convert the byte range to a [`Range<usize>`].
    ///
    /// # Errors
    /// Returns [`InvalidByteRangeError`] if the range is not within a value of length `size`.
    pub fn to_range_usize(&self, size: u64) -> Result<Range<usize>, InvalidByteRangeError> {
        if self.end(size) > size || self.offset > size {
            return Err(InvalidByteRangeError::new(*self, size));
        }
        let start =
            usize::try_from(self.offset).map_err(|_| InvalidByteRangeError::new(*self, size))?;
        let end =
            usize::try_from(self.end(size)).map_err(|_| InvalidByteRangeError::new(*self, size))?;
        Ok(start..end)
    }
}

impl std::fmt::Display for ByteRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            f,
            "{}..{}",
            if self.offset == 0 {
                String::new()
            } else {
                self.offset.to_string()
            },
            self.length
                .map_or(String::new(), |length| (self.offset + length).to_string())
        )
    }
}

/// An invalid byte range error.
#[derive(Copy, Clone, Debug, Error)]
#[error("invalid byte range {0} for bytes of length {1}")]
pub struct InvalidByteRangeError(ByteRange, u64);

impl InvalidByteRangeError {
    /// Create a new [`InvalidByteRangeError`].
    #[must_use]
    pub fn new(byte_range: ByteRange, bytes_len: u64) -> Self {
        Self(byte_range, bytes_len)
    }
}

/// Extract byte ranges from bytes.
///
/// # Errors
/// Returns [`InvalidByteRangeError`] if any bytes are requested beyond the end of `bytes`.
pub fn extract_byte_ranges(
    bytes: &[u8],
    byte_ranges: &[ByteRange],
) -> Result<Vec<Vec<u8>>, InvalidByteRangeError> {
    let size = bytes.len() as u64;
    byte_ranges
        .iter()
        .map(|byte_range| Ok(bytes[byte_range.to_range_usize(size)?].to_vec()))
        .collect()
}

/// Merge byte ranges that are directly adjacent, preserving their order.
///
/// Every input range must have an explicit length.
/// Returns the merged ranges and, for each merged range, how many input ranges it covers.
#[must_use]
pub fn coalesce_byte_ranges(byte_ranges: &[ByteRange]) -> Vec<(ByteRange, usize)> {
    let mut out: Vec<(ByteRange, usize)> = Vec::with_capacity(byte_ranges.len());
    for byte_range in byte_ranges {
        if let (Some((last, count)), Some(length)) = (out.last_mut(), byte_range.length) {
            if let Some(last_length) = last.length {
                if last.offset + last_length == byte_range.offset {
                    *last = ByteRange::new(last.offset, last_length + length);
                    *count += 1;
                    continue;
                }
            }
        }
        out.push((*byte_range, 1));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_ranges() {
        let byte_range = ByteRange::from_offset(1);
        assert_eq!(byte_range.to_range(10), 1..10);
        assert_eq!(byte_range.length(10), 9);
        assert_eq!(byte_range.offset(), 1);

        let byte_range = ByteRange::new(1, 5);
        assert_eq!(byte_range.to_range(10), 1..6);
        assert_eq!(byte_range.to_range_usize(10).unwrap(), 1..6);
        assert_eq!(byte_range.length(10), 5);
        assert!(byte_range.to_range_usize(2).is_err());

        assert!(extract_byte_ranges(&[1, 2, 3], &[ByteRange::new(1, 2)]).is_ok());
        let bytes = extract_byte_ranges(&[1, 2, 3], &[ByteRange::new(1, 4)]);
        assert!(bytes.is_err());
        assert_eq!(
            bytes.unwrap_err().to_string(),
            "invalid byte range 1..5 for bytes of length 3"
        );
    }

    #[test]
    fn byte_range_display() {
        assert_eq!(format!("{}", ByteRange::from_offset(0)), "..");
        assert_eq!(format!("{}", ByteRange::from_offset(5)), "5..");
        assert_eq!(format!("{}", ByteRange::new(0, 5)), "..5");
        assert_eq!(format!("{}", ByteRange::new(2, 3)), "2..5");
    }

    #[test]
    fn byte_ranges_coalesce() {
        let ranges = [
            ByteRange::new(0, 4),
            ByteRange::new(4, 4),
            ByteRange::new(12, 4),
            ByteRange::new(16, 2),
        ];
        assert_eq!(
            coalesce_byte_ranges(&ranges),
            vec![(ByteRange::new(0, 8), 2), (ByteRange::new(12, 6), 2)]
        );
        assert!(coalesce_byte_ranges(&[]).is_empty());
    }
}
