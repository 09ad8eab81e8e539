//! Chunk key encoding.
//!
//! The key for a chunk with grid indices (k, j, i, …) is formed by taking the initial prefix `c`, and appending for each dimension:
//! - the separator character, followed by,
//! - the ASCII decimal string representation of the chunk index within that dimension.
//!
//! The encoded key is relative to the field prefix, so chunk `[2, 0, 0]` of field `image` in dataset `mnist` is stored at `mnist/image/c/2/0/0`.

use derive_more::Display;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::storage::{StoreKey, StoreKeyError, StorePrefix};

/// A chunk key separator.
#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Debug, Display, Default)]
pub enum ChunkKeySeparator {
    /// The slash '/' character. Each chunk is stored in a nested directory.
    #[default]
    #[serde(rename = "/")]
    #[display("/")]
    Slash,
    /// The dot '.' character.
    #[serde(rename = ".")]
    #[display(".")]
    Dot,
}

/// A chunk key encoding.
#[derive(Serialize, Deserialize, Copy, Clone, Eq, PartialEq, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct ChunkKeyEncoding {
    separator: ChunkKeySeparator,
}

impl ChunkKeyEncoding {
    /// Create a new chunk key encoding with `separator`.
    #[must_use]
    pub const fn new(separator: ChunkKeySeparator) -> Self {
        Self { separator }
    }

    /// Return the separator.
    #[must_use]
    pub const fn separator(&self) -> ChunkKeySeparator {
        self.separator
    }

    /// Encode chunk grid indices into a key relative to the field prefix.
    #[must_use]
    pub fn encode(&self, chunk_indices: &[u64]) -> String {
        std::iter::once("c".to_string())
            .chain(chunk_indices.iter().map(ToString::to_string))
            .join(&self.separator.to_string())
    }

    /// Encode chunk grid indices into a store key under `field_prefix`.
    ///
    /// # Errors
    /// Returns a [`StoreKeyError`] if the resulting key is invalid.
    pub fn encode_key(
        &self,
        field_prefix: &StorePrefix,
        chunk_indices: &[u64],
    ) -> Result<StoreKey, StoreKeyError> {
        StoreKey::new(format!(
            "{}{}",
            field_prefix.as_str(),
            self.encode(chunk_indices)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_key_encoding_slash() {
        let encoding = ChunkKeyEncoding::default();
        assert_eq!(encoding.encode(&[2, 0, 0]), "c/2/0/0");
        assert_eq!(encoding.encode(&[7]), "c/7");
        let prefix = StorePrefix::new("mnist/image/").unwrap();
        assert_eq!(
            encoding.encode_key(&prefix, &[2, 0, 0]).unwrap().as_str(),
            "mnist/image/c/2/0/0"
        );
    }

    #[test]
    fn chunk_key_encoding_dot() {
        let encoding = ChunkKeyEncoding::new(ChunkKeySeparator::Dot);
        assert_eq!(encoding.encode(&[1, 23, 45]), "c.1.23.45");
        assert_eq!(
            serde_json::to_string(&encoding).unwrap(),
            r#"{"separator":"."}"#
        );
        let encoding: ChunkKeyEncoding = serde_json::from_str(r#"{"separator":"/"}"#).unwrap();
        assert_eq!(encoding.separator(), ChunkKeySeparator::Slash);
    }
}
