use derive_more::{Display, From};
use thiserror::Error;

/// A store prefix.
///
/// A prefix is either empty (the root) or a `/` terminated path, such as `mnist/image/`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub struct StorePrefix(String);

/// An invalid store prefix.
#[derive(Debug, Error, From)]
#[error("invalid store prefix {0}")]
pub struct StorePrefixError(String);

impl StorePrefix {
    /// Create a new store prefix from `prefix`.
    ///
    /// # Errors
    /// Returns [`StorePrefixError`] if `prefix` is not valid according to [`StorePrefix::validate`()].
    pub fn new(prefix: impl Into<String>) -> Result<Self, StorePrefixError> {
        let prefix = prefix.into();
        if Self::validate(&prefix) {
            Ok(Self(prefix))
        } else {
            Err(StorePrefixError(prefix))
        }
    }

    /// Create a store prefix from a `/` separated path such as `datasets/mnist`.
    ///
    /// Leading and trailing `/` are ignored, and an empty path is the root prefix.
    ///
    /// # Errors
    /// Returns [`StorePrefixError`] if the path has empty, `.` or `..` components.
    pub fn from_path(path: &str) -> Result<Self, StorePrefixError> {
        let path = path.trim_matches('/');
        if path.is_empty() {
            Ok(Self::root())
        } else {
            Self::new(format!("{path}/"))
        }
    }

    /// The root prefix.
    #[must_use]
    pub const fn root() -> Self {
        Self(String::new())
    }

    /// Extracts a string slice containing the prefix `String`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Validates a prefix.
    ///
    /// A prefix is empty, or a string ending with a trailing `/` whose components would be valid [store keys](super::StoreKey).
    #[must_use]
    pub fn validate(prefix: &str) -> bool {
        prefix.is_empty()
            || prefix
                .strip_suffix('/')
                .is_some_and(super::StoreKey::validate)
    }

    /// Return the prefix of a child path `name` under this prefix.
    ///
    /// # Errors
    /// Returns [`StorePrefixError`] if `name` is not a valid path component sequence.
    pub fn child(&self, name: &str) -> Result<Self, StorePrefixError> {
        Self::new(format!("{}{name}/", self.0))
    }
}

impl TryFrom<&str> for StorePrefix {
    type Error = StorePrefixError;

    fn try_from(prefix: &str) -> Result<Self, StorePrefixError> {
        Self::new(prefix)
    }
}
