//! A filesystem store.

use std::{
    collections::HashMap,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::{
    byte_range::ByteRange,
    storage::{
        Bytes, ReadableStorageTraits, StorageError, StoreKey, StorePrefix, WritableStorageTraits,
    },
};

/// A synchronous file system store.
///
/// Each [`StoreKey`] maps to a file below the base path, so the chunk `mnist/image/c/2/0/0` is the file `<base>/mnist/image/c/2/0/0`.
/// Reads and writes of the same key are serialised with a per-key lock.
#[derive(Debug)]
pub struct FilesystemStore {
    base_path: PathBuf,
    readonly: bool,
    files: Mutex<HashMap<StoreKey, Arc<RwLock<()>>>>,
}

impl FilesystemStore {
    /// Create a new file system store at a given `base_path`.
    ///
    /// # Errors
    /// Returns a [`FilesystemStoreCreateError`] if `base_directory`:
    ///   - is not valid, or
    ///   - it points to an existing file rather than a directory.
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, FilesystemStoreCreateError> {
        let base_path = base_path.as_ref().to_path_buf();
        if base_path.to_str().is_none() {
            return Err(FilesystemStoreCreateError::InvalidBasePath(base_path));
        }

        let readonly = if base_path.exists() {
            let md = std::fs::metadata(&base_path)?;
            if !md.is_dir() {
                return Err(FilesystemStoreCreateError::InvalidBasePath(base_path));
            }
            md.permissions().readonly()
        } else {
            // the path does not exist, so try and create it. If this succeeds, the filesystem is not read only
            std::fs::create_dir_all(&base_path)?;
            false
        };

        Ok(Self {
            base_path,
            readonly,
            files: Mutex::default(),
        })
    }

    /// Maps a [`StoreKey`] to a filesystem [`PathBuf`].
    #[must_use]
    pub fn key_to_fspath(&self, key: &StoreKey) -> PathBuf {
        let mut path = self.base_path.clone();
        path.push(key.as_str());
        path
    }

    /// Maps a store [`StorePrefix`] to a filesystem [`PathBuf`].
    #[must_use]
    pub fn prefix_to_fs_path(&self, prefix: &StorePrefix) -> PathBuf {
        let mut path = self.base_path.clone();
        path.push(prefix.as_str());
        path
    }

    fn get_file_mutex(&self, key: &StoreKey) -> Arc<RwLock<()>> {
        self.files
            .lock()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(RwLock::default()))
            .clone()
    }

    fn not_found_ok(result: std::io::Result<()>) -> Result<(), StorageError> {
        match result {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

impl ReadableStorageTraits for FilesystemStore {
    fn get_partial_values_key(
        &self,
        key: &StoreKey,
        byte_ranges: &[ByteRange],
    ) -> Result<Option<Vec<Bytes>>, StorageError> {
        let file = self.get_file_mutex(key);
        let _lock = file.read();

        let mut file = match File::open(self.key_to_fspath(key)) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let mut out = Vec::with_capacity(byte_ranges.len());
        for byte_range in byte_ranges {
            file.seek(SeekFrom::Start(byte_range.offset()))?;
            let buffer = if let Some(length) = byte_range.explicit_length() {
                let length = usize::try_from(length)
                    .map_err(|_| StorageError::Other(format!("byte range {byte_range} too large")))?;
                let mut buffer = vec![0; length];
                file.read_exact(&mut buffer)?;
                buffer
            } else {
                let mut buffer = Vec::new();
                file.read_to_end(&mut buffer)?;
                buffer
            };
            out.push(Bytes::from(buffer));
        }

        Ok(Some(out))
    }

    fn size_key(&self, key: &StoreKey) -> Result<Option<u64>, StorageError> {
        match std::fs::metadata(self.key_to_fspath(key)) {
            Ok(metadata) if metadata.is_file() => Ok(Some(metadata.len())),
            Ok(_) => Ok(None),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

impl WritableStorageTraits for FilesystemStore {
    fn write(&self, key: &StoreKey, value: Bytes) -> Result<(), StorageError> {
        if self.readonly {
            return Err(StorageError::ReadOnly);
        }

        let file = self.get_file_mutex(key);
        let _lock = file.write();

        let key_path = self.key_to_fspath(key);
        if let Some(parent) = key_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(key_path)?;
        file.write_all(&value)?;
        Ok(())
    }

    fn delete(&self, key: &StoreKey) -> Result<(), StorageError> {
        if self.readonly {
            return Err(StorageError::ReadOnly);
        }

        let file = self.get_file_mutex(key);
        let _lock = file.write();
        Self::not_found_ok(std::fs::remove_file(self.key_to_fspath(key)))
    }

    fn delete_prefix(&self, prefix: &StorePrefix) -> Result<(), StorageError> {
        if self.readonly {
            return Err(StorageError::ReadOnly);
        }

        let mut files = self.files.lock(); // lock all operations
        files.retain(|key, _| !key.has_prefix(prefix));
        if prefix.as_str().is_empty() {
            for entry in std::fs::read_dir(&self.base_path)? {
                let path = entry?.path();
                if path.is_dir() {
                    Self::not_found_ok(std::fs::remove_dir_all(path))?;
                } else {
                    Self::not_found_ok(std::fs::remove_file(path))?;
                }
            }
            Ok(())
        } else {
            Self::not_found_ok(std::fs::remove_dir_all(self.prefix_to_fs_path(prefix)))
        }
    }
}

/// A filesystem store creation error.
#[derive(Debug, Error)]
pub enum FilesystemStoreCreateError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// The path is not valid on this system.
    #[error("base path {0} is not valid")]
    InvalidBasePath(PathBuf),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn filesystem_write_read() -> Result<(), Box<dyn Error>> {
        let path = tempfile::TempDir::new()?;
        let store = FilesystemStore::new(path.path())?;
        let key: StoreKey = "a/b/c".try_into()?;
        assert!(store.get(&key)?.is_none());
        assert!(!store.exists(&key)?);

        store.write(&key, Bytes::from_static(&[0, 1, 2, 3, 4]))?;
        assert!(path.path().join("a/b/c").is_file());
        assert_eq!(store.get(&key)?.unwrap().as_ref(), &[0, 1, 2, 3, 4]);
        assert_eq!(store.read_range(&key, 1, 3)?.unwrap().as_ref(), &[1, 2, 3]);
        assert!(store.read_range(&key, 4, 2).is_err());
        assert_eq!(store.size_key(&key)?, Some(5));

        // a prefix is not a value
        assert!(!store.exists(&"a/b".try_into()?)?);

        store.write(&key, Bytes::from_static(&[9]))?;
        assert_eq!(store.get(&key)?.unwrap().as_ref(), &[9]);
        Ok(())
    }

    #[test]
    fn filesystem_delete() -> Result<(), Box<dyn Error>> {
        let path = tempfile::TempDir::new()?;
        let store = FilesystemStore::new(path.path())?;
        store.write(&"a/b".try_into()?, Bytes::from_static(&[0]))?;
        store.write(&"a/c/d".try_into()?, Bytes::from_static(&[0]))?;
        store.write(&"e".try_into()?, Bytes::from_static(&[0]))?;

        store.delete(&"a/b".try_into()?)?;
        store.delete(&"a/b".try_into()?)?;
        assert!(!store.exists(&"a/b".try_into()?)?);

        store.delete_prefix(&"a/".try_into()?)?;
        assert!(!store.exists(&"a/c/d".try_into()?)?);
        assert!(store.exists(&"e".try_into()?)?);

        store.delete_prefix(&StorePrefix::root())?;
        assert!(!store.exists(&"e".try_into()?)?);
        assert!(path.path().exists());
        Ok(())
    }

    #[test]
    fn filesystem_invalid_base_path() -> Result<(), Box<dyn Error>> {
        let path = tempfile::TempDir::new()?;
        let file = path.path().join("file");
        std::fs::write(&file, [0u8])?;
        assert!(FilesystemStore::new(&file).is_err());
        Ok(())
    }
}
