//! Durable local key-value storage.
//!
//! One JSON file per key under a data directory. Holds the selected
//! branch, the guest cart, and the favorites backup. Values are small;
//! writes go through a temp file and rename so a crash never leaves a
//! half-written value behind.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Fixed storage keys used by the stores.
pub mod keys {
    /// Currently selected branch (JSON `Branch`).
    pub const SELECTED_BRANCH: &str = "selected_branch";
    /// Guest cart contents (JSON array of `CartItem`).
    pub const GUEST_CART: &str = "guest_cart";
    /// Favorites backup (JSON array of `ProductId`).
    pub const FAVORITES: &str = "favorites";
}

/// Errors from local storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value could not be (de)serialized.
    #[error("JSON error for key {key}: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Key contains characters that do not map to a file name.
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

/// JSON file-backed key-value store.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    dir: PathBuf,
}

impl LocalStorage {
    /// Open (creating if needed) a storage directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }

    /// Read and deserialize the value stored under `key`.
    ///
    /// Returns `Ok(None)` when the key has never been written.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or if the stored JSON is malformed.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let path = self.path_for(key)?;
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let value = serde_json::from_str(&raw).map_err(|source| StorageError::Json {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(value))
    }

    /// Serialize and store `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure or if the value cannot be serialized.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let raw = serde_json::to_vec_pretty(value).map_err(|source| StorageError::Json {
            key: key.to_string(),
            source,
        })?;
        write_atomically(&path, &raw)?;
        Ok(())
    }

    /// Delete the value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error on I/O failure other than the key being absent.
    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Write via a sibling temp file and rename into place.
fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}
