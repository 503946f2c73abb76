use std::path::{Path, PathBuf};

use crate::core::errors::{PassrelayError, Result};
use crate::core::traits::storage::BlobStore;

/// Blob store that keeps each value in its own file under a base directory.
///
/// Storage keys are used as file names, so they must be simple names
/// without path separators; anything else is rejected to keep a corrupted
/// key from escaping the base directory.
#[derive(Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `dir`. The directory is created lazily on
    /// the first write.
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        if key.is_empty()
            || key.starts_with('.')
            || key.contains('/')
            || key.contains('\\')
            || key.contains("..")
        {
            return Err(PassrelayError::Storage {
                detail: format!("invalid storage key: '{key}'"),
            });
        }
        Ok(self.dir.join(key))
    }
}

impl BlobStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }
        let value = std::fs::read_to_string(&path).map_err(|e| PassrelayError::Storage {
            detail: format!("cannot read {}: {e}", path.display()),
        })?;
        Ok(Some(value))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(&path, value).map_err(|e| PassrelayError::Storage {
            detail: format!("cannot write {}: {e}", path.display()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("store"));
        (dir, store)
    }

    #[test]
    fn get_missing_key_returns_none() {
        let (_dir, store) = temp_store();
        assert!(store.get("passrelay-keys").unwrap().is_none());
    }

    #[test]
    fn set_then_get_round_trips() {
        let (_dir, store) = temp_store();
        store.set("passrelay-keys", "[\"a\"]").unwrap();
        assert_eq!(store.get("passrelay-keys").unwrap().as_deref(), Some("[\"a\"]"));
    }

    #[test]
    fn set_overwrites_entirely() {
        let (_dir, store) = temp_store();
        store.set("blob", "first, much longer value").unwrap();
        store.set("blob", "second").unwrap();
        assert_eq!(store.get("blob").unwrap().as_deref(), Some("second"));
    }

    #[test]
    fn keys_with_path_separators_are_rejected() {
        let (_dir, store) = temp_store();
        assert!(store.set("../escape", "x").is_err());
        assert!(store.set("a/b", "x").is_err());
        assert!(store.get(".hidden").is_err());
        assert!(store.get("").is_err());
    }
}
