use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::errors::{PassrelayError, Result};
use crate::core::models::key_id::KeyId;
use crate::core::models::stored_key::StoredKey;
use crate::core::traits::pgp::PgpSuite;
use crate::core::traits::storage::BlobStore;

/// Storage key the serialized key list lives under.
pub const KEYS_STORAGE_KEY: &str = "passrelay-keys";

/// In-memory store of private keys, persisted as a JSON array of armored
/// texts.
///
/// `load` and `save` are the only operations that touch the blob store;
/// every other operation mutates memory only and needs an explicit `save`
/// to persist.
pub struct KeyStore {
    pgp: Arc<dyn PgpSuite>,
    storage: Arc<dyn BlobStore>,
    keys: BTreeMap<KeyId, StoredKey>,
}

impl KeyStore {
    pub fn new(pgp: Arc<dyn PgpSuite>, storage: Arc<dyn BlobStore>) -> Self {
        Self {
            pgp,
            storage,
            keys: BTreeMap::new(),
        }
    }

    /// Rebuild the in-memory map from the persisted blob.
    ///
    /// A record that no longer parses is skipped with a warning; one bad
    /// record never aborts the whole load.
    pub fn load(&mut self) -> Result<()> {
        let raw = self.storage.get(KEYS_STORAGE_KEY)?.unwrap_or_else(|| "[]".into());
        let records: Vec<String> =
            serde_json::from_str(&raw).map_err(|e| PassrelayError::Storage {
                detail: format!("malformed key store blob: {e}"),
            })?;

        self.keys.clear();
        for armored in records {
            if let Err(err) = self.put(&armored) {
                tracing::warn!("skipping stored key that failed to parse: {err}");
            }
        }
        Ok(())
    }

    /// Serialize the current map back to the blob, replacing it entirely.
    pub fn save(&self) -> Result<()> {
        let records: Vec<&str> = self.keys.values().map(|k| k.armored.as_str()).collect();
        let raw = serde_json::to_string(&records).map_err(|e| PassrelayError::Storage {
            detail: format!("could not serialize key store: {e}"),
        })?;
        self.storage.set(KEYS_STORAGE_KEY, &raw)
    }

    /// Validate and insert an armored private key, keyed by its primary id.
    ///
    /// Fails without touching the store when the text contains zero or more
    /// than one key.
    pub fn put(&mut self, armored: &str) -> Result<KeyId> {
        let mut parsed = self.pgp.parse_private_keys(armored)?;
        if parsed.len() > 1 {
            return Err(PassrelayError::MultipleKeysInText);
        }
        let Some(handle) = parsed.pop() else {
            return Err(PassrelayError::NoKeyInText);
        };

        let id = handle.primary_id();
        self.keys.insert(
            id,
            StoredKey {
                armored: armored.to_string(),
                handle,
            },
        );
        Ok(id)
    }

    pub fn remove(&mut self, id: &KeyId) -> Result<()> {
        if self.keys.remove(id).is_none() {
            return Err(PassrelayError::KeyNotFound { id: id.to_string() });
        }
        Ok(())
    }

    pub fn get(&self, id: &KeyId) -> Option<&StoredKey> {
        self.keys.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredKey> {
        self.keys.values()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
