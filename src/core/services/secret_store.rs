use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::errors::{PassrelayError, Result};
use crate::core::models::stored_secret::StoredSecret;
use crate::core::traits::pgp::PgpSuite;
use crate::core::traits::storage::BlobStore;

/// Storage key the serialized secret list lives under.
pub const SECRETS_STORAGE_KEY: &str = "passrelay-secrets";

/// Persisted form of one secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SecretRecord {
    name: String,
    content: String,
}

/// In-memory store of encrypted secrets, persisted as a JSON array of
/// `{name, content}` records.
///
/// Same persistence discipline as the key store: `load`/`save` touch the
/// blob store, nothing else does.
pub struct SecretStore {
    pgp: Arc<dyn PgpSuite>,
    storage: Arc<dyn BlobStore>,
    secrets: BTreeMap<String, StoredSecret>,
}

impl SecretStore {
    pub fn new(pgp: Arc<dyn PgpSuite>, storage: Arc<dyn BlobStore>) -> Self {
        Self {
            pgp,
            storage,
            secrets: BTreeMap::new(),
        }
    }

    /// Rebuild the in-memory map from the persisted blob, skipping records
    /// that fail to parse.
    pub fn load(&mut self) -> Result<()> {
        let raw = self
            .storage
            .get(SECRETS_STORAGE_KEY)?
            .unwrap_or_else(|| "[]".into());
        let records: Vec<SecretRecord> =
            serde_json::from_str(&raw).map_err(|e| PassrelayError::Storage {
                detail: format!("malformed secret store blob: {e}"),
            })?;

        self.secrets.clear();
        for record in records {
            if let Err(err) = self.put(&record.name, &record.content) {
                tracing::warn!(name = %record.name, "skipping stored secret that failed to parse: {err}");
            }
        }
        Ok(())
    }

    /// Serialize the current map back to the blob, replacing it entirely.
    pub fn save(&self) -> Result<()> {
        let records: Vec<SecretRecord> = self
            .secrets
            .values()
            .map(|s| SecretRecord {
                name: s.name.clone(),
                content: s.armored.clone(),
            })
            .collect();
        let raw = serde_json::to_string(&records).map_err(|e| PassrelayError::Storage {
            detail: format!("could not serialize secret store: {e}"),
        })?;
        self.storage.set(SECRETS_STORAGE_KEY, &raw)
    }

    /// Validate and insert an armored message under `name`.
    ///
    /// Fails without touching the store when the text contains zero or more
    /// than one message.
    pub fn put(&mut self, name: &str, armored: &str) -> Result<()> {
        let mut parsed = self.pgp.parse_messages(armored)?;
        if parsed.len() > 1 {
            return Err(PassrelayError::MultipleMessagesInText);
        }
        let Some(handle) = parsed.pop() else {
            return Err(PassrelayError::NoMessageInText);
        };

        self.secrets.insert(
            name.to_string(),
            StoredSecret {
                name: name.to_string(),
                armored: armored.to_string(),
                handle,
            },
        );
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<()> {
        if self.secrets.remove(name).is_none() {
            return Err(PassrelayError::SecretNotFound {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Move the entry under `old` to `new`. A no-op when the names are
    /// equal; fails when `old` is absent.
    pub fn rename(&mut self, old: &str, new: &str) -> Result<()> {
        if !self.secrets.contains_key(old) {
            return Err(PassrelayError::SecretNotFound {
                name: old.to_string(),
            });
        }
        if old == new {
            return Ok(());
        }
        if let Some(mut secret) = self.secrets.remove(old) {
            secret.name = new.to_string();
            self.secrets.insert(new.to_string(), secret);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&StoredSecret> {
        self.secrets.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredSecret> {
        self.secrets.values()
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{FakeMessage, FakeSuite, MemoryStore};

    fn store_with(suite: FakeSuite) -> SecretStore {
        SecretStore::new(Arc::new(suite), Arc::new(MemoryStore::default()))
    }

    #[test]
    fn put_single_message_is_retrievable() {
        let suite = FakeSuite::default();
        suite.register_message("MSG-A", FakeMessage::new("hunter2"));
        let mut store = store_with(suite);

        store.put("example.com", "MSG-A").unwrap();
        assert_eq!(store.get("example.com").unwrap().armored, "MSG-A");
    }

    #[test]
    fn put_empty_text_fails_and_leaves_store_unchanged() {
        let mut store = store_with(FakeSuite::default());

        let err = store.put("example.com", "garbage").unwrap_err();
        assert!(matches!(err, PassrelayError::NoMessageInText));
        assert!(store.is_empty());
    }

    #[test]
    fn put_two_messages_fails_and_leaves_store_unchanged() {
        let suite = FakeSuite::default();
        suite.register_messages(
            "TWO-MSGS",
            vec![FakeMessage::new("one"), FakeMessage::new("two")],
        );
        let mut store = store_with(suite);

        let err = store.put("example.com", "TWO-MSGS").unwrap_err();
        assert!(matches!(err, PassrelayError::MultipleMessagesInText));
        assert!(store.is_empty());
    }

    #[test]
    fn remove_missing_secret_fails() {
        let mut store = store_with(FakeSuite::default());
        let err = store.remove("nope").unwrap_err();
        assert!(matches!(err, PassrelayError::SecretNotFound { .. }));
    }

    #[test]
    fn rename_moves_the_entry() {
        let suite = FakeSuite::default();
        suite.register_message("MSG-A", FakeMessage::new("hunter2"));
        let mut store = store_with(suite);

        store.put("old.example.com", "MSG-A").unwrap();
        store.rename("old.example.com", "new.example.com").unwrap();

        assert!(store.get("old.example.com").is_none());
        let moved = store.get("new.example.com").unwrap();
        assert_eq!(moved.name, "new.example.com");
        assert_eq!(moved.armored, "MSG-A");
    }

    #[test]
    fn rename_to_same_name_is_a_no_op() {
        let suite = FakeSuite::default();
        suite.register_message("MSG-A", FakeMessage::new("hunter2"));
        let mut store = store_with(suite);

        store.put("example.com", "MSG-A").unwrap();
        store.rename("example.com", "example.com").unwrap();
        assert!(store.get("example.com").is_some());
    }

    #[test]
    fn rename_missing_secret_fails() {
        let mut store = store_with(FakeSuite::default());
        let err = store.rename("nope", "other").unwrap_err();
        assert!(matches!(err, PassrelayError::SecretNotFound { .. }));
    }

    #[test]
    fn save_load_round_trip_skipping_bad_records() {
        let suite = FakeSuite::default();
        suite.register_message("MSG-A", FakeMessage::new("one"));
        let storage = Arc::new(MemoryStore::default());
        storage
            .set(
                SECRETS_STORAGE_KEY,
                r#"[{"name":"a.example.com","content":"MSG-A"},{"name":"broken","content":"stale"}]"#,
            )
            .unwrap();

        let mut store = SecretStore::new(Arc::new(suite.clone()), storage.clone());
        store.load().unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get("a.example.com").is_some());

        // Round-trip what survived.
        store.save().unwrap();
        let mut reloaded = SecretStore::new(Arc::new(suite), storage);
        reloaded.load().unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("a.example.com").unwrap().armored, "MSG-A");
    }
}
