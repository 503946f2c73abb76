use crate::core::models::key_id::KeyId;
use crate::core::models::stored_key::KeyMaterialForDecryption;
use crate::core::services::key_store::KeyStore;

/// Finds the key material matching a session-key identifier, whether it
/// belongs to a primary key or to one of any key's sub-keys.
pub struct KeyResolver<'a> {
    keys: &'a KeyStore,
}

impl<'a> KeyResolver<'a> {
    pub fn new(keys: &'a KeyStore) -> Self {
        Self { keys }
    }

    /// Resolve `key_id` to usable material, or `None` when no stored key
    /// matches.
    ///
    /// Primary identifiers win over sub-key identifiers; sub-keys are
    /// scanned across all keys in store order, each key's sub-keys in their
    /// stored order, first exact match wins. Identifiers are assumed unique
    /// across keys; nothing disambiguates when they are not.
    pub fn resolve(&self, key_id: &KeyId) -> Option<KeyMaterialForDecryption> {
        if let Some(key) = self.keys.get(key_id) {
            return Some(KeyMaterialForDecryption {
                key: key.clone(),
                material: key.handle.primary_material(),
            });
        }

        for key in self.keys.iter() {
            for (index, sub_id) in key.handle.sub_key_ids().iter().enumerate() {
                if sub_id == key_id {
                    let material = key.handle.sub_key_material(index)?;
                    return Some(KeyMaterialForDecryption {
                        key: key.clone(),
                        material,
                    });
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::testing::{key_id, FakeKey, FakeSuite, MemoryStore};

    fn store_with_key(key: FakeKey) -> KeyStore {
        let suite = FakeSuite::default();
        suite.register_key("KEY", key);
        let mut store = KeyStore::new(Arc::new(suite), Arc::new(MemoryStore::default()));
        store.put("KEY").unwrap();
        store
    }

    #[test]
    fn resolves_primary_id_to_primary_material() {
        let store = store_with_key(
            FakeKey::new("aaaaaaaaaaaaaaaa")
                .with_sub_keys(&["1111111111111111", "2222222222222222"]),
        );
        let resolver = KeyResolver::new(&store);

        let found = resolver.resolve(&key_id("aaaaaaaaaaaaaaaa")).unwrap();
        assert_eq!(found.key.id(), key_id("aaaaaaaaaaaaaaaa"));
        assert!(Arc::ptr_eq(
            &found.material,
            &found.key.handle.primary_material()
        ));
    }

    #[test]
    fn resolves_sub_key_id_to_that_sub_keys_material() {
        let store = store_with_key(
            FakeKey::new("aaaaaaaaaaaaaaaa")
                .with_sub_keys(&["1111111111111111", "2222222222222222"]),
        );
        let resolver = KeyResolver::new(&store);

        let found = resolver.resolve(&key_id("2222222222222222")).unwrap();
        assert_eq!(found.key.id(), key_id("aaaaaaaaaaaaaaaa"));
        let expected = found.key.handle.sub_key_material(1).unwrap();
        assert!(Arc::ptr_eq(&found.material, &expected));
    }

    #[test]
    fn unknown_id_resolves_to_none() {
        let store = store_with_key(FakeKey::new("aaaaaaaaaaaaaaaa"));
        let resolver = KeyResolver::new(&store);

        assert!(resolver.resolve(&key_id("ffffffffffffffff")).is_none());
    }
}
