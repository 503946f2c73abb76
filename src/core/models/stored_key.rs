use std::sync::Arc;

use crate::core::models::key_id::KeyId;
use crate::core::traits::pgp::{KeyHandle, KeyMaterial};

/// A private key held by the key store.
///
/// Identity is the primary key identifier derived from the parsed handle.
/// Only `armored` is ever persisted; the handle is re-derived on load.
#[derive(Clone)]
pub struct StoredKey {
    pub armored: String,
    pub handle: Arc<dyn KeyHandle>,
}

impl StoredKey {
    pub fn id(&self) -> KeyId {
        self.handle.primary_id()
    }

    /// First user identity on the key, or an empty string.
    pub fn user(&self) -> String {
        self.handle.user_identities().into_iter().next().unwrap_or_default()
    }

    /// Listing form: `user (0x12345678)`, or the short id alone for keys
    /// without a user identity.
    pub fn display_name(&self) -> String {
        let short = self.id().short();
        let user = self.user();
        if user.is_empty() {
            short
        } else {
            format!("{user} ({short})")
        }
    }
}

impl std::fmt::Debug for StoredKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredKey")
            .field("id", &self.id())
            .field("user", &self.user())
            .finish_non_exhaustive()
    }
}

/// The key material picked for decrypting one specific secret: the stored
/// key it came from, and either its primary or one sub-key's material,
/// depending on which identifier matched.
#[derive(Clone)]
pub struct KeyMaterialForDecryption {
    pub key: StoredKey,
    pub material: Arc<dyn KeyMaterial>,
}

impl std::fmt::Debug for KeyMaterialForDecryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterialForDecryption")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}
