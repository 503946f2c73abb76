use std::sync::Arc;

use crate::core::errors::Result;
use crate::core::models::key_id::KeyId;
use crate::core::models::stored_key::KeyMaterialForDecryption;
use crate::core::models::stored_secret::SessionKeyRef;

/// Port for the OpenPGP parsing and decryption capability.
///
/// Implementations live in `adapters::pgp` (e.g. GpgSuite). The core layer
/// only depends on these traits, never on a concrete backend.
///
/// `parse_*` return every object found in the text, possibly none; the
/// stores are responsible for rejecting texts with zero or multiple objects.
pub trait PgpSuite: Send + Sync {
    /// Parse all private keys contained in an armored text.
    fn parse_private_keys(&self, armored: &str) -> Result<Vec<Arc<dyn KeyHandle>>>;

    /// Parse all encrypted messages contained in an armored text.
    fn parse_messages(&self, armored: &str) -> Result<Vec<Arc<dyn MessageHandle>>>;
}

/// A parsed private key: one primary component and zero or more sub-keys.
pub trait KeyHandle: Send + Sync {
    fn primary_id(&self) -> KeyId;

    /// Sub-key identifiers in the order the key carries them.
    fn sub_key_ids(&self) -> Vec<KeyId>;

    /// User identity strings, most relevant first.
    fn user_identities(&self) -> Vec<String>;

    /// Material of the primary component.
    fn primary_material(&self) -> Arc<dyn KeyMaterial>;

    /// Material of the sub-key at `index` (the position within
    /// `sub_key_ids`), or `None` when out of range.
    fn sub_key_material(&self, index: usize) -> Option<Arc<dyn KeyMaterial>>;
}

/// Private key material that may still be encrypted under a passphrase.
pub trait KeyMaterial: Send + Sync {
    /// Whether the private portion is still locked behind a passphrase.
    fn is_locked(&self) -> bool;

    /// Try to unlock with `passphrase`. Returns `Ok(true)` on success,
    /// `Ok(false)` on a wrong passphrase; once unlocked, stays unlocked for
    /// the lifetime of the handle. `Err` is reserved for backend failures.
    fn unlock(&self, passphrase: &str) -> Result<bool>;

    /// Backend hook for recovering the concrete material type.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// A parsed encrypted message.
pub trait MessageHandle: Send + Sync {
    /// Session-key references in message order; that order is the priority
    /// order when picking a key for decryption.
    fn session_key_refs(&self) -> Vec<SessionKeyRef>;

    /// Decrypt with the selected (unlocked) key material and the session-key
    /// entry that matched it.
    fn decrypt(
        &self,
        selection: &KeyMaterialForDecryption,
        session_key: &SessionKeyRef,
    ) -> Result<String>;
}
