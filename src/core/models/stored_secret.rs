use std::sync::Arc;

use crate::core::models::key_id::KeyId;
use crate::core::traits::pgp::MessageHandle;

/// Reference to the session key of one recipient of an encrypted message,
/// naming the long-term key (or sub-key) that can recover it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionKeyRef {
    pub key_id: KeyId,
}

/// An encrypted secret held by the secret store.
///
/// Identity is the user-chosen `name` (typically a hostname). Only `name`
/// and `armored` are persisted; the handle is re-derived on load.
#[derive(Clone)]
pub struct StoredSecret {
    pub name: String,
    pub armored: String,
    pub handle: Arc<dyn MessageHandle>,
}

impl std::fmt::Debug for StoredSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredSecret")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
