use serde::{Deserialize, Serialize};

/// Actions that get recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Init,
    KeyAdd,
    KeyRemove,
    SecretAdd,
    SecretRemove,
    SecretRename,
    SecretShow,
    RelayDeliver,
}

impl AuditAction {
    /// Stable name used for filtering (`passrelay log --action <name>`).
    pub fn name(self) -> &'static str {
        match self {
            AuditAction::Init => "init",
            AuditAction::KeyAdd => "key_add",
            AuditAction::KeyRemove => "key_remove",
            AuditAction::SecretAdd => "secret_add",
            AuditAction::SecretRemove => "secret_remove",
            AuditAction::SecretRename => "secret_rename",
            AuditAction::SecretShow => "secret_show",
            AuditAction::RelayDeliver => "relay_deliver",
        }
    }
}

/// A single entry in the audit log (JSON lines format).
///
/// `subject` names the key or secret the action touched. The entry never
/// carries plaintext, passphrases, or armored material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub actor: String,
    pub action: AuditAction,
    pub subject: Option<String>,
    pub detail: Option<String>,
}
