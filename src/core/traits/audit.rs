use crate::core::errors::Result;
use crate::core::models::audit_entry::{AuditAction, AuditEntry};

/// Port for recording and querying audit events.
pub trait AuditLogger: Send + Sync {
    /// Append an entry to the audit log.
    fn log_event(&self, entry: &AuditEntry) -> Result<()>;

    /// Query all entries, optionally filtered.
    fn query(
        &self,
        action: Option<AuditAction>,
        since: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<Vec<AuditEntry>>;
}
