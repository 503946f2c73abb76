use chrono::Utc;

use crate::adapters::audit::json_audit_logger::JsonAuditLogger;
use crate::cli::{context, output};
use crate::config::app_config::AppConfig;
use crate::core::models::audit_entry::{AuditAction, AuditEntry};
use crate::core::traits::audit::AuditLogger;

/// Name of the user running the command, best effort.
pub fn actor() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Record an audit event. Warns on failure instead of propagating the
/// error, since audit should not block the main operation.
pub fn log_audit(action: AuditAction, subject: Option<String>, detail: Option<String>) {
    let base_dir = context::base_dir();

    let config = AppConfig::load(base_dir).ok();
    let audit_section = config.as_ref().and_then(|c| c.audit.as_ref());

    if !JsonAuditLogger::is_enabled(audit_section) {
        return;
    }

    let logger = JsonAuditLogger::from_config(base_dir, audit_section);
    let entry = AuditEntry {
        timestamp: Utc::now(),
        actor: actor(),
        action,
        subject,
        detail,
    };

    if let Err(e) = logger.log_event(&entry) {
        output::warning(&format!("Could not write audit log: {e}"));
    }
}
