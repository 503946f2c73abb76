use chrono::{NaiveDate, TimeZone, Utc};
use colored::Colorize;

use crate::adapters::audit::json_audit_logger::JsonAuditLogger;
use crate::cli::commands::store_helpers;
use crate::cli::output;
use crate::config::app_config::AppConfig;
use crate::core::errors::{PassrelayError, Result};
use crate::core::models::audit_entry::{AuditAction, AuditEntry};
use crate::core::traits::audit::AuditLogger;

/// Execute the `passrelay log` command.
///
/// Displays the audit log with optional filters for action, date, and
/// entry count.
pub fn execute(action: Option<&str>, since: Option<&str>, last: Option<usize>) -> Result<()> {
    let base_dir = store_helpers::require_initialized()?;

    let config = AppConfig::load(base_dir)?;
    let audit_section = config.audit.as_ref();
    let logger = JsonAuditLogger::from_config(base_dir, audit_section);

    let action_filter = action.map(parse_action).transpose()?;
    let since_dt = since.map(parse_since).transpose()?;

    let entries = logger.query(action_filter, since_dt)?;

    if entries.is_empty() {
        output::header("passrelay log");
        output::warning("No audit entries found");
        if action.is_some() || since.is_some() {
            println!("  Try removing filters to see all entries.");
        }
        return Ok(());
    }

    // Apply --last N (take from the end)
    let display: Vec<&AuditEntry> = match last {
        Some(n) => entries
            .iter()
            .rev()
            .take(n)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect(),
        None => entries.iter().collect(),
    };

    output::header(&format!("passrelay log ({} entries)", display.len()));
    println!();

    for entry in &display {
        print_entry(entry);
    }

    Ok(())
}

/// Parse an `--action` flag value into an audit action.
fn parse_action(s: &str) -> Result<AuditAction> {
    const ALL: [AuditAction; 8] = [
        AuditAction::Init,
        AuditAction::KeyAdd,
        AuditAction::KeyRemove,
        AuditAction::SecretAdd,
        AuditAction::SecretRemove,
        AuditAction::SecretRename,
        AuditAction::SecretShow,
        AuditAction::RelayDeliver,
    ];
    ALL.into_iter()
        .find(|a| a.name() == s)
        .ok_or_else(|| PassrelayError::InvalidConfig {
            detail: format!(
                "Unknown action '{s}'. Expected one of: {}",
                ALL.map(|a| a.name()).join(", ")
            ),
        })
}

/// Parse a date string (ISO 8601: `YYYY-MM-DD`) into a UTC DateTime.
fn parse_since(s: &str) -> Result<chrono::DateTime<Utc>> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| PassrelayError::InvalidConfig {
            detail: format!(
                "Invalid date format: '{s}'. Expected ISO 8601 (YYYY-MM-DD), e.g. 2026-01-15"
            ),
        })
        .map(|d| Utc.from_utc_datetime(&d.and_hms_opt(0, 0, 0).expect("midnight is always valid")))
}

/// Print a single audit entry as a formatted row.
fn print_entry(entry: &AuditEntry) {
    let date = entry.timestamp.format("%Y-%m-%d %H:%M:%S");
    let subject = entry.subject.as_deref().unwrap_or("—");
    let detail = entry.detail.as_deref().unwrap_or("").dimmed().to_string();

    println!(
        "  {} {} {:<14} {} {}",
        date.to_string().dimmed(),
        "│".dimmed(),
        format_action(entry.action),
        subject,
        detail,
    );
}

/// Format an AuditAction as a colored string.
fn format_action(action: AuditAction) -> String {
    match action {
        AuditAction::Init => "init".cyan().to_string(),
        AuditAction::KeyAdd => "key add".green().to_string(),
        AuditAction::KeyRemove => "key rm".red().to_string(),
        AuditAction::SecretAdd => "secret add".green().to_string(),
        AuditAction::SecretRemove => "secret rm".red().to_string(),
        AuditAction::SecretRename => "secret mv".yellow().to_string(),
        AuditAction::SecretShow => "secret show".blue().to_string(),
        AuditAction::RelayDeliver => "relay".blue().to_string(),
    }
}
