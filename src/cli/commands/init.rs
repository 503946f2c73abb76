use crate::cli::commands::audit_helpers;
use crate::cli::{context, output};
use crate::config::app_config::AppConfig;
use crate::core::errors::{PassrelayError, Result};
use crate::core::models::audit_entry::AuditAction;

/// Execute the `passrelay init` command.
///
/// Creates the base directory and a `config.toml` with defaults.
pub fn execute(verbose: bool) -> Result<()> {
    let base_dir = context::base_dir();

    if base_dir.join("config.toml").exists() {
        return Err(PassrelayError::InvalidConfig {
            detail: format!(
                "passrelay is already initialized ({} exists)",
                base_dir.join("config.toml").display()
            ),
        });
    }

    output::header("passrelay — Initializing");

    std::fs::create_dir_all(base_dir)?;
    output::success(&format!("Created {}", base_dir.display()));

    std::fs::write(base_dir.join("config.toml"), AppConfig::default_toml())?;
    output::success("Generated config.toml with defaults");
    output::warning("Edit [relay] trusted_origin before generating a relay link.");

    audit_helpers::log_audit(AuditAction::Init, None, Some("store initialized".into()));

    output::success("Store ready.\n");
    print_next_steps(verbose);

    Ok(())
}

/// Print next steps after init.
fn print_next_steps(verbose: bool) {
    println!("  Next steps:");
    println!("     1. Add your private key: passrelay keys add <key.asc>");
    println!("     2. Add a secret:         passrelay secrets add <example.com.gpg>");
    println!("     3. Try it:               passrelay show example.com");

    if verbose {
        println!();
        println!("  Files created:");
        println!("     config.toml   — relay origin and audit settings");
        println!("     audit.log     — operation history (created on first use)");
    }
}
