use crate::cli::commands::{audit_helpers, store_helpers};
use crate::cli::{context, output, SecretsAction};
use crate::core::errors::Result;
use crate::core::models::audit_entry::AuditAction;

/// Execute the `passrelay secrets` command.
pub fn execute(action: &SecretsAction) -> Result<()> {
    match action {
        SecretsAction::Add { file, name } => execute_add(file, name.as_deref()),
        SecretsAction::List => execute_list(),
        SecretsAction::Remove { name } => execute_remove(name),
        SecretsAction::Rename { old, new } => execute_rename(old, new),
    }
}

/// Add an encrypted secret from an armored file.
///
/// The name defaults to the file name with everything from the first
/// `.gpg` stripped, so `example.com.gpg` becomes the secret the relay
/// serves to example.com.
fn execute_add(file: &str, name: Option<&str>) -> Result<()> {
    store_helpers::require_initialized()?;
    let armored = store_helpers::read_armored_file(file)?;
    let name = name
        .map(str::to_string)
        .unwrap_or_else(|| store_helpers::secret_name_for(file));

    let mut store = store_helpers::open_secret_store()?;
    store.put(&name, &armored)?;
    store.save()?;

    output::success(&format!("Added secret '{name}'"));

    audit_helpers::log_audit(
        AuditAction::SecretAdd,
        Some(name),
        Some(format!("from {file}")),
    );
    Ok(())
}

/// List stored secrets, sorted by name.
fn execute_list() -> Result<()> {
    store_helpers::require_initialized()?;
    let store = store_helpers::open_secret_store()?;

    if store.is_empty() {
        output::warning("No secrets stored.");
        println!("  Run 'passrelay secrets add <file>' to add one.");
        return Ok(());
    }

    output::header(&format!("Stored secrets ({})", store.len()));
    for secret in store.iter() {
        println!("  • {}", secret.name);
    }
    Ok(())
}

/// Remove a secret by name, asking for confirmation first.
fn execute_remove(name: &str) -> Result<()> {
    store_helpers::require_initialized()?;
    let mut store = store_helpers::open_secret_store()?;

    if !context::confirm(&format!("Are you sure you want to remove secret '{name}'?"))? {
        output::warning("Aborted.");
        return Ok(());
    }

    store.remove(name)?;
    store.save()?;
    output::success(&format!("Removed secret '{name}'"));

    audit_helpers::log_audit(AuditAction::SecretRemove, Some(name.to_string()), None);
    Ok(())
}

/// Rename a secret.
fn execute_rename(old: &str, new: &str) -> Result<()> {
    store_helpers::require_initialized()?;
    let mut store = store_helpers::open_secret_store()?;

    store.rename(old, new)?;
    store.save()?;
    output::success(&format!("Renamed secret '{old}' to '{new}'"));

    audit_helpers::log_audit(
        AuditAction::SecretRename,
        Some(old.to_string()),
        Some(format!("now '{new}'")),
    );
    Ok(())
}
