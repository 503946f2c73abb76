use crate::cli::commands::{audit_helpers, store_helpers};
use crate::cli::{context, output, KeysAction};
use crate::core::errors::Result;
use crate::core::models::audit_entry::AuditAction;
use crate::core::models::key_id::KeyId;

/// Execute the `passrelay keys` command.
pub fn execute(action: &KeysAction) -> Result<()> {
    match action {
        KeysAction::Add { file } => execute_add(file),
        KeysAction::List => execute_list(),
        KeysAction::Remove { id } => execute_remove(id),
    }
}

/// Add a private key from an armored file.
fn execute_add(file: &str) -> Result<()> {
    store_helpers::require_initialized()?;
    let armored = store_helpers::read_armored_file(file)?;

    let mut store = store_helpers::open_key_store()?;
    let id = store.put(&armored)?;
    store.save()?;

    let display = store
        .get(&id)
        .map(|key| key.display_name())
        .unwrap_or_else(|| id.short());
    output::success(&format!("Added key {display}"));
    if store
        .get(&id)
        .is_some_and(|key| key.handle.primary_material().is_locked())
    {
        println!("\n  The key is passphrase-protected; you will be asked when a secret needs it.");
    }

    audit_helpers::log_audit(
        AuditAction::KeyAdd,
        Some(id.short()),
        Some(format!("from {file}")),
    );
    Ok(())
}

/// List stored keys, sorted by display name.
fn execute_list() -> Result<()> {
    store_helpers::require_initialized()?;
    let store = store_helpers::open_key_store()?;

    if store.is_empty() {
        output::warning("No keys stored.");
        println!("  Run 'passrelay keys add <file>' to add one.");
        return Ok(());
    }

    let mut names: Vec<String> = store.iter().map(|key| key.display_name()).collect();
    names.sort();

    output::header(&format!("Stored keys ({})", store.len()));
    for name in names {
        println!("  • {name}");
    }
    Ok(())
}

/// Remove a key by its id, asking for confirmation first.
fn execute_remove(id: &str) -> Result<()> {
    store_helpers::require_initialized()?;
    let id = KeyId::from_hex(id)?;

    let mut store = store_helpers::open_key_store()?;
    let display = store
        .get(&id)
        .map(|key| key.display_name())
        .unwrap_or_else(|| id.short());

    if !context::confirm(&format!("Are you sure you want to remove key {display}?"))? {
        output::warning("Aborted.");
        return Ok(());
    }

    store.remove(&id)?;
    store.save()?;
    output::success(&format!("Removed key {display}"));

    audit_helpers::log_audit(AuditAction::KeyRemove, Some(id.short()), None);
    Ok(())
}
