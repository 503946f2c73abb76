use crate::adapters::prompt::terminal::TerminalSurface;
use crate::cli::commands::{audit_helpers, store_helpers};
use crate::cli::output;
use crate::core::errors::{PassrelayError, Result};
use crate::core::models::audit_entry::AuditAction;
use crate::core::services::prompt::PromptChannel;
use crate::core::services::unlock::{UnlockOutcome, UnlockSession};

/// Execute the `passrelay show` command: unlock one secret and print its
/// plaintext.
pub fn execute(name: &str) -> Result<()> {
    store_helpers::require_initialized()?;
    let keys = store_helpers::open_key_store()?;
    let secrets = store_helpers::open_secret_store()?;

    let Some(secret) = secrets.get(name) else {
        return Err(PassrelayError::SecretNotFound {
            name: name.to_string(),
        });
    };

    let prompts = PromptChannel::new(TerminalSurface);
    let session = UnlockSession::new(&keys, &prompts);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| PassrelayError::Backend {
            reason: format!("could not start async runtime: {e}"),
        })?;

    match rt.block_on(session.run(secret))? {
        UnlockOutcome::Plaintext(text) => {
            println!("{text}");
            audit_helpers::log_audit(AuditAction::SecretShow, Some(name.to_string()), None);
            Ok(())
        }
        UnlockOutcome::Abandoned(reason) => {
            output::warning(&format!("Could not open '{name}': {reason}"));
            Ok(())
        }
    }
}
