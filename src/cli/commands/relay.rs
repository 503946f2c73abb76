use std::io::{self, BufRead};

use serde::Deserialize;

use crate::adapters::prompt::terminal::TerminalSurface;
use crate::cli::commands::{audit_helpers, store_helpers};
use crate::cli::{output, RelayAction};
use crate::config::app_config::AppConfig;
use crate::core::errors::{PassrelayError, Result};
use crate::core::models::audit_entry::AuditAction;
use crate::core::services::prompt::PromptChannel;
use crate::core::services::relay::{InjectableProgram, RelayOutcome, RelayReceiver};
use crate::core::traits::relay::{IncomingMessage, RelayRequest, ReplySink, SecretDelivery};

/// Execute the `passrelay relay` command.
pub fn execute(action: &RelayAction) -> Result<()> {
    let base = store_helpers::require_initialized()?;
    let config = AppConfig::load(base)?;
    let program =
        InjectableProgram::generate(&config.relay.trusted_origin, &config.relay.embed_path);

    match action {
        RelayAction::Link => {
            output::header("Injectable relay link");
            output::detail("Keep it as a bookmark; run it on a login page.");
            println!("{}", program.link());
            Ok(())
        }
        RelayAction::Hash => {
            println!("{}", program.integrity_hash());
            Ok(())
        }
        RelayAction::Respond => execute_respond(&program),
    }
}

/// One relay message as an embedding host pipes it in.
#[derive(Debug, Deserialize)]
struct WireMessage {
    origin: Option<String>,
    data: Option<RelayRequest>,
}

/// Reply sink that writes deliveries as JSON lines to stdout, where the
/// embedding host picks them up.
struct StdoutSink;

impl ReplySink for StdoutSink {
    fn post(&self, target_origin: &str, delivery: SecretDelivery) -> Result<()> {
        let line = serde_json::json!({ "origin": target_origin, "data": delivery });
        println!("{line}");
        Ok(())
    }
}

/// Answer a single relay request read from stdin.
///
/// A line that is not valid JSON is treated like any other unrecognized
/// message: dropped without acknowledgement.
fn execute_respond(program: &InjectableProgram) -> Result<()> {
    let keys = store_helpers::open_key_store()?;
    let secrets = store_helpers::open_secret_store()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let message = match serde_json::from_str::<WireMessage>(&line) {
        Ok(wire) => IncomingMessage {
            origin: wire.origin,
            request: wire.data,
        },
        Err(_) => IncomingMessage {
            origin: None,
            request: None,
        },
    };

    let prompts = PromptChannel::new(TerminalSurface);
    let receiver = RelayReceiver::new(&secrets, &keys, &prompts, program);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| PassrelayError::Backend {
            reason: format!("could not start async runtime: {e}"),
        })?;

    let outcome = rt.block_on(receiver.handle(message, &StdoutSink))?;
    match &outcome {
        RelayOutcome::Delivered { hostname } => {
            output::success(&outcome.to_string());
            audit_helpers::log_audit(AuditAction::RelayDeliver, Some(hostname.clone()), None);
        }
        _ => output::warning(&outcome.to_string()),
    }
    Ok(())
}
