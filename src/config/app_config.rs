use std::path::Path;

use serde::Deserialize;
use url::Url;

use crate::core::errors::{PassrelayError, Result};

/// Top-level passrelay configuration read from `<base>/config.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub relay: RelaySection,
    pub audit: Option<AuditSection>,
}

impl AppConfig {
    /// Load the configuration from `<base_dir>/config.toml`.
    ///
    /// After parsing, validates the trusted origin so a corrupted config
    /// cannot point the relay protocol at a non-origin.
    pub fn load(base_dir: &Path) -> Result<Self> {
        let config_path = base_dir.join("config.toml");
        if !config_path.exists() {
            return Err(PassrelayError::InvalidConfig {
                detail: "config.toml not found. Run 'passrelay init' first.".into(),
            });
        }
        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content).map_err(|e| PassrelayError::InvalidConfig {
            detail: format!("Failed to parse config.toml: {e}"),
        })?;

        validate_origin(&config.relay.trusted_origin)?;

        if !config.relay.embed_path.starts_with('/') {
            return Err(PassrelayError::InvalidConfig {
                detail: format!(
                    "embed_path must start with '/', got '{}'",
                    config.relay.embed_path
                ),
            });
        }

        // Validate the audit log filename
        if let Some(audit) = &config.audit
            && (audit.log_file.contains('/') || audit.log_file.contains('\\'))
        {
            return Err(PassrelayError::InvalidConfig {
                detail: format!("audit log file must be a simple name, got '{}'", audit.log_file),
            });
        }

        Ok(config)
    }

    /// Default config written by `passrelay init`.
    pub fn default_toml() -> &'static str {
        r#"[relay]
trusted_origin = "https://passrelay.example.org"
embed_path = "/passrelayEmbed.html"

[audit]
enabled = true
log_file = "audit.log"
"#
    }
}

/// The trusted origin must be scheme + host (+ optional port), nothing else.
fn validate_origin(origin: &str) -> Result<()> {
    let url = Url::parse(origin).map_err(|e| PassrelayError::InvalidConfig {
        detail: format!("trusted_origin is not a valid URL: {e}"),
    })?;
    if url.host_str().is_none() {
        return Err(PassrelayError::InvalidConfig {
            detail: format!("trusted_origin has no host: '{origin}'"),
        });
    }
    if !url.path().is_empty() && url.path() != "/" {
        return Err(PassrelayError::InvalidConfig {
            detail: format!("trusted_origin must not carry a path: '{origin}'"),
        });
    }
    Ok(())
}

/// The `[relay]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RelaySection {
    /// Origin of the trusted context the injected program talks to.
    pub trusted_origin: String,
    /// Path of the embedded receiver page under that origin.
    pub embed_path: String,
}

/// The `[audit]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditSection {
    pub enabled: bool,
    pub log_file: String,
}
