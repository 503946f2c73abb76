use std::path::Path;
use std::sync::Arc;

use crate::adapters::pgp::gpg_suite::GpgSuite;
use crate::adapters::storage::file_store::FileStore;
use crate::cli::context;
use crate::core::errors::{PassrelayError, Result};
use crate::core::services::key_store::KeyStore;
use crate::core::services::secret_store::SecretStore;

/// Largest key/secret file accepted for upload.
pub const MAX_UPLOAD_BYTES: u64 = 1024 * 1024;

/// Fail unless `passrelay init` has been run for the current base dir.
pub fn require_initialized() -> Result<&'static Path> {
    let base = context::base_dir();
    if !base.join("config.toml").exists() {
        return Err(PassrelayError::InvalidConfig {
            detail: "passrelay not initialized. Run 'passrelay init' first.".into(),
        });
    }
    Ok(base)
}

/// Build the GPG suite, failing early when gpg is missing.
pub fn gpg_suite() -> Result<Arc<GpgSuite>> {
    let suite = GpgSuite::new();
    if !suite.is_available() {
        return Err(PassrelayError::Backend {
            reason: "GPG is not installed or not found in PATH".into(),
        });
    }
    Ok(Arc::new(suite))
}

/// Open and load the key store for the current base dir.
pub fn open_key_store() -> Result<KeyStore> {
    let suite = gpg_suite()?;
    let storage = Arc::new(FileStore::new(context::base_dir().to_path_buf()));
    let mut store = KeyStore::new(suite, storage);
    store.load()?;
    Ok(store)
}

/// Open and load the secret store for the current base dir.
pub fn open_secret_store() -> Result<SecretStore> {
    let suite = gpg_suite()?;
    let storage = Arc::new(FileStore::new(context::base_dir().to_path_buf()));
    let mut store = SecretStore::new(suite, storage);
    store.load()?;
    Ok(store)
}

/// Read an armored file for `put`, enforcing the upload size limit.
pub fn read_armored_file(path: &str) -> Result<String> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(PassrelayError::Storage {
            detail: format!("File not found: {}", path.display()),
        });
    }
    let size = std::fs::metadata(path)?.len();
    if size > MAX_UPLOAD_BYTES {
        return Err(PassrelayError::Storage {
            detail: format!(
                "File is too big ({size} bytes, 1 MB max): {}",
                path.display()
            ),
        });
    }
    Ok(std::fs::read_to_string(path)?)
}

/// Default secret name for a file: the file name with everything from the
/// first `.gpg` stripped.
pub fn secret_name_for(path: &str) -> String {
    let file_name = Path::new(path)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string());
    match file_name.find(".gpg") {
        Some(cut) => file_name[..cut].to_string(),
        None => file_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_name_strips_gpg_extension() {
        assert_eq!(secret_name_for("example.com.gpg"), "example.com");
        assert_eq!(secret_name_for("/tmp/example.com.gpg"), "example.com");
        assert_eq!(secret_name_for("example.com.gpg.bak"), "example.com");
    }

    #[test]
    fn secret_name_keeps_other_extensions() {
        assert_eq!(secret_name_for("example.com.asc"), "example.com.asc");
        assert_eq!(secret_name_for("plain"), "plain");
    }
}
