use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::sync::{Arc, Mutex, OnceLock};

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};

use crate::core::errors::{PassrelayError, Result};
use crate::core::models::key_id::KeyId;
use crate::core::models::stored_key::KeyMaterialForDecryption;
use crate::core::models::stored_secret::SessionKeyRef;
use crate::core::traits::pgp::{KeyHandle, KeyMaterial, MessageHandle, PgpSuite};

/// PGP backend that shells out to the system `gpg` binary.
///
/// Requires GPG to be installed. Every operation runs inside an ephemeral
/// `--homedir`, so the user's default keyring is never read or written.
pub struct GpgSuite {
    /// Path to the gpg binary (defaults to "gpg").
    gpg_path: PathBuf,
}

impl GpgSuite {
    /// Create a new suite using the default `gpg` binary.
    pub fn new() -> Self {
        Self {
            gpg_path: PathBuf::from("gpg"),
        }
    }

    /// Create a new suite with a custom gpg binary path.
    pub fn with_path(gpg_path: PathBuf) -> Self {
        Self { gpg_path }
    }

    /// Check if GPG is available on the system.
    pub fn is_available(&self) -> bool {
        Command::new(&self.gpg_path)
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }
}

impl Default for GpgSuite {
    fn default() -> Self {
        Self::new()
    }
}

impl PgpSuite for GpgSuite {
    fn parse_private_keys(&self, armored: &str) -> Result<Vec<Arc<dyn KeyHandle>>> {
        let mut handles: Vec<Arc<dyn KeyHandle>> = Vec::new();

        for block in split_armored_blocks(armored, "PGP PRIVATE KEY BLOCK") {
            let home = scratch_home()?;
            let listing = run_gpg(
                &self.gpg_path,
                home.path(),
                &["--with-colons", "--import-options", "show-only", "--import"],
                Some(block.as_bytes()),
            )?;
            let packets = run_gpg(
                &self.gpg_path,
                home.path(),
                &["--list-packets"],
                Some(block.as_bytes()),
            )?;
            if !listing.status.success() || !packets.status.success() {
                tracing::debug!("gpg could not read a private key block, skipping it");
                continue;
            }

            let keys = match parse_colon_listing(&String::from_utf8_lossy(&listing.stdout)) {
                Ok(keys) => keys,
                Err(err) => {
                    tracing::debug!("unreadable key listing, skipping block: {err}");
                    continue;
                }
            };
            let protection =
                parse_secret_key_protection(&String::from_utf8_lossy(&packets.stdout));

            for (index, key) in keys.into_iter().enumerate() {
                let protected = protection.get(index).copied().unwrap_or(false);
                handles.push(Arc::new(GpgKeyHandle {
                    sub_ids: key.sub_ids,
                    users: key.users,
                    material: Arc::new(GpgKeyMaterial {
                        gpg_path: self.gpg_path.clone(),
                        armored: block.clone(),
                        primary: key.primary,
                        protected,
                        passphrase: Mutex::new(None),
                    }),
                }));
            }
        }
        Ok(handles)
    }

    fn parse_messages(&self, armored: &str) -> Result<Vec<Arc<dyn MessageHandle>>> {
        let mut handles: Vec<Arc<dyn MessageHandle>> = Vec::new();

        for block in split_armored_blocks(armored, "PGP MESSAGE") {
            let home = scratch_home()?;
            let packets = run_gpg(
                &self.gpg_path,
                home.path(),
                &["--list-packets"],
                Some(block.as_bytes()),
            )?;
            if !packets.status.success() {
                tracing::debug!("gpg could not read a message block, skipping it");
                continue;
            }

            let refs = parse_session_key_ids(&String::from_utf8_lossy(&packets.stdout))
                .into_iter()
                .map(|key_id| SessionKeyRef { key_id })
                .collect();
            handles.push(Arc::new(GpgMessageHandle {
                gpg_path: self.gpg_path.clone(),
                armored: block,
                refs,
            }));
        }
        Ok(handles)
    }
}

/// A private key parsed by gpg.
struct GpgKeyHandle {
    sub_ids: Vec<KeyId>,
    users: Vec<String>,
    material: Arc<GpgKeyMaterial>,
}

impl KeyHandle for GpgKeyHandle {
    fn primary_id(&self) -> KeyId {
        self.material.primary
    }

    fn sub_key_ids(&self) -> Vec<KeyId> {
        self.sub_ids.clone()
    }

    fn user_identities(&self) -> Vec<String> {
        self.users.clone()
    }

    fn primary_material(&self) -> Arc<dyn KeyMaterial> {
        self.material.clone()
    }

    fn sub_key_material(&self, index: usize) -> Option<Arc<dyn KeyMaterial>> {
        // GPG protects the whole key under one passphrase and picks the
        // component itself during decryption, so every sub-key shares the
        // primary's material.
        (index < self.sub_ids.len()).then(|| self.material.clone() as Arc<dyn KeyMaterial>)
    }
}

/// Key material backed by an armored key and, once verified, its cached
/// passphrase. "Unlocked" means the passphrase is known for the rest of the
/// process lifetime; nothing is ever written outside the scratch homedirs.
pub struct GpgKeyMaterial {
    gpg_path: PathBuf,
    armored: String,
    primary: KeyId,
    protected: bool,
    passphrase: Mutex<Option<SecretString>>,
}

impl GpgKeyMaterial {
    fn has_passphrase(&self) -> bool {
        self.passphrase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_some()
    }
}

impl KeyMaterial for GpgKeyMaterial {
    fn is_locked(&self) -> bool {
        self.protected && !self.has_passphrase()
    }

    fn unlock(&self, passphrase: &str) -> Result<bool> {
        if !self.protected || self.has_passphrase() {
            return Ok(true);
        }

        // Exporting the secret key requires the passphrase; a failed export
        // with loopback pinentry means the passphrase is wrong.
        let home = scratch_home()?;
        import_key(&self.gpg_path, home.path(), &self.armored)?;
        let stdin = format!("{passphrase}\n");
        let output = run_gpg(
            &self.gpg_path,
            home.path(),
            &[
                "--pinentry-mode",
                "loopback",
                "--passphrase-fd",
                "0",
                "--armor",
                "--export-secret-keys",
                &format!("0x{}", self.primary),
            ],
            Some(stdin.as_bytes()),
        )?;

        if output.status.success() && !output.stdout.is_empty() {
            *self
                .passphrase
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()) =
                Some(SecretString::from(passphrase.to_string()));
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// An encrypted message parsed by gpg.
struct GpgMessageHandle {
    gpg_path: PathBuf,
    armored: String,
    refs: Vec<SessionKeyRef>,
}

impl MessageHandle for GpgMessageHandle {
    fn session_key_refs(&self) -> Vec<SessionKeyRef> {
        self.refs.clone()
    }

    fn decrypt(
        &self,
        selection: &KeyMaterialForDecryption,
        _session_key: &SessionKeyRef,
    ) -> Result<String> {
        let material = selection
            .material
            .as_any()
            .downcast_ref::<GpgKeyMaterial>()
            .ok_or_else(|| PassrelayError::Backend {
                reason: "key material comes from a different backend".into(),
            })?;
        if material.is_locked() {
            return Err(PassrelayError::Backend {
                reason: "decrypt called with locked key material".into(),
            });
        }

        let home = scratch_home()?;
        import_key(&self.gpg_path, home.path(), &material.armored)?;

        let message_path = home.path().join("message.asc");
        std::fs::write(&message_path, &self.armored)?;
        let message_arg = message_path.to_string_lossy().into_owned();

        let passphrase = material
            .passphrase
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let output = match passphrase.as_ref() {
            Some(passphrase) => {
                let stdin = format!("{}\n", passphrase.expose_secret());
                run_gpg(
                    &self.gpg_path,
                    home.path(),
                    &[
                        "--pinentry-mode",
                        "loopback",
                        "--passphrase-fd",
                        "0",
                        "--decrypt",
                        &message_arg,
                    ],
                    Some(stdin.as_bytes()),
                )?
            }
            None => run_gpg(
                &self.gpg_path,
                home.path(),
                &["--decrypt", &message_arg],
                None,
            )?,
        };

        if !output.status.success() {
            return Err(PassrelayError::Backend {
                reason: format!(
                    "gpg could not decrypt the message: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Create an ephemeral GPG home directory.
fn scratch_home() -> Result<tempfile::TempDir> {
    let dir = tempfile::Builder::new()
        .prefix("passrelay-gnupg-")
        .tempdir()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o700))?;
    }
    Ok(dir)
}

/// Run gpg inside `home` and return its raw output. Spawn failures are
/// backend errors; non-zero exit is left to the caller to interpret.
fn run_gpg(
    gpg_path: &Path,
    home: &Path,
    args: &[&str],
    stdin_data: Option<&[u8]>,
) -> Result<Output> {
    let mut cmd = Command::new(gpg_path);
    cmd.arg("--homedir")
        .arg(home)
        .args(["--batch", "--no-tty", "--yes", "--quiet"])
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|e| PassrelayError::Backend {
        reason: format!("Failed to run gpg: {e}"),
    })?;

    if let Some(data) = stdin_data
        && let Some(mut stdin) = child.stdin.take()
    {
        stdin
            .write_all(data)
            .map_err(|e| PassrelayError::Backend {
                reason: format!("Failed to write to gpg stdin: {e}"),
            })?;
    } else {
        drop(child.stdin.take());
    }

    child.wait_with_output().map_err(|e| PassrelayError::Backend {
        reason: format!("gpg process failed: {e}"),
    })
}

/// Import an armored key into `home`, failing loudly when gpg rejects it.
fn import_key(gpg_path: &Path, home: &Path, armored: &str) -> Result<()> {
    let output = run_gpg(gpg_path, home, &["--import"], Some(armored.as_bytes()))?;
    if !output.status.success() {
        return Err(PassrelayError::Backend {
            reason: format!(
                "gpg could not import the key: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(())
}

/// One key as described by a `--with-colons` listing.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ColonKey {
    primary: KeyId,
    sub_ids: Vec<KeyId>,
    users: Vec<String>,
}

/// Parse `sec`/`ssb`/`uid` records out of a colon listing.
fn parse_colon_listing(listing: &str) -> Result<Vec<ColonKey>> {
    let mut keys: Vec<ColonKey> = Vec::new();

    for line in listing.lines() {
        let fields: Vec<&str> = line.split(':').collect();
        match fields.first().copied() {
            Some("sec") => {
                let raw = fields.get(4).copied().unwrap_or_default();
                keys.push(ColonKey {
                    primary: KeyId::from_hex(raw)?,
                    sub_ids: Vec::new(),
                    users: Vec::new(),
                });
            }
            Some("ssb") => {
                let raw = fields.get(4).copied().unwrap_or_default();
                if let Some(key) = keys.last_mut() {
                    key.sub_ids.push(KeyId::from_hex(raw)?);
                }
            }
            Some("uid") => {
                let raw = fields.get(9).copied().unwrap_or_default();
                if let Some(key) = keys.last_mut() {
                    key.users.push(unescape_colon_field(raw));
                }
            }
            _ => {}
        }
    }
    Ok(keys)
}

/// Colon listings escape reserved characters as `\xNN`; only the colon
/// itself shows up in practice.
fn unescape_colon_field(field: &str) -> String {
    field.replace("\\x3a", ":")
}

/// Whether each primary secret key packet in a `--list-packets` dump is
/// passphrase-protected. Protected packets carry an S2K specifier.
fn parse_secret_key_protection(packets: &str) -> Vec<bool> {
    let mut protection = Vec::new();
    let mut in_primary = false;

    for line in packets.lines() {
        if line.starts_with(":secret key packet:") {
            protection.push(false);
            in_primary = true;
        } else if line.starts_with(':') {
            in_primary = false;
        } else if in_primary
            && (line.contains("S2K") || line.contains("protected"))
            && let Some(last) = protection.last_mut()
        {
            *last = true;
        }
    }
    protection
}

fn session_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^:pubkey enc packet:.*\bkeyid ([0-9A-Fa-f]{16})")
            .expect("static regex is valid")
    })
}

/// Recipient key ids of a message's public-key encrypted session keys, in
/// packet order.
fn parse_session_key_ids(packets: &str) -> Vec<KeyId> {
    session_key_regex()
        .captures_iter(packets)
        .filter_map(|captures| KeyId::from_hex(&captures[1].to_lowercase()).ok())
        .collect()
}

/// Cut a text into its armored blocks for the given label, keeping the
/// BEGIN/END lines.
fn split_armored_blocks(text: &str, label: &str) -> Vec<String> {
    let begin = format!("-----BEGIN {label}-----");
    let end = format!("-----END {label}-----");

    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(&begin) {
        let after_start = &rest[start..];
        let Some(end_pos) = after_start.find(&end) else {
            break;
        };
        let block_len = end_pos + end.len();
        blocks.push(after_start[..block_len].to_string());
        rest = &after_start[block_len..];
    }
    blocks
}
