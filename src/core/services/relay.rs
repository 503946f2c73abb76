use sha2::{Digest, Sha256};
use url::Url;

use crate::core::errors::Result;
use crate::core::services::key_store::KeyStore;
use crate::core::services::prompt::PromptChannel;
use crate::core::services::secret_store::SecretStore;
use crate::core::services::unlock::{AbandonReason, UnlockOutcome, UnlockSession};
use crate::core::traits::relay::{IncomingMessage, ReplySink, SecretDelivery};
use crate::core::traits::surface::PromptSurface;

/// Tag carried by requests from the injected program.
pub const INJECTOR_TAG: &str = "passrelayInjector";

/// Tag carried by replies from the trusted side.
pub const TRUSTED_TAG: &str = "passrelay";

/// Placeholder the program text carries while its own digest is computed.
const HASH_PLACEHOLDER: &str = "$HASH$";

/// The program installed into the untrusted page. It uninstalls any
/// resident previous instance, embeds a hidden frame scoped to the trusted
/// origin, and delivers exactly one received secret into a visible
/// password input before dropping the reference.
const INJECTED_PROGRAM_TEMPLATE: &str = r#"function(origin, path, hash) {
    if (window.passrelayInjector) {
        window.passrelayInjector.uninstall();
    }
    var injector = window.passrelayInjector = {};

    injector.frame = document.createElement("iframe");
    injector.frame.style.display = "none";
    document.body.appendChild(injector.frame);

    injector._processMessage = function(event) {
        if (
            event.origin != origin ||
            !event.data ||
            event.data.sourceScript !== "passrelay"
        ) {
            return;
        }
        injector.input.value = event.data.password;
        injector.input.focus();
        injector.input = null;
    };

    window.addEventListener("message", injector._processMessage, false);

    injector.uninstall = function() {
        injector.frame.contentWindow.location = "about:blank";
        injector.frame.parentNode.removeChild(injector.frame);
        window.removeEventListener("message", injector._processMessage, false);
        delete window.passrelayInjector;
    };

    injector._isHidden = function(elem) {
        var width = elem.offsetWidth,
            height = elem.offsetHeight;
        return (width === 0 && height === 0) ||
               ((elem.style && elem.style.display) || elem.style.display) === "none";
    };

    injector._discoverInput = function() {
        var active = document.activeElement;
        if (active && active.type == "password") {
            return active;
        }
        var inputs = Array.prototype.slice.apply(
            document.querySelectorAll("input[type=password]")
        );
        for (var i = 0; i < inputs.length; i++) {
            if (!injector._isHidden(inputs[i]) && inputs[i].type === "password") {
                return inputs[i];
            }
        }
    };

    injector.requestSecret = function() {
        injector.input = injector._discoverInput();
        if (!injector.input) {
            alert("Could not find password input");
            return;
        }
        injector.frame.onload = function() {
            injector.frame.contentWindow.postMessage(
                { sourceScript: "passrelayInjector", hash: hash },
                origin
            );
        };
        injector.frame.src = origin + path;
    };

    injector.requestSecret();
}"#;

/// Lowercase-hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// The injectable program for one trusted origin, together with its
/// integrity hash.
///
/// The program commits to its own digest: the hash is computed over the
/// templated text while it still contains the placeholder, then substituted
/// in. Program text and hash always come from the same generation step, so
/// the pair can never drift apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectableProgram {
    code: String,
    hash: String,
}

impl InjectableProgram {
    pub fn generate(trusted_origin: &str, embed_path: &str) -> Self {
        let origin_js = js_string(trusted_origin);
        let path_js = js_string(embed_path);
        let templated = format!(
            "({})({}, {}, {})",
            INJECTED_PROGRAM_TEMPLATE, origin_js, path_js, HASH_PLACEHOLDER
        );
        let hash = sha256_hex(templated.as_bytes());
        let code = templated.replacen(HASH_PLACEHOLDER, &js_string(&hash), 1);
        Self { code, hash }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn integrity_hash(&self) -> &str {
        &self.hash
    }

    /// The program as a link the user can keep in a toolbar.
    pub fn link(&self) -> String {
        format!("javascript:{}", urlencoding::encode(&self.code))
    }
}

/// Render a string as a JavaScript string literal.
fn js_string(value: &str) -> String {
    serde_json::to_string(value).expect("string serialization cannot fail")
}

/// What the receiver did with one incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Missing origin, missing payload, or wrong tag. Dropped without any
    /// acknowledgement: unrecognized senders learn nothing.
    Ignored,
    /// The sender's installed program does not match the current one; the
    /// caller should offer reinstallation instead of proceeding.
    StaleProgram,
    /// No secret is stored under the sender's hostname.
    SecretNotFound { hostname: String },
    /// The unlock session ended without plaintext.
    Abandoned(AbandonReason),
    /// The secret's first line was posted back to the sender's origin.
    Delivered { hostname: String },
}

impl std::fmt::Display for RelayOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayOutcome::Ignored => write!(f, "ignored an unrecognized message"),
            RelayOutcome::StaleProgram => {
                write!(f, "the installed relay program is outdated; please reinstall it")
            }
            RelayOutcome::SecretNotFound { hostname } => {
                write!(f, "could not find a secret named {hostname}")
            }
            RelayOutcome::Abandoned(reason) => write!(f, "{reason}"),
            RelayOutcome::Delivered { hostname } => {
                write!(f, "delivered the secret for {hostname}")
            }
        }
    }
}

/// Trusted-side receiver of the relay protocol: validates an incoming
/// request, unlocks the matching secret, and posts the first line of its
/// plaintext back to the requesting origin.
pub struct RelayReceiver<'a, S: PromptSurface> {
    secrets: &'a SecretStore,
    keys: &'a KeyStore,
    prompts: &'a PromptChannel<S>,
    program: &'a InjectableProgram,
}

impl<'a, S: PromptSurface> RelayReceiver<'a, S> {
    pub fn new(
        secrets: &'a SecretStore,
        keys: &'a KeyStore,
        prompts: &'a PromptChannel<S>,
        program: &'a InjectableProgram,
    ) -> Self {
        Self {
            secrets,
            keys,
            prompts,
            program,
        }
    }

    pub async fn handle(
        &self,
        message: IncomingMessage,
        reply: &dyn ReplySink,
    ) -> Result<RelayOutcome> {
        let Some(origin) = message.origin else {
            return Ok(RelayOutcome::Ignored);
        };
        let Some(request) = message.request else {
            tracing::debug!("dropping relay message without payload");
            return Ok(RelayOutcome::Ignored);
        };
        if request.sender_tag.as_deref() != Some(INJECTOR_TAG) {
            tracing::debug!("dropping relay message with unrecognized tag");
            return Ok(RelayOutcome::Ignored);
        }
        if request.integrity_hash.as_deref() != Some(self.program.integrity_hash()) {
            return Ok(RelayOutcome::StaleProgram);
        }

        let hostname = hostname_of(&origin);
        let Some(secret) = self.secrets.get(&hostname) else {
            return Ok(RelayOutcome::SecretNotFound { hostname });
        };

        let session = UnlockSession::new(self.keys, self.prompts);
        let outcome = session.run(secret).await;
        // The prompt context is closed once the exchange completes,
        // whatever the outcome was.
        self.prompts.close_current().await;

        match outcome? {
            UnlockOutcome::Plaintext(text) => {
                reply.post(
                    &origin,
                    SecretDelivery {
                        sender_tag: TRUSTED_TAG.to_string(),
                        secret: first_line(&text).to_string(),
                    },
                )?;
                Ok(RelayOutcome::Delivered { hostname })
            }
            UnlockOutcome::Abandoned(reason) => Ok(RelayOutcome::Abandoned(reason)),
        }
    }
}

/// Lookup name for a sender origin: its hostname, or the origin itself when
/// it does not parse as a URL.
fn hostname_of(origin: &str) -> String {
    Url::parse(origin)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .unwrap_or_else(|| origin.to_string())
}

/// Only the first line of a secret is delivered across contexts; anything
/// after a line break stays home.
fn first_line(text: &str) -> &str {
    match text.find(['\n', '\r']) {
        Some(cut) => &text[..cut],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::testing::{
        CollectingSink, FakeKey, FakeMessage, FakeSuite, MemoryStore, ScriptedSurface,
    };
    use crate::core::traits::relay::RelayRequest;

    #[test]
    fn generation_is_deterministic() {
        let a = InjectableProgram::generate("https://vault.example.org", "/embed.html");
        let b = InjectableProgram::generate("https://vault.example.org", "/embed.html");
        assert_eq!(a, b);
        assert_eq!(a.integrity_hash().len(), 64);
        assert!(a.code().contains("https://vault.example.org"));
    }

    #[test]
    fn program_commits_to_its_own_hash() {
        let program = InjectableProgram::generate("https://vault.example.org", "/embed.html");
        let hash_literal = js_string(program.integrity_hash());
        assert!(program.code().contains(&hash_literal));

        // Undo the substitution: hashing the placeholder form reproduces
        // the embedded digest.
        let templated = program.code().replacen(&hash_literal, HASH_PLACEHOLDER, 1);
        assert_eq!(sha256_hex(templated.as_bytes()), program.integrity_hash());
    }

    #[test]
    fn link_is_percent_encoded_javascript() {
        let program = InjectableProgram::generate("https://vault.example.org", "/embed.html");
        let link = program.link();
        assert!(link.starts_with("javascript:"));
        assert!(!link.contains(' '));
    }

    #[test]
    fn different_origins_produce_different_hashes() {
        let a = InjectableProgram::generate("https://a.example.org", "/embed.html");
        let b = InjectableProgram::generate("https://b.example.org", "/embed.html");
        assert_ne!(a.integrity_hash(), b.integrity_hash());
    }

    #[test]
    fn first_line_cuts_at_any_line_break() {
        assert_eq!(first_line("hunter2"), "hunter2");
        assert_eq!(first_line("hunter2\nuser: alice"), "hunter2");
        assert_eq!(first_line("hunter2\r\nuser: alice"), "hunter2");
    }

    struct Fixture {
        keys: KeyStore,
        secrets: SecretStore,
        surface: ScriptedSurface,
        message: FakeMessage,
        program: InjectableProgram,
    }

    fn fixture() -> Fixture {
        let suite = FakeSuite::default();
        suite.register_key("KEY", FakeKey::new("aaaaaaaaaaaaaaaa"));
        let message = FakeMessage::new("hunter2\nuser: alice").with_session_keys(&["aaaaaaaaaaaaaaaa"]);
        suite.register_message("MSG", message.clone());
        let suite = Arc::new(suite);

        let mut keys = KeyStore::new(suite.clone(), Arc::new(MemoryStore::default()));
        keys.put("KEY").unwrap();
        let mut secrets = SecretStore::new(suite, Arc::new(MemoryStore::default()));
        secrets.put("site.example.com", "MSG").unwrap();

        Fixture {
            keys,
            secrets,
            surface: ScriptedSurface::new(),
            message,
            program: InjectableProgram::generate("https://vault.example.org", "/embed.html"),
        }
    }

    fn valid_request(fx: &Fixture) -> RelayRequest {
        RelayRequest {
            sender_tag: Some(INJECTOR_TAG.to_string()),
            integrity_hash: Some(fx.program.integrity_hash().to_string()),
        }
    }

    async fn handle(
        fx: &Fixture,
        message: IncomingMessage,
        sink: &CollectingSink,
    ) -> RelayOutcome {
        let prompts = PromptChannel::new(fx.surface.clone());
        let receiver = RelayReceiver::new(&fx.secrets, &fx.keys, &prompts, &fx.program);
        receiver.handle(message, sink).await.unwrap()
    }

    #[tokio::test]
    async fn message_without_origin_is_ignored() {
        let fx = fixture();
        let sink = CollectingSink::default();
        let outcome = handle(
            &fx,
            IncomingMessage {
                origin: None,
                request: Some(valid_request(&fx)),
            },
            &sink,
        )
        .await;
        assert_eq!(outcome, RelayOutcome::Ignored);
        assert!(sink.posts().is_empty());
    }

    #[tokio::test]
    async fn message_with_wrong_tag_is_ignored() {
        let fx = fixture();
        let sink = CollectingSink::default();
        let outcome = handle(
            &fx,
            IncomingMessage {
                origin: Some("https://site.example.com".into()),
                request: Some(RelayRequest {
                    sender_tag: Some("somethingElse".into()),
                    ..valid_request(&fx)
                }),
            },
            &sink,
        )
        .await;
        assert_eq!(outcome, RelayOutcome::Ignored);
        assert!(sink.posts().is_empty());
    }

    #[tokio::test]
    async fn stale_hash_never_reaches_the_stores() {
        let fx = fixture();
        let sink = CollectingSink::default();
        let outcome = handle(
            &fx,
            IncomingMessage {
                origin: Some("https://site.example.com".into()),
                request: Some(RelayRequest {
                    integrity_hash: Some("0".repeat(64)),
                    ..valid_request(&fx)
                }),
            },
            &sink,
        )
        .await;
        assert_eq!(outcome, RelayOutcome::StaleProgram);
        assert!(sink.posts().is_empty());
        assert_eq!(fx.message.decrypt_calls(), 0);
        assert_eq!(fx.surface.open_count(), 0);
    }

    #[tokio::test]
    async fn unknown_hostname_sends_nothing() {
        let fx = fixture();
        let sink = CollectingSink::default();
        let outcome = handle(
            &fx,
            IncomingMessage {
                origin: Some("https://other.example.com".into()),
                request: Some(valid_request(&fx)),
            },
            &sink,
        )
        .await;
        assert_eq!(
            outcome,
            RelayOutcome::SecretNotFound {
                hostname: "other.example.com".into()
            }
        );
        assert!(sink.posts().is_empty());
        assert_eq!(fx.message.decrypt_calls(), 0);
    }

    #[tokio::test]
    async fn valid_request_delivers_first_line_to_sender_origin() {
        let fx = fixture();
        let sink = CollectingSink::default();
        let outcome = handle(
            &fx,
            IncomingMessage {
                // Port differs from hostname lookup on purpose: only the
                // hostname picks the secret, the full origin addresses the
                // reply.
                origin: Some("https://site.example.com:8443".into()),
                request: Some(valid_request(&fx)),
            },
            &sink,
        )
        .await;
        assert_eq!(
            outcome,
            RelayOutcome::Delivered {
                hostname: "site.example.com".into()
            }
        );

        let posts = sink.posts();
        assert_eq!(posts.len(), 1);
        let (target, delivery) = &posts[0];
        assert_eq!(target, "https://site.example.com:8443");
        assert_eq!(delivery.sender_tag, TRUSTED_TAG);
        assert_eq!(delivery.secret, "hunter2");
    }
}
