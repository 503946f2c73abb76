use crate::core::errors::Result;
use crate::core::models::stored_secret::StoredSecret;
use crate::core::services::key_store::KeyStore;
use crate::core::services::prompt::PromptChannel;
use crate::core::services::resolver::KeyResolver;
use crate::core::traits::surface::PromptSurface;

/// Passphrase attempts allowed before a session gives up.
pub const MAX_PASSPHRASE_ATTEMPTS: u32 = 3;

/// Why an unlock session ended without producing plaintext.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbandonReason {
    /// None of the secret's session keys resolved to a stored key.
    NoMatchingKey,
    /// The user cancelled the passphrase prompt, or it was preempted.
    Dismissed,
    /// Every allowed passphrase attempt failed.
    AttemptsExhausted(u32),
}

impl std::fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbandonReason::NoMatchingKey => write!(f, "could not find a key for this secret"),
            AbandonReason::Dismissed => write!(f, "the passphrase prompt was dismissed"),
            AbandonReason::AttemptsExhausted(n) => write!(f, "giving up after {n} attempts"),
        }
    }
}

/// Terminal result of an unlock session. Failures are outcomes, not errors;
/// `Err` is reserved for backend trouble.
#[derive(Debug)]
pub enum UnlockOutcome {
    Plaintext(String),
    Abandoned(AbandonReason),
}

/// Bounded-retry state machine that turns one stored secret into plaintext:
/// match a session key to stored key material, collect a passphrase if the
/// material is locked, verify it with bounded retries, then decrypt.
///
/// All state is scoped to one `run` call, so concurrent sessions for
/// unrelated secrets never share attempt counters.
pub struct UnlockSession<'a, S: PromptSurface> {
    keys: &'a KeyStore,
    prompts: &'a PromptChannel<S>,
    max_attempts: u32,
}

impl<'a, S: PromptSurface> UnlockSession<'a, S> {
    pub fn new(keys: &'a KeyStore, prompts: &'a PromptChannel<S>) -> Self {
        Self {
            keys,
            prompts,
            max_attempts: MAX_PASSPHRASE_ATTEMPTS,
        }
    }

    pub async fn run(&self, secret: &StoredSecret) -> Result<UnlockOutcome> {
        // Matching: first session key that resolves to stored material wins.
        let resolver = KeyResolver::new(self.keys);
        let mut selection = None;
        for session_key in secret.handle.session_key_refs() {
            if let Some(found) = resolver.resolve(&session_key.key_id) {
                selection = Some((found, session_key));
                break;
            }
        }
        let Some((for_decryption, session_key)) = selection else {
            return Ok(UnlockOutcome::Abandoned(AbandonReason::NoMatchingKey));
        };

        // Prompting / verifying. Already-unlocked material skips straight to
        // the decrypt call.
        let mut attempts = 0u32;
        while for_decryption.material.is_locked() {
            let mut message = format!("Password for key {}", for_decryption.key.user());
            if attempts > 0 {
                message = format!("Wrong password, try again.\n{message}");
            }
            let entered = match self.prompts.request_line(&message).await {
                Ok(line) => line,
                Err(_) => return Ok(UnlockOutcome::Abandoned(AbandonReason::Dismissed)),
            };
            if for_decryption.material.unlock(&entered)? {
                break;
            }
            attempts += 1;
            if attempts >= self.max_attempts {
                return Ok(UnlockOutcome::Abandoned(AbandonReason::AttemptsExhausted(
                    attempts,
                )));
            }
        }

        let plaintext = secret.handle.decrypt(&for_decryption, &session_key)?;
        Ok(UnlockOutcome::Plaintext(plaintext))
    }
}
