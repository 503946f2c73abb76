//! Shared fakes for unit tests: an in-memory blob store, a scriptable PGP
//! suite, and a scripted prompt surface.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::mpsc;

use crate::core::errors::{PassrelayError, Result};
use crate::core::models::key_id::KeyId;
use crate::core::models::stored_key::KeyMaterialForDecryption;
use crate::core::models::stored_secret::SessionKeyRef;
use crate::core::traits::pgp::{KeyHandle, KeyMaterial, MessageHandle, PgpSuite};
use crate::core::traits::relay::{ReplySink, SecretDelivery};
use crate::core::traits::storage::BlobStore;
use crate::core::traits::surface::{PromptSurface, SurfaceEvent, SurfaceHandle};

/// Parse a test key id, panicking on bad input.
pub fn key_id(hex: &str) -> KeyId {
    KeyId::from_hex(hex).unwrap()
}

/// In-memory `BlobStore`.
#[derive(Default)]
pub struct MemoryStore {
    cells: Mutex<HashMap<String, String>>,
}

impl BlobStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cells.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.cells
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Key material whose locked state is driven by an expected passphrase.
pub struct FakeMaterial {
    passphrase: Option<String>,
    unlocked: AtomicBool,
}

impl FakeMaterial {
    fn new(passphrase: Option<String>) -> Self {
        Self {
            passphrase,
            unlocked: AtomicBool::new(false),
        }
    }
}

impl KeyMaterial for FakeMaterial {
    fn is_locked(&self) -> bool {
        self.passphrase.is_some() && !self.unlocked.load(Ordering::SeqCst)
    }

    fn unlock(&self, passphrase: &str) -> Result<bool> {
        match &self.passphrase {
            None => Ok(true),
            Some(expected) if expected == passphrase => {
                self.unlocked.store(true, Ordering::SeqCst);
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// A scriptable key handle.
pub struct FakeKey {
    id: KeyId,
    sub_ids: Vec<KeyId>,
    users: Vec<String>,
    passphrase: Option<String>,
    primary: OnceLock<Arc<FakeMaterial>>,
    subs: OnceLock<Vec<Arc<FakeMaterial>>>,
}

impl FakeKey {
    pub fn new(primary_hex: &str) -> Self {
        Self {
            id: key_id(primary_hex),
            sub_ids: Vec::new(),
            users: Vec::new(),
            passphrase: None,
            primary: OnceLock::new(),
            subs: OnceLock::new(),
        }
    }

    pub fn with_sub_keys(mut self, hex_ids: &[&str]) -> Self {
        self.sub_ids = hex_ids.iter().map(|h| key_id(h)).collect();
        self
    }

    pub fn with_user(mut self, user: &str) -> Self {
        self.users.push(user.to_string());
        self
    }

    /// Lock the key's material behind `passphrase`.
    pub fn locked_with(mut self, passphrase: &str) -> Self {
        self.passphrase = Some(passphrase.to_string());
        self
    }
}

impl KeyHandle for FakeKey {
    fn primary_id(&self) -> KeyId {
        self.id
    }

    fn sub_key_ids(&self) -> Vec<KeyId> {
        self.sub_ids.clone()
    }

    fn user_identities(&self) -> Vec<String> {
        self.users.clone()
    }

    fn primary_material(&self) -> Arc<dyn KeyMaterial> {
        self.primary
            .get_or_init(|| Arc::new(FakeMaterial::new(self.passphrase.clone())))
            .clone()
    }

    fn sub_key_material(&self, index: usize) -> Option<Arc<dyn KeyMaterial>> {
        let subs = self.subs.get_or_init(|| {
            self.sub_ids
                .iter()
                .map(|_| Arc::new(FakeMaterial::new(self.passphrase.clone())))
                .collect()
        });
        subs.get(index).map(|m| m.clone() as Arc<dyn KeyMaterial>)
    }
}

/// A scriptable encrypted message. Clones share the decrypt counter.
#[derive(Clone)]
pub struct FakeMessage {
    plaintext: String,
    refs: Vec<SessionKeyRef>,
    decrypt_calls: Arc<AtomicU32>,
}

impl FakeMessage {
    pub fn new(plaintext: &str) -> Self {
        Self {
            plaintext: plaintext.to_string(),
            refs: Vec::new(),
            decrypt_calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn with_session_keys(mut self, hex_ids: &[&str]) -> Self {
        self.refs = hex_ids
            .iter()
            .map(|h| SessionKeyRef { key_id: key_id(h) })
            .collect();
        self
    }

    pub fn decrypt_calls(&self) -> u32 {
        self.decrypt_calls.load(Ordering::SeqCst)
    }
}

impl MessageHandle for FakeMessage {
    fn session_key_refs(&self) -> Vec<SessionKeyRef> {
        self.refs.clone()
    }

    fn decrypt(
        &self,
        selection: &KeyMaterialForDecryption,
        _session_key: &SessionKeyRef,
    ) -> Result<String> {
        if selection.material.is_locked() {
            return Err(PassrelayError::Backend {
                reason: "decrypt called with locked key material".into(),
            });
        }
        self.decrypt_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.plaintext.clone())
    }
}

#[derive(Default)]
struct FakeRegistry {
    keys: HashMap<String, Vec<Arc<dyn KeyHandle>>>,
    messages: HashMap<String, Vec<Arc<dyn MessageHandle>>>,
}

/// A PGP suite that parses exactly what tests registered, and nothing else.
#[derive(Clone, Default)]
pub struct FakeSuite {
    registry: Arc<Mutex<FakeRegistry>>,
}

impl FakeSuite {
    pub fn register_key(&self, armored: &str, key: FakeKey) {
        self.register_keys(armored, vec![key]);
    }

    pub fn register_keys(&self, armored: &str, keys: Vec<FakeKey>) {
        self.registry.lock().unwrap().keys.insert(
            armored.to_string(),
            keys.into_iter()
                .map(|k| Arc::new(k) as Arc<dyn KeyHandle>)
                .collect(),
        );
    }

    pub fn register_message(&self, armored: &str, message: FakeMessage) {
        self.register_messages(armored, vec![message]);
    }

    pub fn register_messages(&self, armored: &str, messages: Vec<FakeMessage>) {
        self.registry.lock().unwrap().messages.insert(
            armored.to_string(),
            messages
                .into_iter()
                .map(|m| Arc::new(m) as Arc<dyn MessageHandle>)
                .collect(),
        );
    }
}

impl PgpSuite for FakeSuite {
    fn parse_private_keys(&self, armored: &str) -> Result<Vec<Arc<dyn KeyHandle>>> {
        Ok(self
            .registry
            .lock()
            .unwrap()
            .keys
            .get(armored)
            .cloned()
            .unwrap_or_default())
    }

    fn parse_messages(&self, armored: &str) -> Result<Vec<Arc<dyn MessageHandle>>> {
        Ok(self
            .registry
            .lock()
            .unwrap()
            .messages
            .get(armored)
            .cloned()
            .unwrap_or_default())
    }
}

struct ScriptedInner {
    scripts: Mutex<VecDeque<Vec<SurfaceEvent>>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
    rendered: Mutex<Vec<String>>,
}

/// A prompt surface that plays back pre-scripted events, one script per
/// opened context. A context whose script ends without a terminal event
/// stays pending until something closes it.
#[derive(Clone)]
pub struct ScriptedSurface {
    inner: Arc<ScriptedInner>,
}

impl ScriptedSurface {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ScriptedInner {
                scripts: Mutex::new(VecDeque::new()),
                opens: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                rendered: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Queue the event script for the next opened context.
    pub fn script(&self, events: Vec<SurfaceEvent>) {
        self.inner.scripts.lock().unwrap().push_back(events);
    }

    pub fn open_count(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    pub fn closed_count(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    pub fn rendered(&self) -> Vec<String> {
        self.inner.rendered.lock().unwrap().clone()
    }
}

struct ScriptedHandle {
    inner: Arc<ScriptedInner>,
    // Keeping the sender alive keeps an exhausted script pending instead of
    // ending the stream.
    tx: mpsc::UnboundedSender<SurfaceEvent>,
    closed: AtomicBool,
}

impl SurfaceHandle for ScriptedHandle {
    fn render(&self, markup: &str) {
        self.inner.rendered.lock().unwrap().push(markup.to_string());
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.inner.closes.fetch_add(1, Ordering::SeqCst);
            let _ = self.tx.send(SurfaceEvent::Closed);
        }
    }
}

impl PromptSurface for ScriptedSurface {
    fn open(&self) -> (Arc<dyn SurfaceHandle>, mpsc::UnboundedReceiver<SurfaceEvent>) {
        self.inner.opens.fetch_add(1, Ordering::SeqCst);
        let script = self
            .inner
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();

        let (tx, rx) = mpsc::unbounded_channel();
        for event in script {
            let _ = tx.send(event);
        }
        let handle = Arc::new(ScriptedHandle {
            inner: self.inner.clone(),
            tx,
            closed: AtomicBool::new(false),
        });
        (handle, rx)
    }
}

/// A reply sink that records every delivery it was asked to post.
#[derive(Default)]
pub struct CollectingSink {
    posts: Mutex<Vec<(String, SecretDelivery)>>,
}

impl CollectingSink {
    pub fn posts(&self) -> Vec<(String, SecretDelivery)> {
        self.posts.lock().unwrap().clone()
    }
}

impl ReplySink for CollectingSink {
    fn post(&self, target_origin: &str, delivery: SecretDelivery) -> Result<()> {
        self.posts
            .lock()
            .unwrap()
            .push((target_origin.to_string(), delivery));
        Ok(())
    }
}
