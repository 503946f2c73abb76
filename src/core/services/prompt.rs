use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::core::traits::surface::{PromptSurface, SurfaceEvent, SurfaceHandle};

/// The pending prompt was dismissed before the user submitted anything:
/// cancelled, closed, or preempted by a newer prompt session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptDismissed;

struct CurrentSession {
    seq: u64,
    handle: Arc<dyn SurfaceHandle>,
}

/// Collects one line of input from the user through a secondary display
/// context, enforcing a single active session.
///
/// Opening a new session closes whatever session is currently open, which
/// rejects that session's pending future. Callers must therefore treat
/// `PromptDismissed` as a possible side effect of unrelated, concurrent
/// activity. An open prompt has no timeout and can stay pending
/// indefinitely.
pub struct PromptChannel<S: PromptSurface> {
    surface: S,
    current: Mutex<Option<CurrentSession>>,
    next_seq: AtomicU64,
}

impl<S: PromptSurface> PromptChannel<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            current: Mutex::new(None),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Open a prompt session showing `message` and wait for one line of
    /// input. Resolves with the entered text, or rejects when the context
    /// is cancelled, closed, or preempted.
    pub async fn request_line(&self, message: &str) -> Result<String, PromptDismissed> {
        let (handle, mut events) = self.surface.open();
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);

        // Single active session: whoever was open gets closed, and their
        // pending request_line rejects when its event stream ends.
        let previous = {
            let mut current = self.current.lock().await;
            current.replace(CurrentSession {
                seq,
                handle: handle.clone(),
            })
        };
        if let Some(previous) = previous {
            previous.handle.close();
        }

        let markup = escape_message(message);
        let result = loop {
            match events.recv().await {
                Some(SurfaceEvent::Ready) => {
                    // A ready signal only counts for the session that is
                    // still current; a superseded context gets closed
                    // instead.
                    let is_current = {
                        let current = self.current.lock().await;
                        current.as_ref().is_some_and(|c| c.seq == seq)
                    };
                    if is_current {
                        handle.render(&markup);
                    } else {
                        handle.close();
                        break Err(PromptDismissed);
                    }
                }
                Some(SurfaceEvent::Submitted(line)) => break Ok(line),
                Some(SurfaceEvent::Cancelled) | Some(SurfaceEvent::Closed) | None => {
                    break Err(PromptDismissed)
                }
            }
        };

        // Close handling runs once per session: clear the record only if it
        // still refers to this context.
        {
            let mut current = self.current.lock().await;
            if current.as_ref().is_some_and(|c| c.seq == seq) {
                *current = None;
            }
        }
        if result.is_ok() {
            handle.close();
        }
        result
    }

    /// Close whatever prompt session is currently open, if any.
    pub async fn close_current(&self) {
        let session = self.current.lock().await.take();
        if let Some(session) = session {
            session.handle.close();
        }
    }
}

/// Prepare a prompt message for display: escape markup metacharacters and
/// turn literal newlines into line breaks.
pub fn escape_message(message: &str) -> String {
    message
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\n', "<br />")
}
