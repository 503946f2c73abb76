use std::sync::Arc;

use tokio::sync::mpsc;

/// Events emitted by a secondary display context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// The context finished loading and can render content.
    Ready,
    /// The user submitted one line of input.
    Submitted(String),
    /// The user explicitly cancelled.
    Cancelled,
    /// The context went away by any other means.
    Closed,
}

/// A live secondary context, held by the prompt channel while a session is
/// open.
pub trait SurfaceHandle: Send + Sync {
    /// Display the prompt markup. Called once, after the context signalled
    /// `Ready`.
    fn render(&self, markup: &str);

    /// Tear the context down. Implementations must end the context's event
    /// stream (emit `Closed` or drop the sender) so that a pending wait on
    /// it rejects; repeated calls are harmless.
    fn close(&self);
}

/// Port for the secondary display surface used to collect one line of input
/// from the user (a popup window, a terminal, a test script).
pub trait PromptSurface: Send + Sync {
    /// Open a fresh context. Returns its handle and the stream its events
    /// arrive on.
    fn open(&self) -> (Arc<dyn SurfaceHandle>, mpsc::UnboundedReceiver<SurfaceEvent>);
}
