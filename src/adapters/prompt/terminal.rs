use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::traits::surface::{PromptSurface, SurfaceEvent, SurfaceHandle};

/// Prompt surface for the CLI: the "secondary context" is the controlling
/// terminal, and one line read from stdin stands in for the popup form.
pub struct TerminalSurface;

impl PromptSurface for TerminalSurface {
    fn open(&self) -> (Arc<dyn SurfaceHandle>, mpsc::UnboundedReceiver<SurfaceEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        // A terminal is always ready.
        let _ = tx.send(SurfaceEvent::Ready);
        let handle = Arc::new(TerminalHandle {
            tx,
            closed: AtomicBool::new(false),
        });
        (handle, rx)
    }
}

struct TerminalHandle {
    tx: mpsc::UnboundedSender<SurfaceEvent>,
    closed: AtomicBool,
}

impl SurfaceHandle for TerminalHandle {
    fn render(&self, markup: &str) {
        // The channel hands us popup markup; flatten it back to plain text
        // for the terminal.
        println!("  {}", markup_to_text(markup).replace('\n', "\n  "));
        print!("  > ");
        let _ = io::stdout().flush();

        let tx = self.tx.clone();
        std::thread::spawn(move || {
            let mut line = String::new();
            match io::stdin().lock().read_line(&mut line) {
                Ok(0) | Err(_) => {
                    let _ = tx.send(SurfaceEvent::Cancelled);
                }
                Ok(_) => {
                    let entered = line.trim_end_matches(['\r', '\n']).to_string();
                    let _ = tx.send(SurfaceEvent::Submitted(entered));
                }
            }
        });
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(SurfaceEvent::Closed);
        }
    }
}

/// Undo the channel's markup preparation: line breaks back to newlines,
/// escaped metacharacters back to themselves.
fn markup_to_text(markup: &str) -> String {
    markup
        .replace("<br />", "\n")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markup_round_trips_back_to_text() {
        let original = "Wrong password, try again.\nPassword for key Alice <alice@example.com>";
        let markup = crate::core::services::prompt::escape_message(original);
        assert_eq!(markup_to_text(&markup), original);
    }
}
