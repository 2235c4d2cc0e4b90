//! Copy-to-clipboard export.
//!
//! The clipboard always receives the raw Markdown+LaTeX source, never the
//! rendered HTML: pasted into a notes app or another chat it stays editable
//! and re-renderable.

use crate::error::TutorError;
use crate::output::Answer;
use arboard::Clipboard;
use tracing::{info, warn};

/// Destination for plain UTF-8 text.
pub trait ClipboardSink {
    fn set_text(&mut self, text: &str) -> Result<(), String>;
}

/// The system clipboard via `arboard`.
///
/// On X11/Wayland the copying process owns the selection; the text stays
/// available while the clipboard value is alive.
pub struct ArboardClipboard {
    inner: Clipboard,
}

impl ArboardClipboard {
    pub fn new() -> Result<Self, TutorError> {
        let inner = Clipboard::new().map_err(|e| TutorError::ClipboardFailed {
            detail: e.to_string(),
        })?;
        Ok(Self { inner })
    }
}

impl ClipboardSink for ArboardClipboard {
    fn set_text(&mut self, text: &str) -> Result<(), String> {
        self.inner.set_text(text).map_err(|e| e.to_string())
    }
}

/// Copy the unrendered answer text to `sink`, byte-for-byte.
///
/// Returns the number of bytes copied.
pub fn copy_answer(answer: &Answer, sink: &mut dyn ClipboardSink) -> Result<usize, TutorError> {
    match sink.set_text(answer.as_str()) {
        Ok(()) => {
            info!("Copied {} bytes to clipboard", answer.len());
            Ok(answer.len())
        }
        Err(detail) => {
            warn!("Clipboard copy failed: {}", detail);
            Err(TutorError::ClipboardFailed { detail })
        }
    }
}
