//! System clipboard access.
//!
//! Reads are synchronous and open a fresh clipboard context each time, so a
//! clipboard owner that disappears between reads never leaves a stale handle.

use clipboard_rs::{Clipboard, ClipboardContext};
use thiserror::Error;
use tracing::trace;

/// Errors that can occur while reading the clipboard.
#[derive(Debug, Error)]
pub enum ClipboardError {
    /// Failed to open the clipboard.
    #[error("clipboard access failed: {0}")]
    AccessFailed(String),
}

/// Result type for clipboard operations.
pub type Result<T> = std::result::Result<T, ClipboardError>;

/// Reader for the system clipboard.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClipboard;

impl SystemClipboard {
    /// Create a new clipboard reader.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Get the current clipboard text.
    ///
    /// Returns `Ok(None)` when the clipboard holds no text or only empty text.
    ///
    /// # Errors
    ///
    /// Returns an error if the clipboard cannot be opened.
    pub fn read_text(&self) -> Result<Option<String>> {
        let ctx =
            ClipboardContext::new().map_err(|e| ClipboardError::AccessFailed(e.to_string()))?;

        match ctx.get_text() {
            Ok(text) if !text.is_empty() => Ok(Some(text)),
            // Non-text content is reported as an error by the backend
            Ok(_) | Err(_) => {
                trace!("Clipboard holds no text");
                Ok(None)
            }
        }
    }
}
