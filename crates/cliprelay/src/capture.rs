//! Core capture types for cliprelay.
//!
//! This module defines the captured event forwarded to the store and the
//! trait for reading the text payload on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Error;

/// Number of characters shown when a capture is logged.
const PREVIEW_CHARS: usize = 100;

/// A piece of text captured by a trigger.
///
/// Exists only for the duration of one pipeline run; it is forwarded to the
/// store or dropped and counted as failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedEvent {
    /// The captured text, never empty.
    text: String,

    /// When the capture occurred.
    pub captured_at: DateTime<Utc>,
}

impl CapturedEvent {
    /// Create an event stamped with the current time.
    ///
    /// Returns `None` for empty text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Option<Self> {
        let text = text.into();
        if text.is_empty() {
            return None;
        }
        Some(Self {
            text,
            captured_at: Utc::now(),
        })
    }

    /// The captured text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length of the text in characters.
    #[must_use]
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    /// The first characters of the text, for log lines.
    #[must_use]
    pub fn preview(&self) -> String {
        let mut preview: String = self.text.chars().take(PREVIEW_CHARS).collect();
        if self.char_count() > PREVIEW_CHARS {
            preview.push_str("...");
        }
        preview
    }
}

/// Source of the text payload read when a capture fires.
///
/// Implementors supply [`CaptureSource::read_raw`]; [`CaptureSource::read`]
/// layers the trimming and never-fail contract on top.
pub trait CaptureSource {
    /// The name of this source (for logging/debugging).
    fn name(&self) -> &'static str;

    /// Read the raw payload.
    ///
    /// `Ok(None)` means the source holds no text.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying facility cannot be read.
    fn read_raw(&self) -> Result<Option<String>, Error>;

    /// Read the current text with surrounding whitespace trimmed.
    ///
    /// Returns an empty string, after logging a warning, when the source has
    /// no text or cannot be read.
    fn read(&self) -> String {
        match self.read_raw() {
            Ok(Some(text)) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    warn!(source = self.name(), "Capture source holds only whitespace");
                }
                trimmed.to_string()
            }
            Ok(None) => {
                warn!(source = self.name(), "Capture source is empty or contains no text");
                String::new()
            }
            Err(e) => {
                warn!(source = self.name(), error = %e, "Failed to read capture source");
                String::new()
            }
        }
    }
}
