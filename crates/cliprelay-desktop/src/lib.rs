//! Desktop bindings for cliprelay.
//!
//! This crate wraps the operating-system facilities cliprelay depends on: the
//! system clipboard and global hotkey registration. It holds no capture logic
//! of its own; the core crate adapts these types to its own traits.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod clipboard;
pub mod hotkey;

pub use clipboard::{ClipboardError, SystemClipboard};
pub use hotkey::{parse_combo, HotkeyError, HotkeyHook};

/// Initialize desktop components.
///
/// # Errors
///
/// Returns an error if initialization fails.
pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    tracing::debug!(platform = platform_name(), "Initializing desktop bindings");
    Ok(())
}

/// Get the platform name.
#[must_use]
pub fn platform_name() -> &'static str {
    match std::env::consts::OS {
        "windows" => "Windows",
        "macos" => "macOS",
        "linux" => "Linux",
        other => other,
    }
}
