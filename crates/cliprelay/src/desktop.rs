//! Adapters from the desktop bindings to the capture and trigger traits.

use cliprelay_desktop::{HotkeyError, HotkeyHook, SystemClipboard};

use crate::capture::CaptureSource;
use crate::error::Error;
use crate::trigger::{self, TriggerCallback, TriggerError, TriggerFacility};

/// The system clipboard as a capture source.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClipboardSource {
    clipboard: SystemClipboard,
}

impl ClipboardSource {
    /// Create a clipboard source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaptureSource for ClipboardSource {
    fn name(&self) -> &'static str {
        "clipboard"
    }

    fn read_raw(&self) -> Result<Option<String>, Error> {
        self.clipboard
            .read_text()
            .map_err(|e| Error::platform(e.to_string()))
    }
}

/// Global hotkeys as a trigger facility.
#[derive(Debug)]
pub struct HotkeyTriggers {
    hook: HotkeyHook,
}

impl HotkeyTriggers {
    /// Install a global hotkey hook.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform hook cannot be installed.
    pub fn new() -> trigger::Result<Self> {
        let hook = HotkeyHook::new().map_err(trigger_error)?;
        Ok(Self { hook })
    }
}

impl TriggerFacility for HotkeyTriggers {
    fn register(&mut self, combo: &str, callback: TriggerCallback) -> trigger::Result<()> {
        self.hook.register(combo, callback).map_err(trigger_error)
    }

    fn unregister_all(&mut self) {
        self.hook.unregister_all();
    }

    fn is_active(&self) -> bool {
        self.hook.is_active()
    }
}

fn trigger_error(err: HotkeyError) -> TriggerError {
    match err {
        HotkeyError::InvalidCombo { combo, reason } => TriggerError::InvalidCombo { combo, reason },
        HotkeyError::HookUnavailable(message) => TriggerError::Unavailable(message),
        HotkeyError::RegistrationFailed { combo, message } => {
            TriggerError::Registration { combo, message }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clipboard_source_name() {
        assert_eq!(ClipboardSource::new().name(), "clipboard");
    }

    #[test]
    fn test_invalid_combo_maps_through() {
        let err = trigger_error(cliprelay_desktop::parse_combo("hyper+c").unwrap_err());
        assert!(matches!(err, TriggerError::InvalidCombo { ref combo, .. } if combo == "hyper+c"));
    }

    #[test]
    fn test_hook_errors_map_through() {
        let err = trigger_error(HotkeyError::HookUnavailable("no display".to_string()));
        assert!(matches!(err, TriggerError::Unavailable(_)));

        let err = trigger_error(HotkeyError::RegistrationFailed {
            combo: "ctrl+alt+c".to_string(),
            message: "taken".to_string(),
        });
        assert!(err.to_string().contains("ctrl+alt+c"));
    }
}
