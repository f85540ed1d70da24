//! Global hotkey registration.
//!
//! Combos are written as `+`-separated tokens, modifiers first and the key
//! last, e.g. `ctrl+alt+c` or `ctrl+shift+f12`.

use livesplit_hotkey::{Hook, Hotkey, KeyCode, Modifiers};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while managing hotkeys.
#[derive(Debug, Error)]
pub enum HotkeyError {
    /// The combo string could not be parsed.
    #[error("invalid hotkey combo '{combo}': {reason}")]
    InvalidCombo {
        /// The combo as written.
        combo: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The platform hook could not be created.
    #[error("failed to create hotkey hook: {0}")]
    HookUnavailable(String),

    /// The platform refused the registration.
    #[error("failed to register hotkey '{combo}': {message}")]
    RegistrationFailed {
        /// The combo being registered.
        combo: String,
        /// The underlying error.
        message: String,
    },
}

/// Result type for hotkey operations.
pub type Result<T> = std::result::Result<T, HotkeyError>;

/// Parse a combo such as `ctrl+alt+c` into a hotkey.
///
/// # Errors
///
/// Returns an error for an empty combo, an unknown modifier, or an unknown key.
pub fn parse_combo(combo: &str) -> Result<Hotkey> {
    let invalid = |reason: &str| HotkeyError::InvalidCombo {
        combo: combo.to_string(),
        reason: reason.to_string(),
    };

    let tokens: Vec<&str> = combo
        .split('+')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();
    let Some((key, modifier_tokens)) = tokens.split_last() else {
        return Err(invalid("no key given"));
    };

    let mut modifiers = Modifiers::empty();
    for token in modifier_tokens {
        let modifier = match token.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => Modifiers::CONTROL,
            "alt" | "option" => Modifiers::ALT,
            "shift" => Modifiers::SHIFT,
            "meta" | "super" | "win" | "cmd" => Modifiers::META,
            _ => return Err(invalid(&format!("unknown modifier '{token}'"))),
        };
        modifiers.insert(modifier);
    }

    let key_code = key_code_name(key)
        .parse::<KeyCode>()
        .map_err(|_| invalid(&format!("unknown key '{key}'")))?;

    Ok(Hotkey {
        key_code,
        modifiers,
    })
}

/// Translate a short key name into its W3C key code name.
fn key_code_name(key: &str) -> String {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => format!("Key{}", c.to_ascii_uppercase()),
        (Some(c), None) if c.is_ascii_digit() => format!("Digit{c}"),
        _ => match key.to_ascii_lowercase().as_str() {
            "space" => "Space".to_string(),
            "enter" | "return" => "Enter".to_string(),
            "tab" => "Tab".to_string(),
            "esc" | "escape" => "Escape".to_string(),
            lower if lower.starts_with('f') && lower[1..].parse::<u8>().is_ok() => {
                lower.to_ascii_uppercase()
            }
            _ => key.to_string(),
        },
    }
}

/// A global hotkey hook that tracks what it has registered.
pub struct HotkeyHook {
    hook: Hook,
    registered: Vec<(String, Hotkey)>,
}

impl std::fmt::Debug for HotkeyHook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HotkeyHook")
            .field(
                "registered",
                &self.registered.iter().map(|(c, _)| c).collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl HotkeyHook {
    /// Create a hook on the platform's global keyboard facility.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform hook cannot be installed.
    pub fn new() -> Result<Self> {
        let hook = Hook::new().map_err(|e| HotkeyError::HookUnavailable(format!("{e:?}")))?;
        Ok(Self {
            hook,
            registered: Vec::new(),
        })
    }

    /// Register `callback` to run whenever `combo` is pressed.
    ///
    /// The callback runs on the hook's own thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the combo is invalid or the platform refuses it.
    pub fn register<F>(&mut self, combo: &str, callback: F) -> Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        let hotkey = parse_combo(combo)?;
        self.hook
            .register(hotkey, callback)
            .map_err(|e| HotkeyError::RegistrationFailed {
                combo: combo.to_string(),
                message: format!("{e:?}"),
            })?;
        debug!(combo, "Hotkey registered");
        self.registered.push((combo.to_string(), hotkey));
        Ok(())
    }

    /// Unregister every hotkey registered through this hook.
    ///
    /// Failures are logged and skipped; the hook forgets all combos either way.
    pub fn unregister_all(&mut self) {
        for (combo, hotkey) in self.registered.drain(..) {
            if let Err(e) = self.hook.unregister(hotkey) {
                debug!(combo = %combo, error = ?e, "Hotkey was already gone");
            }
        }
    }

    /// Check whether any registration is active.
    ///
    /// This reflects this hook's own bookkeeping only. The OS hook offers no
    /// liveness query, so a registration dropped behind our back still counts
    /// as active until [`HotkeyHook::unregister_all`].
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.registered.is_empty()
    }
}
