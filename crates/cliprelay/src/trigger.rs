//! Trigger facility abstraction.
//!
//! A trigger facility delivers "the user asked for X" signals, such as global
//! hotkey presses, to callbacks. Callbacks run on the facility's own thread and
//! must only hand a [`Trigger`] over to the service; all processing happens on
//! the service's task.

use std::fmt;

use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur while registering triggers.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// The facility could not be opened at all.
    #[error("trigger facility unavailable: {0}")]
    Unavailable(String),

    /// The combo was not understood.
    #[error("invalid trigger combo '{combo}': {reason}")]
    InvalidCombo {
        /// The combo as written.
        combo: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The facility refused the registration.
    #[error("failed to register trigger '{combo}': {message}")]
    Registration {
        /// The combo being registered.
        combo: String,
        /// The underlying error.
        message: String,
    },
}

/// Result type for trigger operations.
pub type Result<T> = std::result::Result<T, TriggerError>;

/// Callback run by the facility whenever its combo fires.
pub type TriggerCallback = Box<dyn FnMut() + Send + 'static>;

/// What a fired trigger asks the service to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    /// Read the capture source and store the text.
    Capture,
    /// Stop the service without restart.
    Stop,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capture => write!(f, "capture"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

/// A facility that runs callbacks when key combos are pressed.
///
/// Registrations may silently disappear (the OS can drop global hooks), which
/// is what [`TriggerFacility::is_active`] exists to detect.
pub trait TriggerFacility {
    /// Register `callback` for `combo`.
    ///
    /// # Errors
    ///
    /// Returns an error if the combo is invalid or the facility refuses it.
    fn register(&mut self, combo: &str, callback: TriggerCallback) -> Result<()>;

    /// Remove every registration made through this facility.
    ///
    /// Failures are logged by the implementation and otherwise ignored.
    fn unregister_all(&mut self);

    /// Whether at least one registration is still live.
    fn is_active(&self) -> bool;
}

/// Build a callback that forwards `trigger` into `tx`.
///
/// A closed channel means the service instance is gone; the press is dropped.
#[must_use]
pub fn forward(trigger: Trigger, tx: mpsc::UnboundedSender<Trigger>) -> TriggerCallback {
    Box::new(move || {
        let _ = tx.send(trigger);
    })
}
