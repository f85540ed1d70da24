//! Error types for cliprelay.
//!
//! This module defines the crate-level error type used for configuration,
//! I/O and platform failures. Component errors with their own recovery rules
//! (store, trigger, service) live next to those components.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for cliprelay operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    /// A required credential is not configured.
    #[error("missing credential: {name}. {instructions}")]
    MissingCredential {
        /// Name of the missing setting.
        name: String,
        /// How to supply it.
        instructions: String,
    },

    // === Platform Errors ===
    /// Platform-specific operation failed.
    #[error("platform error: {0}")]
    Platform(String),

    // === I/O Errors ===
    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for cliprelay operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new platform error.
    #[must_use]
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform(message.into())
    }

    /// Create a configuration validation error.
    #[must_use]
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create a missing credential error with instructions.
    #[must_use]
    pub fn missing_credential(name: impl Into<String>, instructions: impl Into<String>) -> Self {
        Self::MissingCredential {
            name: name.into(),
            instructions: instructions.into(),
        }
    }

    /// Check if this error comes from configuration rather than the runtime.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad(_) | Self::ConfigValidation { .. } | Self::MissingCredential { .. }
        )
    }
}
