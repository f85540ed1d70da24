//! `cliprelay` - Send clipboard text to a database on a hotkey
//!
//! This library provides the resilient capture core: a store connector with
//! endpoint fallback and backoff, the per-trigger capture pipeline, the capture
//! service with its trigger liveness checks, and the supervisor that restarts
//! the service after faults.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod backoff;
pub mod capture;
pub mod cli;
pub mod config;
pub mod desktop;
pub mod diagnostic;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod service;
pub mod store;
pub mod supervisor;
pub mod trigger;

#[cfg(test)]
mod testing;

pub use backoff::Backoff;
pub use capture::{CaptureSource, CapturedEvent};
pub use config::Config;
pub use error::{Error, Result};
pub use logging::{init_logging, Glyph, Icons};
pub use pipeline::{CapturePipeline, TriggerOutcome};
pub use service::{CaptureService, ServiceError, ServiceSettings, ServiceState, ServiceStats};
pub use store::{ConnectionState, Endpoint, PostgresStore, Store, StoreConnector, StoreError};
pub use supervisor::{ServiceFactory, Supervisor, SupervisorReport};
pub use trigger::{Trigger, TriggerError, TriggerFacility};
