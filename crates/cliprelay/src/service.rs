//! The capture service: connection, trigger registration and the run loop.
//!
//! A service instance goes `stopped -> starting -> running -> stopping -> stopped`
//! once. The supervisor builds a fresh instance for every restart.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::capture::CaptureSource;
use crate::config::Config;
use crate::logging::{Glyph, Icons};
use crate::pipeline::CapturePipeline;
use crate::store::{Store, StoreConnector};
use crate::trigger::{self, Trigger, TriggerError, TriggerFacility};

/// Lifecycle state of a [`CaptureService`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// Not started, or fully stopped.
    Stopped,
    /// Connecting and registering triggers.
    Starting,
    /// Handling triggers.
    Running,
    /// Releasing triggers and the connection.
    Stopping,
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

/// Counters for one service instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStats {
    /// Triggers that read non-empty text.
    pub captures: u64,
    /// Captures stored.
    pub successful_inserts: u64,
    /// Captures that could not be stored.
    pub failed_inserts: u64,
    /// When the instance first reached `running`.
    pub start_time: Option<DateTime<Utc>>,
    /// Restarts before this instance, carried by the supervisor.
    pub restart_count: u32,
}

impl ServiceStats {
    /// Fresh counters carrying `restart_count` forward.
    #[must_use]
    pub fn with_restart_count(restart_count: u32) -> Self {
        Self {
            restart_count,
            ..Self::default()
        }
    }

    /// Time since `start_time`, if the instance ever ran.
    #[must_use]
    pub fn runtime(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.start_time
            .and_then(|start| (now - start).to_std().ok())
    }

    /// Log the final summary.
    pub fn log_summary(&self, icons: Icons) {
        let runtime = self
            .runtime(Utc::now())
            .map_or_else(|| "never started".to_string(), format_runtime);
        info!("{} Final statistics", icons.get(Glyph::Stats));
        info!("   Runtime: {}", runtime);
        info!("   Restarts: {}", self.restart_count);
        info!("   Captures: {}", self.captures);
        info!("   Successful inserts: {}", self.successful_inserts);
        info!("   Failed inserts: {}", self.failed_inserts);
    }
}

/// Format a duration as `1h 02m 03s`.
#[must_use]
pub fn format_runtime(runtime: Duration) -> String {
    let secs = runtime.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m {seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

/// Errors that end a service instance or keep it from starting.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The service could not be configured.
    #[error("configuration error: {0}")]
    Config(#[from] crate::Error),

    /// No endpoint could be reached, even with backoff.
    #[error("store unavailable on every endpoint")]
    StoreUnavailable,

    /// Triggers could not be registered or re-registered.
    #[error("trigger registration failed: {0}")]
    TriggerRegistration(#[from] TriggerError),

    /// Shutdown was requested while starting.
    #[error("startup cancelled by shutdown request")]
    Cancelled,

    /// The operation needs a different lifecycle state.
    #[error("service is {actual}, expected {expected}")]
    InvalidState {
        /// The state the operation needs.
        expected: ServiceState,
        /// The state the service is in.
        actual: ServiceState,
    },
}

/// Per-instance settings derived from the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Combo that captures.
    pub capture_combo: String,
    /// Combo that stops for good.
    pub stop_combo: String,
    /// Interval between liveness checks.
    pub liveness_interval: Duration,
    /// Re-registration attempts per detected drop.
    pub reregister_attempts: u32,
}

impl ServiceSettings {
    /// Settings from the loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            capture_combo: config.hotkeys.capture.clone(),
            stop_combo: config.hotkeys.stop.clone(),
            liveness_interval: config.liveness_interval(),
            reregister_attempts: config.supervisor.reregister_attempts,
        }
    }
}

/// One instance of the capture service.
pub struct CaptureService {
    settings: ServiceSettings,
    pipeline: CapturePipeline,
    triggers: Box<dyn TriggerFacility>,
    events_tx: mpsc::UnboundedSender<Trigger>,
    events: mpsc::UnboundedReceiver<Trigger>,
    state: ServiceState,
    stats: ServiceStats,
    shutdown: CancellationToken,
    icons: Icons,
}

impl fmt::Debug for CaptureService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureService")
            .field("settings", &self.settings)
            .field("pipeline", &self.pipeline)
            .field("state", &self.state)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl CaptureService {
    /// Create a stopped service.
    #[must_use]
    pub fn new(
        settings: ServiceSettings,
        pipeline: CapturePipeline,
        triggers: Box<dyn TriggerFacility>,
        shutdown: CancellationToken,
        restart_count: u32,
        icons: Icons,
    ) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        Self {
            settings,
            pipeline,
            triggers,
            events_tx,
            events,
            state: ServiceState::Stopped,
            stats: ServiceStats::with_restart_count(restart_count),
            shutdown,
            icons,
        }
    }

    /// Wire a service from the configuration and its collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration yields no usable endpoints.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn Store>,
        source: Box<dyn CaptureSource>,
        triggers: Box<dyn TriggerFacility>,
        shutdown: CancellationToken,
        restart_count: u32,
        icons: Icons,
    ) -> Result<Self, ServiceError> {
        let connector = StoreConnector::new(
            store,
            config.endpoints()?,
            config.retry.max_retries,
            config.reconnect_backoff(),
            icons,
        );
        let pipeline = CapturePipeline::new(source, connector, icons);
        Ok(Self::new(
            ServiceSettings::from_config(config),
            pipeline,
            triggers,
            shutdown,
            restart_count,
            icons,
        ))
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> &ServiceStats {
        &self.stats
    }

    /// The capture pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &CapturePipeline {
        &self.pipeline
    }

    /// Connect to the store and register both triggers.
    ///
    /// On failure the service is left `stopped` with nothing registered and no
    /// connection open.
    ///
    /// # Errors
    ///
    /// Returns an error if the store stays unreachable, a trigger cannot be
    /// registered, or shutdown is requested while connecting.
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        if self.state != ServiceState::Stopped {
            return Err(ServiceError::InvalidState {
                expected: ServiceState::Stopped,
                actual: self.state,
            });
        }

        self.state = ServiceState::Starting;
        info!(
            "{} Starting capture service (restart #{})",
            self.icons.get(Glyph::Start),
            self.stats.restart_count
        );

        if let Err(e) = self.bring_up().await {
            error!("{} Service failed to start: {}", self.icons.get(Glyph::Error), e);
            self.triggers.unregister_all();
            self.pipeline.connector_mut().close().await;
            self.state = ServiceState::Stopped;
            return Err(e);
        }

        self.stats.start_time.get_or_insert_with(Utc::now);
        self.state = ServiceState::Running;
        info!(
            "{} Capture service running: {} captures, {} stops",
            self.icons.get(Glyph::Target),
            self.settings.capture_combo,
            self.settings.stop_combo
        );
        Ok(())
    }

    async fn bring_up(&mut self) -> Result<(), ServiceError> {
        let connector = self.pipeline.connector_mut();
        if !connector.connect().await {
            warn!(
                "{} Initial connection failed, retrying with backoff",
                self.icons.get(Glyph::Warning)
            );
            let shutdown = self.shutdown.clone();
            let connected = tokio::select! {
                connected = connector.reconnect_with_backoff() => connected,
                () = shutdown.cancelled() => return Err(ServiceError::Cancelled),
            };
            if !connected {
                return Err(ServiceError::StoreUnavailable);
            }
        }

        self.register_triggers()?;
        Ok(())
    }

    fn register_triggers(&mut self) -> Result<(), TriggerError> {
        self.triggers.register(
            &self.settings.capture_combo,
            trigger::forward(Trigger::Capture, self.events_tx.clone()),
        )?;
        self.triggers.register(
            &self.settings.stop_combo,
            trigger::forward(Trigger::Stop, self.events_tx.clone()),
        )?;
        debug!(
            capture = %self.settings.capture_combo,
            stop = %self.settings.stop_combo,
            "Triggers registered"
        );
        Ok(())
    }

    /// Handle triggers and watch the registrations until shutdown.
    ///
    /// Returns `Ok(())` once the shutdown token is cancelled, whether by the
    /// stop trigger or from outside.
    ///
    /// # Errors
    ///
    /// Returns an error if the service is not running, or if lost trigger
    /// registrations cannot be restored.
    pub async fn run_forever(&mut self) -> Result<(), ServiceError> {
        if self.state != ServiceState::Running {
            return Err(ServiceError::InvalidState {
                expected: ServiceState::Running,
                actual: self.state,
            });
        }

        let shutdown = self.shutdown.clone();
        let mut liveness = tokio::time::interval(self.settings.liveness_interval);
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        liveness.tick().await;

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    debug!("Shutdown requested, leaving run loop");
                    return Ok(());
                }
                Some(trigger) = self.events.recv() => self.handle(trigger).await,
                _ = liveness.tick() => self.check_liveness()?,
            }
        }
    }

    async fn handle(&mut self, trigger: Trigger) {
        match trigger {
            Trigger::Capture => {
                self.pipeline.on_trigger(self.state, &mut self.stats).await;
            }
            Trigger::Stop => {
                info!(
                    "{} Stop hotkey pressed, shutting down",
                    self.icons.get(Glyph::Stop)
                );
                self.shutdown.cancel();
            }
        }
    }

    fn check_liveness(&mut self) -> Result<(), ServiceError> {
        if self.triggers.is_active() {
            return Ok(());
        }

        warn!(
            "{} Hotkey registrations lost, re-registering",
            self.icons.get(Glyph::Warning)
        );
        let attempts = self.settings.reregister_attempts.max(1);
        let mut attempt = 1;
        loop {
            self.triggers.unregister_all();
            match self.register_triggers() {
                Ok(()) => {
                    info!(
                        "{} Hotkeys re-registered (attempt {}/{})",
                        self.icons.get(Glyph::Success),
                        attempt,
                        attempts
                    );
                    return Ok(());
                }
                Err(e) if attempt >= attempts => {
                    self.triggers.unregister_all();
                    return Err(e.into());
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Hotkey re-registration failed");
                    attempt += 1;
                }
            }
        }
    }

    /// Unregister triggers and close the connection.
    ///
    /// A graceful stop logs and returns the final statistics. Safe to call in
    /// any state.
    pub async fn stop(&mut self, graceful: bool) -> Option<ServiceStats> {
        if self.state == ServiceState::Running {
            info!("{} Stopping capture service", self.icons.get(Glyph::Stop));
        }
        self.state = ServiceState::Stopping;
        self.triggers.unregister_all();
        self.pipeline.connector_mut().close().await;
        self.state = ServiceState::Stopped;

        graceful.then(|| {
            self.stats.log_summary(self.icons);
            self.stats.clone()
        })
    }
}
