//! The per-trigger capture pipeline.
//!
//! One trigger reads the capture source once and, for non-empty text, ends in
//! exactly one counted outcome: stored or failed. A failed insert gets a single
//! reconnect-and-retry; there is no loop beyond that.

use tracing::{debug, error, info, warn};

use crate::capture::{CaptureSource, CapturedEvent};
use crate::logging::{Glyph, Icons};
use crate::service::{ServiceState, ServiceStats};
use crate::store::StoreConnector;

/// How one trigger ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// The service was not running; nothing was read.
    Discarded,
    /// The source held no text; no counter moved.
    Empty,
    /// The text was stored under this identifier.
    Stored(i64),
    /// The text could not be stored.
    Failed,
}

/// Reads the capture source and forwards the text to the store.
pub struct CapturePipeline {
    source: Box<dyn CaptureSource>,
    connector: StoreConnector,
    icons: Icons,
}

impl std::fmt::Debug for CapturePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturePipeline")
            .field("source", &self.source.name())
            .field("connector", &self.connector)
            .finish_non_exhaustive()
    }
}

impl CapturePipeline {
    /// Create a pipeline over `source` and `connector`.
    #[must_use]
    pub fn new(source: Box<dyn CaptureSource>, connector: StoreConnector, icons: Icons) -> Self {
        Self {
            source,
            connector,
            icons,
        }
    }

    /// The store connector.
    #[must_use]
    pub fn connector(&self) -> &StoreConnector {
        &self.connector
    }

    /// Mutable access to the store connector, for the service's start and stop paths.
    pub fn connector_mut(&mut self) -> &mut StoreConnector {
        &mut self.connector
    }

    /// Handle one capture trigger.
    pub async fn on_trigger(
        &mut self,
        state: ServiceState,
        stats: &mut ServiceStats,
    ) -> TriggerOutcome {
        if state != ServiceState::Running {
            debug!(%state, "Discarding capture trigger while not running");
            return TriggerOutcome::Discarded;
        }

        info!("{} Capture hotkey pressed", self.icons.get(Glyph::Keyboard));

        let Some(event) = CapturedEvent::new(self.source.read()) else {
            warn!(
                "{} Nothing to capture, clipboard is empty",
                self.icons.get(Glyph::Warning)
            );
            return TriggerOutcome::Empty;
        };

        stats.captures += 1;
        info!(
            "{} Captured {} characters: {}",
            self.icons.get(Glyph::Clipboard),
            event.char_count(),
            event.preview()
        );

        if let Some(id) = self.connector.insert(&event).await {
            stats.successful_inserts += 1;
            return TriggerOutcome::Stored(id);
        }

        warn!(
            "{} Insert failed, reconnecting before one retry",
            self.icons.get(Glyph::Retry)
        );
        if self.connector.reconnect_with_backoff().await {
            if let Some(id) = self.connector.insert(&event).await {
                stats.successful_inserts += 1;
                info!(
                    "{} Capture stored after reconnect",
                    self.icons.get(Glyph::Success)
                );
                return TriggerOutcome::Stored(id);
            }
        }

        stats.failed_inserts += 1;
        error!(
            "{} Capture could not be stored ({} failed so far)",
            self.icons.get(Glyph::Error),
            stats.failed_inserts
        );
        TriggerOutcome::Failed
    }
}
