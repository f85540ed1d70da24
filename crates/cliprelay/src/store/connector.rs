//! Store connection management with endpoint fallback and backoff.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::capture::CapturedEvent;
use crate::logging::{Glyph, Icons};

use super::{Endpoint, Store, StoreConnection, StoreError, StoreResult};

/// Lifecycle of the connector's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; nothing has been tried or the last one was released.
    Absent,
    /// A connection is open and passed its probe.
    Established,
    /// The last connect went through every endpoint without success.
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Established => write!(f, "established"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Open a connection to `endpoint` and probe it, within its connect timeout.
///
/// A connection whose probe fails is closed before the error is returned.
pub(crate) async fn open_endpoint(
    store: &dyn Store,
    endpoint: &Endpoint,
) -> StoreResult<Box<dyn StoreConnection>> {
    let attempt = async {
        let mut conn = store.connect(endpoint).await?;
        if let Err(e) = conn.ping().await {
            conn.close().await;
            return Err(e);
        }
        Ok(conn)
    };

    tokio::time::timeout(endpoint.connect_timeout, attempt)
        .await
        .map_err(|_| StoreError::Timeout {
            endpoint: endpoint.to_string(),
            timeout: endpoint.connect_timeout,
        })?
}

/// Owns at most one connection to one of an ordered list of endpoints.
pub struct StoreConnector {
    store: Arc<dyn Store>,
    endpoints: Vec<Endpoint>,
    connection: Option<Box<dyn StoreConnection>>,
    bound: Option<usize>,
    state: ConnectionState,
    max_retries: u32,
    backoff: Backoff,
    icons: Icons,
}

impl fmt::Debug for StoreConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConnector")
            .field("endpoints", &self.endpoints)
            .field("bound", &self.bound)
            .field("state", &self.state)
            .field("max_retries", &self.max_retries)
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl StoreConnector {
    /// Create a connector that tries `endpoints` in order.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        endpoints: Vec<Endpoint>,
        max_retries: u32,
        backoff: Backoff,
        icons: Icons,
    ) -> Self {
        Self {
            store,
            endpoints,
            connection: None,
            bound: None,
            state: ConnectionState::Absent,
            max_retries,
            backoff,
            icons,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether a connection is established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// The endpoint the current connection is bound to.
    #[must_use]
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.bound.and_then(|index| self.endpoints.get(index))
    }

    /// The configured endpoints, in search order.
    #[must_use]
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Try each endpoint once, in order, and keep the first that connects
    /// and answers the probe.
    ///
    /// Any existing connection is released first. Returns `false` once every
    /// endpoint has failed, leaving no connection behind.
    pub async fn connect(&mut self) -> bool {
        self.release().await;

        let total = self.endpoints.len();
        for (index, endpoint) in self.endpoints.iter().enumerate() {
            info!(
                "{} Attempting store connection {}/{} to {} ({})",
                self.icons.get(Glyph::Retry),
                index + 1,
                total,
                endpoint,
                endpoint.label
            );
            match open_endpoint(self.store.as_ref(), endpoint).await {
                Ok(conn) => {
                    info!(
                        "{} Connected to store via {} ({})",
                        self.icons.get(Glyph::Success),
                        endpoint,
                        endpoint.label
                    );
                    self.connection = Some(conn);
                    self.bound = Some(index);
                    self.state = ConnectionState::Established;
                    return true;
                }
                Err(e) => {
                    warn!(
                        "{} Connection attempt {}/{} failed: {}",
                        self.icons.get(Glyph::Warning),
                        index + 1,
                        total,
                        e
                    );
                }
            }
        }

        error!(
            "{} All store connection attempts failed",
            self.icons.get(Glyph::Error)
        );
        self.state = ConnectionState::Failed;
        false
    }

    /// Repeat [`StoreConnector::connect`] up to `max_retries` times, sleeping
    /// an exponentially growing delay before each attempt.
    pub async fn reconnect_with_backoff(&mut self) -> bool {
        self.backoff.reset();

        for attempt in 1..=self.max_retries {
            let delay = self.backoff.next_delay();
            info!(
                "{} Retrying store connection in {:.1}s (attempt {}/{})",
                self.icons.get(Glyph::Retry),
                delay.as_secs_f64(),
                attempt,
                self.max_retries
            );
            tokio::time::sleep(delay).await;

            if self.connect().await {
                self.backoff.reset();
                return true;
            }
        }

        error!(
            "{} Failed to reconnect after {} attempts",
            self.icons.get(Glyph::Error),
            self.max_retries
        );
        false
    }

    /// Insert one event over the current connection.
    ///
    /// Returns the generated identifier, or `None` if there is no connection
    /// or the store reported an error. On error the connection is released so
    /// the next caller has to reconnect. Never retries.
    pub async fn insert(&mut self, event: &CapturedEvent) -> Option<i64> {
        let Some(conn) = self.connection.as_mut() else {
            error!(
                "{} No store connection available",
                self.icons.get(Glyph::Error)
            );
            return None;
        };

        match conn.insert(event).await {
            Ok(id) => {
                info!("{} Capture inserted with id {}", self.icons.get(Glyph::Success), id);
                Some(id)
            }
            Err(e) => {
                error!("{} Store insert failed: {}", self.icons.get(Glyph::Error), e);
                self.invalidate(&e).await;
                None
            }
        }
    }

    /// Release the connection. Safe to call repeatedly.
    pub async fn close(&mut self) {
        if self.release().await {
            info!("{} Store connection closed", self.icons.get(Glyph::Plug));
        }
    }

    async fn invalidate(&mut self, cause: &StoreError) {
        let Some(conn) = self.connection.take() else {
            return;
        };
        if cause.is_connection_level() {
            debug!("Dropping broken store connection");
            drop(conn);
        } else {
            conn.close().await;
        }
        self.bound = None;
        self.state = ConnectionState::Absent;
    }

    /// Close any open connection; returns whether there was one.
    async fn release(&mut self) -> bool {
        let had_connection = match self.connection.take() {
            Some(conn) => {
                conn.close().await;
                true
            }
            None => false,
        };
        self.bound = None;
        self.state = ConnectionState::Absent;
        had_connection
    }
}
