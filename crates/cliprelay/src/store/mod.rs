//! Store layer for cliprelay.
//!
//! This module defines the interface to the remote store, the endpoints it can
//! be reached at, and the [`StoreConnector`] that keeps one usable connection
//! across those endpoints.

pub mod connector;
pub mod postgres;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::capture::CapturedEvent;

pub use connector::{ConnectionState, StoreConnector};
pub use postgres::PostgresStore;

/// One connectable address and credential set for the store.
#[derive(Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Short name used in logs (`primary`, `fallback`).
    pub label: String,
    /// Host name or address.
    pub host: String,
    /// Port.
    pub port: u16,
    /// Database name.
    pub database: String,
    /// User name.
    pub user: String,
    /// Password.
    pub password: String,
    /// Timeout for connecting and probing.
    pub connect_timeout: Duration,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("label", &self.label)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"***")
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Errors reported by a store.
///
/// Connection-level errors mean the handle is unusable; statement-level errors
/// come from an otherwise live connection.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Could not open a connection to an endpoint.
    #[error("failed to connect to {endpoint}: {message}")]
    Connect {
        /// The endpoint, as `host:port`.
        endpoint: String,
        /// The underlying error.
        message: String,
    },

    /// Connecting or probing did not finish in time.
    #[error("connection to {endpoint} timed out after {timeout:?}")]
    Timeout {
        /// The endpoint, as `host:port`.
        endpoint: String,
        /// The configured timeout.
        timeout: Duration,
    },

    /// An established connection broke.
    #[error("connection lost: {0}")]
    Connection(String),

    /// A statement failed on a live connection.
    #[error("statement failed: {0}")]
    Statement(String),

    /// No connection is established.
    #[error("no store connection available")]
    NotConnected,
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Whether the connection this error came from can no longer be used.
    #[must_use]
    pub fn is_connection_level(&self) -> bool {
        !matches!(self, Self::Statement(_))
    }
}

/// A store that can open connections to endpoints.
#[async_trait]
pub trait Store: Send + Sync {
    /// Open a connection to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is unreachable or rejects the credentials.
    async fn connect(&self, endpoint: &Endpoint) -> StoreResult<Box<dyn StoreConnection>>;
}

/// An open connection to one endpoint.
#[async_trait]
pub trait StoreConnection: Send {
    /// Run a trivial query to confirm the connection works.
    async fn ping(&mut self) -> StoreResult<()>;

    /// Insert one captured event, returning its generated identifier.
    async fn insert(&mut self, event: &CapturedEvent) -> StoreResult<i64>;

    /// Report the server's version string.
    async fn server_version(&mut self) -> StoreResult<String>;

    /// Close the connection.
    async fn close(self: Box<Self>);
}
