//! PostgreSQL store backed by sqlx.

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use tracing::{debug, warn};

use crate::capture::CapturedEvent;

use super::{Endpoint, Store, StoreConnection, StoreError, StoreResult};

const INSERT_SQL: &str = "INSERT INTO questions_answers (question) VALUES ($1) RETURNING id::bigint";
const VERSION_SQL: &str = "SELECT version()";
const APPLICATION_NAME: &str = "cliprelay";

/// Opens one direct connection per [`Store::connect`] call, no pooling.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresStore;

impl PostgresStore {
    /// Create a new PostgreSQL store.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn options(endpoint: &Endpoint) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&endpoint.host)
            .port(endpoint.port)
            .database(&endpoint.database)
            .username(&endpoint.user)
            .password(&endpoint.password)
            .application_name(APPLICATION_NAME)
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn connect(&self, endpoint: &Endpoint) -> StoreResult<Box<dyn StoreConnection>> {
        debug!(endpoint = %endpoint, database = %endpoint.database, "Opening PostgreSQL connection");
        let conn = PgConnection::connect_with(&Self::options(endpoint))
            .await
            .map_err(|e| StoreError::Connect {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;
        Ok(Box::new(PostgresConnection { conn }))
    }
}

/// A live PostgreSQL connection.
#[derive(Debug)]
pub struct PostgresConnection {
    conn: PgConnection,
}

#[async_trait]
impl StoreConnection for PostgresConnection {
    async fn ping(&mut self) -> StoreResult<()> {
        self.conn.ping().await.map_err(classify)
    }

    async fn insert(&mut self, event: &CapturedEvent) -> StoreResult<i64> {
        sqlx::query_scalar::<_, i64>(INSERT_SQL)
            .bind(event.text())
            .fetch_one(&mut self.conn)
            .await
            .map_err(classify)
    }

    async fn server_version(&mut self) -> StoreResult<String> {
        sqlx::query_scalar::<_, String>(VERSION_SQL)
            .fetch_one(&mut self.conn)
            .await
            .map_err(classify)
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.conn.close().await {
            warn!(error = %e, "Error while closing PostgreSQL connection");
        }
    }
}

/// Map a sqlx error onto the connection/statement split.
fn classify(err: sqlx::Error) -> StoreError {
    if is_statement_error(&err) {
        StoreError::Statement(err.to_string())
    } else {
        StoreError::Connection(err.to_string())
    }
}

fn is_statement_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(_)
            | sqlx::Error::RowNotFound
            | sqlx::Error::TypeNotFound { .. }
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Encode(_)
            | sqlx::Error::Decode(_)
    )
}
