//! The seam between the connection manager and the database driver.

use crate::config::DatabaseConfig;
use crate::database::query::ResultRow;
use crate::database::types::SqlValue;
use crate::error::ServerError;
use async_trait::async_trait;
use std::sync::Arc;

/// Opens handles to the database.
///
/// The manager calls [`Connector::open`] on startup and on every reconnection
/// attempt. Opening may be lazy; the manager pings the handle before using it.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, config: &DatabaseConfig) -> Result<Arc<dyn DbHandle>, ServerError>;
}

/// A live (usually pooled) database handle.
#[async_trait]
pub trait DbHandle: Send + Sync {
    /// Round-trip to the server.
    async fn ping(&self) -> Result<(), ServerError>;

    /// Run a statement with positional parameters and materialize every row.
    async fn fetch_all(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<ResultRow>, ServerError>;

    /// Release the handle's resources. Further calls fail.
    async fn close(&self);
}
