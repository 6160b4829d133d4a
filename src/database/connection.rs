//! Connection pool management for MySQL.

use super::driver::{Connector, DbHandle};
use super::query::ResultRow;
use super::types::SqlValue;
use crate::config::{DatabaseConfig, SslMode};
use crate::error::{from_sqlx_error, ServerError};
use async_trait::async_trait;
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlSslMode};
use sqlx::query::Query;
use sqlx::{Connection, MySql};
use std::sync::Arc;
use tracing::{debug, info};

/// Type alias for the connection pool.
pub type ConnectionPool = MySqlPool;

/// Build driver connect options from configuration.
pub fn connect_options(config: &DatabaseConfig) -> MySqlConnectOptions {
    MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.username)
        .password(&config.password)
        .database(&config.database)
        .ssl_mode(ssl_mode(config.ssl_mode))
}

fn ssl_mode(mode: SslMode) -> MySqlSslMode {
    match mode {
        SslMode::Disable => MySqlSslMode::Disabled,
        SslMode::Prefer => MySqlSslMode::Preferred,
        SslMode::Require => MySqlSslMode::Required,
        SslMode::VerifyCa => MySqlSslMode::VerifyCa,
        SslMode::VerifyIdentity => MySqlSslMode::VerifyIdentity,
    }
}

/// Create a lazily-connecting pool from configuration.
///
/// No network traffic happens here; the first ping opens a connection.
pub fn create_pool(config: &DatabaseConfig) -> ConnectionPool {
    info!(
        "Creating connection pool for {} (min: {}, max: {})",
        config.display_target(),
        config.pool.min_connections,
        config.pool.max_connections
    );

    MySqlPoolOptions::new()
        .max_connections(config.pool.max_connections)
        .min_connections(config.pool.min_connections)
        .max_lifetime(config.pool.max_lifetime)
        .idle_timeout(config.pool.idle_timeout)
        .acquire_timeout(config.timeouts.connect_timeout)
        .connect_lazy_with(connect_options(config))
}

/// Production [`Connector`] backed by sqlx MySQL pools.
#[derive(Debug, Default, Clone, Copy)]
pub struct MySqlConnector;

#[async_trait]
impl Connector for MySqlConnector {
    async fn open(&self, config: &DatabaseConfig) -> Result<Arc<dyn DbHandle>, ServerError> {
        Ok(Arc::new(MySqlHandle::new(create_pool(config))))
    }
}

/// [`DbHandle`] over a MySQL pool.
#[derive(Debug, Clone)]
pub struct MySqlHandle {
    pool: ConnectionPool,
}

impl MySqlHandle {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DbHandle for MySqlHandle {
    async fn ping(&self) -> Result<(), ServerError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| from_sqlx_error("ping", e))?;
        conn.ping().await.map_err(|e| from_sqlx_error("ping", e))?;
        debug!("Ping successful");
        Ok(())
    }

    async fn fetch_all(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<ResultRow>, ServerError> {
        let query = args
            .iter()
            .fold(sqlx::query(sql), |query, arg| bind_value(query, arg));

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| from_sqlx_error("query", e))?;

        Ok(rows.iter().map(ResultRow::from_mysql_row).collect())
    }

    async fn close(&self) {
        self.pool.close().await;
        debug!("Connection pool closed");
    }
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &SqlValue,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        SqlValue::Null => query.bind(None::<String>),
        SqlValue::Bool(v) => query.bind(*v),
        SqlValue::I64(v) => query.bind(*v),
        SqlValue::U64(v) => query.bind(*v),
        SqlValue::F32(v) => query.bind(*v),
        SqlValue::F64(v) => query.bind(*v),
        SqlValue::String(v) => query.bind(v.clone()),
        SqlValue::Bytes(v) => query.bind(v.clone()),
        SqlValue::Decimal(v) => query.bind(*v),
        SqlValue::Date(v) => query.bind(*v),
        SqlValue::Time(v) => query.bind(*v),
        SqlValue::DateTime(v) => query.bind(*v),
        SqlValue::DateTimeUtc(v) => query.bind(*v),
        SqlValue::Json(v) => query.bind(sqlx::types::Json(v.clone())),
    }
}
