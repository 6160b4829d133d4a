//! Connection lifecycle: initial connect, background reconnection, health
//! checks and gated query execution.

use super::connection::MySqlConnector;
use super::driver::{Connector, DbHandle};
use super::query::{truncate_for_log, ResultRow};
use super::types::SqlValue;
use crate::config::{Config, DatabaseConfig, SecurityConfig};
use crate::error::ServerError;
use crate::security::{parse_qualified_name, SqlValidator};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

const TABLES_QUERY: &str = "SELECT table_name AS table_name \
     FROM information_schema.tables \
     WHERE table_schema = DATABASE() \
     ORDER BY table_name";

const TABLE_SCHEMA_QUERY: &str = "SELECT column_name AS column_name, \
     column_type AS column_type, \
     is_nullable AS is_nullable, \
     column_default AS column_default, \
     column_key AS column_key \
     FROM information_schema.columns \
     WHERE table_schema = COALESCE(?, DATABASE()) AND table_name = ? \
     ORDER BY ordinal_position";

/// Snapshot of the connection state for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub last_ping: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub reconnecting: bool,
    pub attempt_count: u32,
}

/// Mutable state guarded by a single lock.
///
/// The active validator lives here too, so mode switches and connection
/// changes serialize against each other.
pub(super) struct ConnectionState {
    handle: Option<Arc<dyn DbHandle>>,
    connected: bool,
    last_error: Option<String>,
    last_ping: Option<DateTime<Utc>>,
    reconnect_attempts: u32,
    reconnecting: bool,
    closed: bool,
    pub(super) validator: Arc<SqlValidator>,
}

pub(super) struct Shared {
    config: DatabaseConfig,
    security: SecurityConfig,
    connector: Arc<dyn Connector>,
    pub(super) state: RwLock<ConnectionState>,
    stop_tx: watch::Sender<bool>,
}

/// Policy-gated access to a single MySQL database that heals its own
/// connection.
///
/// Construction connects once. Whatever the outcome, a background task then
/// retries the connection on a fixed interval whenever it is down, until
/// [`ConnectionManager::close`] is called or the manager is dropped.
pub struct ConnectionManager {
    pub(super) shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Create a manager backed by the MySQL driver.
    pub async fn new(config: Config) -> Result<Self, ServerError> {
        Self::with_connector(config, Arc::new(MySqlConnector)).await
    }

    /// Create a manager that opens handles through `connector`.
    ///
    /// Fails only on invalid configuration. A failed first connection is
    /// logged and left to the reconnection loop.
    pub async fn with_connector(
        config: Config,
        connector: Arc<dyn Connector>,
    ) -> Result<Self, ServerError> {
        config.database.validate()?;
        if config.database.timeouts.reconnect_interval.is_zero() {
            return Err(ServerError::config(
                "reconnect interval must be greater than zero",
            ));
        }

        let validator = Arc::new(SqlValidator::new(config.security.initial_policy()));
        let (stop_tx, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            config: config.database,
            security: config.security,
            connector,
            state: RwLock::new(ConnectionState {
                handle: None,
                connected: false,
                last_error: None,
                last_ping: None,
                reconnect_attempts: 0,
                reconnecting: false,
                closed: false,
                validator,
            }),
            stop_tx,
        });

        info!(target_db = %shared.config.display_target(), "Connecting to database");
        match shared.connect().await {
            Ok(()) => info!("Database connection established"),
            Err(e) => error!(
                error = %e,
                "Initial database connection failed; retrying in the background"
            ),
        }

        spawn_reconnect_loop(&shared);

        Ok(Self { shared })
    }

    /// Whether a live handle is installed.
    pub fn is_connected(&self) -> bool {
        self.shared.state.read().connected
    }

    /// Diagnostic snapshot of the connection state.
    pub fn status(&self) -> ConnectionStatus {
        let state = self.shared.state.read();
        ConnectionStatus {
            connected: state.connected,
            last_ping: state.last_ping,
            last_error: state.last_error.clone(),
            reconnecting: state.reconnecting,
            attempt_count: state.reconnect_attempts,
        }
    }

    /// Ping the database within the health-check timeout.
    ///
    /// Fails immediately when disconnected. A failed ping marks the
    /// connection as lost so the background loop picks it up.
    pub async fn health_check(&self) -> Result<(), ServerError> {
        let handle = self.shared.live_handle("health check")?;
        let timeout = self.shared.config.timeouts.health_check_timeout;

        let result = match tokio::time::timeout(timeout, handle.ping()).await {
            Ok(result) => result,
            Err(_) => Err(ServerError::timeout("health check", timeout)),
        };

        match result {
            Ok(()) => {
                self.shared.state.write().last_ping = Some(Utc::now());
                debug!("Health check passed");
                Ok(())
            }
            Err(e) => {
                let demoted = {
                    let mut state = self.shared.state.write();
                    let current = state
                        .handle
                        .as_ref()
                        .is_some_and(|installed| Arc::ptr_eq(installed, &handle));
                    if current {
                        state.connected = false;
                        state.last_error = Some(e.to_string());
                    }
                    current
                };
                if demoted {
                    error!(error = %e, "Health check failed; database connection lost");
                }
                Err(e)
            }
        }
    }

    /// Validate and run a statement with the configured query timeout.
    pub async fn query(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<ResultRow>, ServerError> {
        let deadline = self.shared.config.timeouts.query_timeout;
        self.query_with_timeout(sql, args, deadline).await
    }

    /// Validate and run a statement, giving up after `deadline`.
    ///
    /// Rejected statements never reach the database. Dropping the returned
    /// future cancels the driver call.
    pub async fn query_with_timeout(
        &self,
        sql: &str,
        args: &[SqlValue],
        deadline: Duration,
    ) -> Result<Vec<ResultRow>, ServerError> {
        let max_len = self.shared.security.max_query_length;
        if sql.len() > max_len {
            return Err(ServerError::invalid_input(format!(
                "Query length {} exceeds maximum of {} bytes",
                sql.len(),
                max_len
            )));
        }

        if let Err(e) = self.validate_sql(sql) {
            warn!(query = %truncate_for_log(sql), error = %e, "Query rejected by security policy");
            return Err(e.into());
        }

        let handle = self.shared.live_handle("query")?;

        info!(query = %truncate_for_log(sql), params = args.len(), "Executing query");
        let started = Instant::now();

        let result = match tokio::time::timeout(deadline, handle.fetch_all(sql, args)).await {
            Ok(result) => result,
            Err(_) => Err(ServerError::timeout("query", deadline)),
        };

        match result {
            Ok(rows) => {
                debug!(
                    rows = rows.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Query completed"
                );
                Ok(rows)
            }
            Err(e) => {
                error!(
                    operation = "query",
                    query = %truncate_for_log(sql),
                    error = %e,
                    "Query execution failed"
                );
                Err(e)
            }
        }
    }

    /// Tables and views of the configured database, sorted by name.
    pub async fn get_tables(&self) -> Result<Vec<String>, ServerError> {
        let rows = self.query(TABLES_QUERY, &[]).await?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("table_name").and_then(SqlValue::as_str))
            .map(str::to_string)
            .collect())
    }

    /// Column name, type, nullability, default and key flag for one table.
    ///
    /// Accepts `table` or `database.table`.
    pub async fn get_table_schema(&self, table: &str) -> Result<Vec<ResultRow>, ServerError> {
        let (database, name) = parse_qualified_name(table)?;
        let args = [SqlValue::from(database), SqlValue::from(name.as_str())];

        let rows = self.query(TABLE_SCHEMA_QUERY, &args).await?;
        if rows.is_empty() {
            return Err(ServerError::object_not_found("Table", table));
        }
        Ok(rows)
    }

    /// Stop the reconnection loop and release the handle.
    ///
    /// Calling it again is a no-op.
    pub async fn close(&self) -> Result<(), ServerError> {
        let handle = {
            let mut state = self.shared.state.write();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            state.connected = false;
            state.reconnecting = false;
            state.handle.take()
        };

        self.shared.stop_tx.send_replace(true);

        if let Some(handle) = handle {
            handle.close().await;
        }

        info!("Connection manager closed");
        Ok(())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shared.stop_tx.send_replace(true);
    }
}

impl Shared {
    /// Clone the installed handle if connected.
    fn live_handle(&self, operation: &str) -> Result<Arc<dyn DbHandle>, ServerError> {
        let state = self.state.read();
        match (&state.handle, state.connected) {
            (Some(handle), true) => Ok(Arc::clone(handle)),
            _ => Err(ServerError::not_connected(operation)),
        }
    }

    /// Open and ping a fresh handle, then install it.
    async fn connect(&self) -> Result<(), ServerError> {
        let timeout = self.config.timeouts.connect_timeout;
        let opened = match tokio::time::timeout(timeout, self.open_and_ping()).await {
            Ok(result) => result,
            Err(_) => Err(ServerError::timeout("connect", timeout)),
        };

        let handle = match opened {
            Ok(handle) => handle,
            Err(e) => {
                let mut state = self.state.write();
                if !state.closed {
                    state.connected = false;
                    state.last_error = Some(e.to_string());
                }
                return Err(e);
            }
        };

        let installed = {
            let mut state = self.state.write();
            if state.closed {
                Err(handle)
            } else {
                let stale = state.handle.replace(handle);
                state.connected = true;
                state.last_error = None;
                state.last_ping = Some(Utc::now());
                state.reconnect_attempts = 0;
                Ok(stale)
            }
        };

        match installed {
            Ok(stale) => {
                if let Some(stale) = stale {
                    stale.close().await;
                }
                Ok(())
            }
            Err(discarded) => {
                discarded.close().await;
                Err(ServerError::connection("connection manager is closed"))
            }
        }
    }

    async fn open_and_ping(&self) -> Result<Arc<dyn DbHandle>, ServerError> {
        let handle = self.connector.open(&self.config).await?;
        if let Err(e) = handle.ping().await {
            handle.close().await;
            return Err(e);
        }
        Ok(handle)
    }

    /// One reconnection attempt, if the connection is down.
    async fn reconnect_tick(&self) {
        let attempt = {
            let mut state = self.state.write();
            if state.closed || state.connected {
                return;
            }
            state.reconnect_attempts += 1;
            state.reconnecting = true;
            state.reconnect_attempts
        };

        info!(attempt, "Attempting to reconnect to database");
        match self.connect().await {
            Ok(()) => info!(attempt, "Database reconnection successful"),
            Err(e) => error!(attempt, error = %e, "Database reconnection failed"),
        }

        self.state.write().reconnecting = false;
    }
}

fn spawn_reconnect_loop(shared: &Arc<Shared>) {
    let weak: Weak<Shared> = Arc::downgrade(shared);
    let mut stop = shared.stop_tx.subscribe();
    let period = shared.config.timeouts.reconnect_interval;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.wait_for(|stopped| *stopped) => break,
                _ = ticker.tick() => {}
            }

            let Some(shared) = weak.upgrade() else {
                break;
            };
            shared.reconnect_tick().await;
        }

        debug!("Reconnection loop stopped");
    });
}
