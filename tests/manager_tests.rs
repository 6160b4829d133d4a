//! Connection manager tests against an in-memory driver.
//!
//! The in-memory connector can be switched between reachable and unreachable
//! and counts every call that reaches a handle, so tests can assert that
//! rejected statements never touch the database. Time is paused, so the
//! reconnection interval elapses instantly.

use async_trait::async_trait;
use guarded_sql::config::{Config, DatabaseConfig};
use guarded_sql::database::{Connector, DbHandle};
use guarded_sql::{
    ConnectionManager, ResultRow, SecurityPolicy, ServerError, SqlValue, ValidationError,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

const RECONNECT_INTERVAL: Duration = Duration::from_secs(30);
const PASSWORD: &str = "hunter2-do-not-print";

/// Counters shared between the connector, its handles and the test.
#[derive(Default)]
struct Recorder {
    reachable: AtomicBool,
    hanging: AtomicBool,
    opens: AtomicUsize,
    pings: AtomicUsize,
    fetches: AtomicUsize,
    closes: AtomicUsize,
}

impl Recorder {
    fn new(reachable: bool) -> Arc<Self> {
        let recorder = Self::default();
        recorder.reachable.store(reachable, Ordering::SeqCst);
        Arc::new(recorder)
    }

    fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make pings and fetches wait forever.
    fn set_hanging(&self, hanging: bool) {
        self.hanging.store(hanging, Ordering::SeqCst);
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

struct MemoryConnector {
    recorder: Arc<Recorder>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, _config: &DatabaseConfig) -> Result<Arc<dyn DbHandle>, ServerError> {
        self.recorder.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemoryHandle {
            recorder: Arc::clone(&self.recorder),
        }))
    }
}

struct MemoryHandle {
    recorder: Arc<Recorder>,
}

impl MemoryHandle {
    async fn stall_if_hanging(&self) {
        if self.recorder.hanging.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }

    fn check_reachable(&self) -> Result<(), ServerError> {
        if self.recorder.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ServerError::connection("Connection refused"))
        }
    }
}

#[async_trait]
impl DbHandle for MemoryHandle {
    async fn ping(&self) -> Result<(), ServerError> {
        self.recorder.pings.fetch_add(1, Ordering::SeqCst);
        self.stall_if_hanging().await;
        self.check_reachable()
    }

    async fn fetch_all(&self, sql: &str, args: &[SqlValue]) -> Result<Vec<ResultRow>, ServerError> {
        self.recorder.fetches.fetch_add(1, Ordering::SeqCst);
        self.stall_if_hanging().await;
        self.check_reachable()?;

        let upper = sql.trim_start().to_uppercase();
        if upper.starts_with("SHOW TABLES") {
            return Ok(vec![
                ResultRow::from_pairs([("Tables_in_shop", "logs")]),
                ResultRow::from_pairs([("Tables_in_shop", "users")]),
            ]);
        }
        if upper.contains("INFORMATION_SCHEMA.TABLES") {
            let mut rows = vec![
                ResultRow::from_pairs([("TABLE_NAME", "active_users"), ("TABLE_TYPE", "VIEW")]),
                ResultRow::from_pairs([("TABLE_NAME", "logs"), ("TABLE_TYPE", "BASE TABLE")]),
                ResultRow::from_pairs([("TABLE_NAME", "users"), ("TABLE_TYPE", "BASE TABLE")]),
            ];
            if upper.contains("TABLE_TYPE = 'BASE TABLE'") {
                rows.retain(|row| row.get("TABLE_TYPE") == Some(&SqlValue::from("BASE TABLE")));
            }
            return Ok(rows);
        }
        if upper.contains("INFORMATION_SCHEMA.COLUMNS") {
            if args.get(1) == Some(&SqlValue::from("users")) {
                return Ok(vec![ResultRow::from_pairs([
                    ("column_name", SqlValue::from("id")),
                    ("column_type", SqlValue::from("int")),
                    ("is_nullable", SqlValue::from("NO")),
                    ("column_default", SqlValue::Null),
                    ("column_key", SqlValue::from("PRI")),
                ])]);
            }
            return Ok(Vec::new());
        }
        Ok(Vec::new())
    }

    async fn close(&self) {
        self.recorder.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.database = DatabaseConfig {
        host: "db.internal".to_string(),
        username: "app".to_string(),
        password: PASSWORD.to_string(),
        database: "shop".to_string(),
        ..Default::default()
    };
    config.database.timeouts.reconnect_interval = RECONNECT_INTERVAL;
    config
}

async fn manager_with(recorder: &Arc<Recorder>) -> ConnectionManager {
    manager_with_config(recorder, test_config()).await
}

async fn manager_with_config(recorder: &Arc<Recorder>, config: Config) -> ConnectionManager {
    let connector = Arc::new(MemoryConnector {
        recorder: Arc::clone(recorder),
    });
    ConnectionManager::with_connector(config, connector)
        .await
        .expect("valid configuration")
}

// =============================================================================
// Construction
// =============================================================================

mod construction_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_connects_on_construction() {
        let recorder = Recorder::new(true);
        let manager = manager_with(&recorder).await;

        assert!(manager.is_connected());
        let status = manager.status();
        assert!(status.connected);
        assert!(status.last_error.is_none());
        assert!(status.last_ping.is_some());
        assert_eq!(status.attempt_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_store_still_returns_manager() {
        let recorder = Recorder::new(false);
        let manager = manager_with(&recorder).await;

        assert!(!manager.is_connected());
        let status = manager.status();
        assert!(status.last_error.is_some());
        assert_eq!(recorder.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_fields_fail_without_network() {
        let recorder = Recorder::new(true);
        let mut config = test_config();
        config.database.host.clear();
        config.database.database.clear();

        let connector = Arc::new(MemoryConnector {
            recorder: Arc::clone(&recorder),
        });
        let err = match ConnectionManager::with_connector(config, connector).await {
            Ok(_) => panic!("configuration without host must be rejected"),
            Err(e) => e,
        };

        assert!(matches!(err, ServerError::Config(_)));
        let message = err.to_string();
        assert!(message.contains("host"));
        assert!(message.contains("database"));
        assert!(!message.contains(PASSWORD));
        assert_eq!(recorder.opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_initial_policy_follows_config() {
        let recorder = Recorder::new(true);
        let mut config = test_config();
        config.security.unsafe_mode = true;
        let manager = manager_with_config(&recorder, config).await;

        assert!(manager.is_unsafe_mode_enabled());
        assert_eq!(manager.allowed_operations(), vec!["ALL_OPERATIONS"]);
    }
}

// =============================================================================
// Query gate
// =============================================================================

mod query_tests {
    use super::*;

    #[tokio::test]
    async fn test_show_tables_returns_rows() {
        let recorder = Recorder::new(true);
        let manager = manager_with(&recorder).await;

        let rows = manager.query("SHOW TABLES", &[]).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[1].get("Tables_in_shop"),
            Some(&SqlValue::from("users"))
        );
        assert_eq!(recorder.fetches(), 1);
    }

    #[tokio::test]
    async fn test_blocked_statement_never_reaches_handle() {
        let recorder = Recorder::new(true);
        let manager = manager_with(&recorder).await;

        for sql in [
            "DELETE FROM users WHERE id = 1",
            "DROP TABLE users",
            "SELECT * FROM users; DROP TABLE users;",
            "SELECT LOAD_FILE('/etc/passwd')",
            "SELECT BENCHMARK(1000000, SHA1('x'))",
            "CALL refresh_stats()",
            "",
        ] {
            let err = manager.query(sql, &[]).await.unwrap_err();
            assert!(err.is_validation(), "{sql:?} should be rejected: {err}");
        }

        assert_eq!(recorder.fetches(), 0);
    }

    #[tokio::test]
    async fn test_truncate_blocked_then_allowed_in_unsafe_mode() {
        let recorder = Recorder::new(true);
        let manager = manager_with(&recorder).await;

        let err = manager.query("TRUNCATE TABLE logs", &[]).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("TRUNCATE"));
        assert!(message.contains("blocked"));
        assert_eq!(recorder.fetches(), 0);

        manager.enable_unsafe_mode();
        let rows = manager.query("TRUNCATE TABLE logs", &[]).await.unwrap();
        assert!(rows.is_empty());
        assert_eq!(recorder.fetches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_runs_before_connection_check() {
        let recorder = Recorder::new(false);
        let manager = manager_with(&recorder).await;

        let err = manager.query("DROP TABLE users", &[]).await.unwrap_err();
        assert!(matches!(
            err,
            ServerError::Validation(ValidationError::BlockedOperation { .. })
        ));

        let err = manager.query("SELECT 1", &[]).await.unwrap_err();
        assert!(matches!(err, ServerError::Connection { .. }));
        assert!(err.to_string().contains("not connected"));
        assert_ne!(
            err.user_message(),
            ServerError::from(ValidationError::EmptyQuery).user_message()
        );
        assert_eq!(recorder.fetches(), 0);
    }

    #[tokio::test]
    async fn test_oversized_query_rejected() {
        let recorder = Recorder::new(true);
        let mut config = test_config();
        config.security.max_query_length = 32;
        let manager = manager_with_config(&recorder, config).await;

        let sql = format!("SELECT '{}'", "x".repeat(64));
        let err = manager.query(&sql, &[]).await.unwrap_err();
        assert!(matches!(err, ServerError::InvalidInput(_)));
        assert_eq!(recorder.fetches(), 0);
    }

    #[tokio::test]
    async fn test_get_tables() {
        let recorder = Recorder::new(true);
        let manager = manager_with(&recorder).await;

        let tables = manager.get_tables().await.unwrap();
        assert_eq!(tables, vec!["active_users", "logs", "users"]);
    }

    #[tokio::test]
    async fn test_get_table_schema() {
        let recorder = Recorder::new(true);
        let manager = manager_with(&recorder).await;

        let columns = manager.get_table_schema("users").await.unwrap();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].get("column_key"), Some(&SqlValue::from("PRI")));

        let err = manager.get_table_schema("missing").await.unwrap_err();
        assert!(matches!(err, ServerError::ObjectNotFound { .. }));

        let err = manager.get_table_schema("users; --").await.unwrap_err();
        assert!(matches!(err, ServerError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_concurrent_queries() {
        let recorder = Recorder::new(true);
        let manager = Arc::new(manager_with(&recorder).await);

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    if i % 4 == 0 {
                        manager.query("DELETE FROM logs", &[]).await.is_err()
                    } else {
                        manager.query("SHOW TABLES", &[]).await.is_ok()
                    }
                })
            })
            .collect();

        for task in tasks {
            assert!(task.await.unwrap());
        }
        assert_eq!(recorder.fetches(), 12);
    }
}

// =============================================================================
// Mode switching
// =============================================================================

mod mode_tests {
    use super::*;

    #[tokio::test]
    async fn test_mode_toggling() {
        let recorder = Recorder::new(true);
        let manager = manager_with(&recorder).await;
        let delete = "DELETE FROM users WHERE id=1";

        assert!(!manager.is_unsafe_mode_enabled());
        assert!(manager.validate_sql(delete).is_err());

        manager.enable_unsafe_mode();
        assert!(manager.is_unsafe_mode_enabled());
        assert!(manager.validate_sql(delete).is_ok());
        assert_eq!(manager.allowed_operations(), vec!["ALL_OPERATIONS"]);
        assert!(manager.blocked_operations().is_empty());

        manager.disable_unsafe_mode();
        assert!(!manager.is_unsafe_mode_enabled());
        assert!(manager.validate_sql(delete).is_err());
        assert_eq!(
            manager.allowed_operations(),
            vec!["SELECT", "SHOW", "DESCRIBE", "EXPLAIN"]
        );
        assert!(manager.blocked_operations().contains(&"DELETE".to_string()));
    }

    #[tokio::test]
    async fn test_validation_is_idempotent() {
        let recorder = Recorder::new(true);
        let manager = manager_with(&recorder).await;

        for _ in 0..3 {
            assert!(manager.validate_sql("SELECT * FROM users").is_ok());
            assert_eq!(
                manager.validate_sql("UPDATE users SET name = 'x'"),
                Err(ValidationError::BlockedOperation {
                    operation: "UPDATE".to_string(),
                    allowed: "SELECT, SHOW, DESCRIBE, EXPLAIN".to_string(),
                })
            );
        }
    }

    #[tokio::test]
    async fn test_custom_policy() {
        let recorder = Recorder::new(true);
        let manager = manager_with(&recorder).await;

        let policy = SecurityPolicy::custom(["SELECT", "INSERT"], ["DROP"]).unwrap();
        manager.set_policy(policy.clone());

        assert_eq!(manager.policy(), policy);
        assert!(manager.is_operation_allowed("insert"));
        assert!(!manager.is_operation_allowed("SHOW"));
        assert!(manager
            .query("INSERT INTO logs (msg) VALUES (?)", &[SqlValue::from("hi")])
            .await
            .is_ok());
        assert!(manager.query("SHOW TABLES", &[]).await.is_err());
    }
}

// =============================================================================
// Connection lifecycle
// =============================================================================

mod lifecycle_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_within_one_interval() {
        let recorder = Recorder::new(false);
        let manager = manager_with(&recorder).await;
        assert!(!manager.is_connected());

        recorder.set_reachable(true);
        tokio::time::sleep(RECONNECT_INTERVAL + Duration::from_secs(1)).await;

        assert!(manager.is_connected());
        let status = manager.status();
        assert_eq!(status.attempt_count, 0);
        assert!(status.last_error.is_none());
        assert!(!status.reconnecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_attempts_are_counted() {
        let recorder = Recorder::new(false);
        let manager = manager_with(&recorder).await;

        tokio::time::sleep(RECONNECT_INTERVAL * 3 + Duration::from_secs(1)).await;

        assert!(!manager.is_connected());
        assert_eq!(manager.status().attempt_count, 3);
        assert_eq!(recorder.opens.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_check_degradation_and_recovery() {
        let recorder = Recorder::new(true);
        let manager = manager_with(&recorder).await;

        assert_ok!(manager.health_check().await);

        recorder.set_reachable(false);
        let err = assert_err!(manager.health_check().await);
        assert!(err.is_transient());
        assert!(!manager.is_connected());

        // Disconnected managers fail fast without touching the handle.
        let pings = recorder.pings.load(Ordering::SeqCst);
        assert!(manager.health_check().await.is_err());
        assert_eq!(recorder.pings.load(Ordering::SeqCst), pings);

        recorder.set_reachable(true);
        tokio::time::sleep(RECONNECT_INTERVAL + Duration::from_secs(1)).await;

        assert!(manager.is_connected());
        assert_ok!(manager.health_check().await);
        // The replaced handle was released.
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent_and_stops_reconnecting() {
        let recorder = Recorder::new(false);
        let manager = manager_with(&recorder).await;

        assert_ok!(manager.close().await);
        assert_ok!(manager.close().await);
        assert!(!manager.is_connected());

        recorder.set_reachable(true);
        tokio::time::sleep(RECONNECT_INTERVAL * 2).await;

        assert!(!manager.is_connected());
        assert_eq!(recorder.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_releases_handle() {
        let recorder = Recorder::new(true);
        let manager = manager_with(&recorder).await;

        manager.close().await.unwrap();
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);

        let err = manager.query("SELECT 1", &[]).await.unwrap_err();
        assert!(matches!(err, ServerError::Connection { .. }));
    }
}

// =============================================================================
// Timeouts
// =============================================================================

mod timeout_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_connect_gives_up_after_connect_timeout() {
        let recorder = Recorder::new(true);
        recorder.set_hanging(true);

        let started = tokio::time::Instant::now();
        let manager = manager_with(&recorder).await;

        assert!(!manager.is_connected());
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(started.elapsed() < RECONNECT_INTERVAL);
        let last_error = manager.status().last_error.unwrap_or_default();
        assert!(last_error.contains("connect timed out after 10000 ms"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_health_check_times_out_and_demotes() {
        let recorder = Recorder::new(true);
        let manager = manager_with(&recorder).await;
        assert!(manager.is_connected());

        recorder.set_hanging(true);
        let err = assert_err!(manager.health_check().await);

        match err {
            ServerError::Timeout {
                operation,
                timeout_ms,
            } => {
                assert_eq!(operation, "health check");
                assert_eq!(timeout_ms, 5_000);
            }
            other => panic!("expected a timeout, got {other}"),
        }
        assert!(!manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_deadline() {
        let recorder = Recorder::new(true);
        let manager = manager_with(&recorder).await;

        recorder.set_hanging(true);
        let err = assert_err!(
            manager
                .query_with_timeout("SELECT * FROM users", &[], Duration::from_secs(1))
                .await
        );

        assert!(matches!(
            err,
            ServerError::Timeout {
                ref operation,
                timeout_ms: 1_000,
            } if operation == "query"
        ));
        assert!(err.is_transient());
        // A slow query does not mark the connection as lost.
        assert!(manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_uses_configured_timeout() {
        let recorder = Recorder::new(true);
        let mut config = test_config();
        config.database.timeouts.query_timeout = Duration::from_secs(3);
        let manager = manager_with_config(&recorder, config).await;

        recorder.set_hanging(true);
        let err = assert_err!(manager.query("SHOW TABLES", &[]).await);
        assert!(matches!(err, ServerError::Timeout { timeout_ms: 3_000, .. }));
    }
}
