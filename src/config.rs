//! Configuration management for the guarded SQL access layer.
//!
//! Configuration is loaded from environment variables following the 12-factor app pattern.
//! Loading never fails on missing connection fields; the connection manager
//! reports those when it is constructed.

use crate::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_HEALTH_CHECK_TIMEOUT,
    DEFAULT_HEALTH_CHECK_TIMEOUT_SECS, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_MAX_CONNECTIONS,
    DEFAULT_MAX_LIFETIME_SECS, DEFAULT_MAX_QUERY_LENGTH, DEFAULT_MIN_CONNECTIONS, DEFAULT_PORT,
    DEFAULT_QUERY_TIMEOUT, DEFAULT_QUERY_TIMEOUT_SECS, DEFAULT_RECONNECT_INTERVAL,
    DEFAULT_RECONNECT_INTERVAL_SECS,
};
use crate::error::ServerError;
use crate::security::SecurityPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Top-level configuration loaded from environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database connection configuration
    pub database: DatabaseConfig,

    /// Security configuration
    pub security: SecurityConfig,
}

/// Database connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// MySQL hostname or IP address
    pub host: String,

    /// MySQL port (default: 3306)
    pub port: u16,

    /// Login user
    pub username: String,

    /// Login password, never serialized or printed
    #[serde(skip_serializing, default)]
    pub password: String,

    /// Database (schema) to use
    pub database: String,

    /// TLS negotiation mode
    pub ssl_mode: SslMode,

    /// Connection pool configuration
    pub pool: PoolConfig,

    /// Timeouts and reconnection cadence
    pub timeouts: TimeoutsConfig,
}

/// TLS negotiation mode for the MySQL connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SslMode {
    Disable,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyIdentity,
}

impl FromStr for SslMode {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "disable" | "disabled" | "false" => Ok(SslMode::Disable),
            "prefer" | "preferred" => Ok(SslMode::Prefer),
            "require" | "required" | "true" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-identity" | "verify-full" => Ok(SslMode::VerifyIdentity),
            other => Err(ServerError::config(format!("unknown SSL mode: {}", other))),
        }
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of open connections
    pub max_connections: u32,

    /// Number of idle connections kept open
    pub min_connections: u32,

    /// Maximum lifetime of a single connection
    pub max_lifetime: Duration,

    /// Idle connection timeout
    pub idle_timeout: Duration,
}

/// Timeouts applied by the connection manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutsConfig {
    /// Bound on opening a handle and its first ping
    pub connect_timeout: Duration,

    /// Bound on a health-check ping
    pub health_check_timeout: Duration,

    /// Default deadline for a query
    pub query_timeout: Duration,

    /// Interval between background reconnection attempts
    pub reconnect_interval: Duration,
}

/// Security configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Start with every statement permitted
    pub unsafe_mode: bool,

    /// Maximum query length (bytes)
    pub max_query_length: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// ## Required (checked when the connection manager is built)
    /// - `MCP_DATABASE_HOST`, `MCP_DATABASE_USERNAME`, `MCP_DATABASE_PASSWORD`,
    ///   `MCP_DATABASE_DBNAME`
    ///
    /// ## Optional
    /// - `MCP_DATABASE_PORT`: Port number (default: 3306)
    /// - `MCP_DATABASE_SSLMODE`: disable, prefer, require, verify-ca, verify-identity
    /// - `MCP_DATABASE_POOL_MAX` / `MCP_DATABASE_POOL_MIN`: pool bounds (default: 25 / 5)
    /// - `MCP_DATABASE_CONN_MAX_LIFETIME_SECS` (default: 300)
    /// - `MCP_DATABASE_IDLE_TIMEOUT_SECS` (default: 600)
    /// - `MCP_DATABASE_CONNECT_TIMEOUT_SECS` (default: 10)
    /// - `MCP_DATABASE_HEALTH_TIMEOUT_SECS` (default: 5)
    /// - `MCP_DATABASE_QUERY_TIMEOUT_SECS` (default: 30)
    /// - `MCP_DATABASE_RECONNECT_INTERVAL_SECS` (default: 30)
    /// - `MCP_DATABASE_UNSAFE_MODE`: start with every statement permitted (default: false)
    /// - `MCP_SQL_MAX_QUERY_LENGTH`: maximum query length in bytes (default: 1000000)
    pub fn from_env() -> Result<Self, ServerError> {
        let ssl_mode = match std::env::var("MCP_DATABASE_SSLMODE") {
            Ok(mode) if !mode.trim().is_empty() => mode.parse()?,
            _ => SslMode::default(),
        };

        let database = DatabaseConfig {
            host: env_string("MCP_DATABASE_HOST"),
            port: env_parse("MCP_DATABASE_PORT").unwrap_or(DEFAULT_PORT),
            username: env_string("MCP_DATABASE_USERNAME"),
            password: env_string("MCP_DATABASE_PASSWORD"),
            database: env_string("MCP_DATABASE_DBNAME"),
            ssl_mode,
            pool: PoolConfig {
                max_connections: env_parse("MCP_DATABASE_POOL_MAX")
                    .unwrap_or(DEFAULT_MAX_CONNECTIONS),
                min_connections: env_parse("MCP_DATABASE_POOL_MIN")
                    .unwrap_or(DEFAULT_MIN_CONNECTIONS),
                max_lifetime: env_secs(
                    "MCP_DATABASE_CONN_MAX_LIFETIME_SECS",
                    DEFAULT_MAX_LIFETIME_SECS,
                ),
                idle_timeout: env_secs("MCP_DATABASE_IDLE_TIMEOUT_SECS", DEFAULT_IDLE_TIMEOUT_SECS),
            },
            timeouts: TimeoutsConfig {
                connect_timeout: env_secs(
                    "MCP_DATABASE_CONNECT_TIMEOUT_SECS",
                    DEFAULT_CONNECT_TIMEOUT_SECS,
                ),
                health_check_timeout: env_secs(
                    "MCP_DATABASE_HEALTH_TIMEOUT_SECS",
                    DEFAULT_HEALTH_CHECK_TIMEOUT_SECS,
                ),
                query_timeout: env_secs(
                    "MCP_DATABASE_QUERY_TIMEOUT_SECS",
                    DEFAULT_QUERY_TIMEOUT_SECS,
                ),
                reconnect_interval: env_secs(
                    "MCP_DATABASE_RECONNECT_INTERVAL_SECS",
                    DEFAULT_RECONNECT_INTERVAL_SECS,
                ),
            },
        };

        let security = SecurityConfig {
            unsafe_mode: std::env::var("MCP_DATABASE_UNSAFE_MODE")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),
            max_query_length: env_parse("MCP_SQL_MAX_QUERY_LENGTH")
                .unwrap_or(DEFAULT_MAX_QUERY_LENGTH),
        };

        if database.pool.min_connections > database.pool.max_connections {
            return Err(ServerError::config(format!(
                "MCP_DATABASE_POOL_MIN ({}) exceeds MCP_DATABASE_POOL_MAX ({})",
                database.pool.min_connections, database.pool.max_connections
            )));
        }

        Ok(Config { database, security })
    }
}

impl DatabaseConfig {
    /// Names of required connection fields that are empty (or a zero port).
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();

        if self.host.trim().is_empty() {
            missing.push("host");
        }
        if self.port == 0 {
            missing.push("port");
        }
        if self.username.trim().is_empty() {
            missing.push("username");
        }
        if self.password.is_empty() {
            missing.push("password");
        }
        if self.database.trim().is_empty() {
            missing.push("database");
        }

        missing
    }

    /// Fail with a configuration error naming every missing field.
    pub fn validate(&self) -> Result<(), ServerError> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ServerError::config(format!(
                "missing required database configuration fields: {}",
                missing.join(", ")
            )))
        }
    }

    /// `host:port/database`, safe for logs.
    pub fn display_target(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            username: String::new(),
            password: String::new(),
            database: String::new(),
            ssl_mode: SslMode::default(),
            pool: PoolConfig::default(),
            timeouts: TimeoutsConfig::default(),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("ssl_mode", &self.ssl_mode)
            .field("pool", &self.pool)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: DEFAULT_MIN_CONNECTIONS,
            max_lifetime: Duration::from_secs(DEFAULT_MAX_LIFETIME_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
        }
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            health_check_timeout: DEFAULT_HEALTH_CHECK_TIMEOUT,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
        }
    }
}

impl SecurityConfig {
    /// Policy the manager starts with.
    pub fn initial_policy(&self) -> SecurityPolicy {
        if self.unsafe_mode {
            SecurityPolicy::unrestricted()
        } else {
            SecurityPolicy::safe()
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            unsafe_mode: false,
            max_query_length: DEFAULT_MAX_QUERY_LENGTH,
        }
    }
}

fn env_string(key: &str) -> String {
    std::env::var(key).unwrap_or_default()
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_secs(key: &str, default: u64) -> Duration {
    Duration::from_secs(env_parse(key).unwrap_or(default))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> DatabaseConfig {
        DatabaseConfig {
            host: "localhost".to_string(),
            username: "app".to_string(),
            password: "s3cr3t-pw".to_string(),
            database: "shop".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_pool_config_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, 25);
        assert_eq!(config.min_connections, 5);
        assert_eq!(config.max_lifetime, Duration::from_secs(300));
    }

    #[test]
    fn test_timeout_defaults() {
        let config = TimeoutsConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.reconnect_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_complete_config_validates() {
        assert!(complete().validate().is_ok());
    }

    #[test]
    fn test_missing_fields_are_named() {
        let config = DatabaseConfig {
            port: 0,
            ..Default::default()
        };
        assert_eq!(
            config.missing_fields(),
            vec!["host", "port", "username", "password", "database"]
        );

        let mut config = complete();
        config.password.clear();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ServerError::Config(_)));
        assert!(err.to_string().contains("password"));
    }

    #[test]
    fn test_password_is_redacted() {
        let config = complete();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("s3cr3t-pw"));
        assert!(debug.contains("<redacted>"));

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("s3cr3t-pw"));
        assert_eq!(config.display_target(), "localhost:3306/shop");
    }

    #[test]
    fn test_ssl_mode_parsing() {
        assert_eq!("disable".parse::<SslMode>().unwrap(), SslMode::Disable);
        assert_eq!("PREFERRED".parse::<SslMode>().unwrap(), SslMode::Prefer);
        assert_eq!("verify_ca".parse::<SslMode>().unwrap(), SslMode::VerifyCa);
        assert!("sometimes".parse::<SslMode>().is_err());
    }

    #[test]
    fn test_initial_policy() {
        let mut security = SecurityConfig::default();
        assert!(!security.initial_policy().allows_unsafe_mode());
        security.unsafe_mode = true;
        assert!(security.initial_policy().allows_unsafe_mode());
    }
}
