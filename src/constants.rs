//! Centralized constants for the guarded SQL access layer.
//!
//! Default values for connection pooling, timeouts, and the security presets
//! live here so they are easy to find and change in one place.

use std::time::Duration;

// =============================================================================
// Connection Constants
// =============================================================================

/// Default MySQL port.
pub const DEFAULT_PORT: u16 = 3306;

/// Default bound on opening a handle and its first ping, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default bound on a health-check ping, in seconds.
pub const DEFAULT_HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;

/// Default query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Default interval between background reconnection attempts, in seconds.
pub const DEFAULT_RECONNECT_INTERVAL_SECS: u64 = 30;

/// Default connect timeout as Duration.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS);

/// Default health-check timeout as Duration.
pub const DEFAULT_HEALTH_CHECK_TIMEOUT: Duration =
    Duration::from_secs(DEFAULT_HEALTH_CHECK_TIMEOUT_SECS);

/// Default query timeout as Duration.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS);

/// Default reconnection interval as Duration.
pub const DEFAULT_RECONNECT_INTERVAL: Duration =
    Duration::from_secs(DEFAULT_RECONNECT_INTERVAL_SECS);

// =============================================================================
// Connection Pool Constants
// =============================================================================

/// Default maximum open connections in the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 25;

/// Default number of idle connections the pool keeps warm.
pub const DEFAULT_MIN_CONNECTIONS: u32 = 5;

/// Default maximum lifetime of a pooled connection, in seconds.
pub const DEFAULT_MAX_LIFETIME_SECS: u64 = 300;

/// Default idle timeout of a pooled connection, in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

// =============================================================================
// Security Constants
// =============================================================================

/// Verbs permitted by the safe preset.
pub const SAFE_ALLOWED_OPERATIONS: &[&str] = &["SELECT", "SHOW", "DESCRIBE", "EXPLAIN"];

/// Verbs rejected outright by the safe preset.
pub const SAFE_BLOCKED_OPERATIONS: &[&str] = &[
    "DELETE", "DROP", "UPDATE", "TRUNCATE", "INSERT", "ALTER", "CREATE", "GRANT", "REVOKE",
];

/// Marker reported as the allow-list while unsafe mode is active.
pub const ALL_OPERATIONS: &str = "ALL_OPERATIONS";

/// Default maximum query length (bytes).
pub const DEFAULT_MAX_QUERY_LENGTH: usize = 1_000_000;

// =============================================================================
// Logging Constants
// =============================================================================

/// Maximum number of characters of query text written to logs.
pub const LOG_QUERY_MAX_CHARS: usize = 200;
