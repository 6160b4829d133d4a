//! Error types for the guarded SQL access layer.
//!
//! This module defines semantic error types with MySQL error number mapping
//! for user-friendly error messages.

use crate::security::ValidationError;
use thiserror::Error;

/// Domain-specific errors raised by the access layer.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection error
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Authentication error
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Database not found
    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    /// Object not found (table, column, ...)
    #[error("{object_type} not found: {name}")]
    ObjectNotFound { object_type: String, name: String },

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Query rejected by the security policy
    #[error("SQL security validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Query execution error
    #[error("{operation} failed: {message}")]
    QueryExecution {
        operation: String,
        message: String,
        sql_error_code: Option<u16>,
    },

    /// Operation exceeded its deadline
    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a connection error with a source.
    pub fn connection_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Connection error raised when an operation needs a live handle.
    pub fn not_connected(operation: &str) -> Self {
        Self::connection(format!("database not connected ({})", operation))
    }

    /// Create an authentication error.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create an object not found error.
    pub fn object_not_found(object_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ObjectNotFound {
            object_type: object_type.into(),
            name: name.into(),
        }
    }

    /// Create a permission denied error.
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Create a query execution error.
    pub fn query_error(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::QueryExecution {
            operation: operation.into(),
            message: msg.into(),
            sql_error_code: None,
        }
    }

    /// Create a query execution error carrying the MySQL error number.
    pub fn query_error_with_code(
        operation: impl Into<String>,
        msg: impl Into<String>,
        code: u16,
    ) -> Self {
        Self::QueryExecution {
            operation: operation.into(),
            message: msg.into(),
            sql_error_code: Some(code),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Check if this error is transient and may succeed on retry.
    ///
    /// Validation failures are never transient: the same text yields the same verdict.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection { .. } => true,
            Self::Timeout { .. } => true,
            Self::QueryExecution {
                sql_error_code: Some(code),
                ..
            } => is_transient_sql_error(*code),
            _ => false,
        }
    }

    /// Check if this error came from the security policy.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Get a user-friendly suggestion for how to fix this error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Config(_) => Some("Check your environment variables and configuration"),
            Self::Connection { .. } => Some(
                "Check the database configuration and that the server is available; \
                 the connection is retried automatically in the background",
            ),
            Self::Authentication(_) => Some("Verify your username and password are correct"),
            Self::DatabaseNotFound(_) => Some("Check the database name and ensure it exists"),
            Self::ObjectNotFound { .. } => Some("Check the object name"),
            Self::PermissionDenied(_) => {
                Some("Request appropriate permissions from your database administrator")
            }
            Self::Validation(_) => Some(
                "Only read-only statements are permitted by the current security policy",
            ),
            Self::Timeout { .. } => Some("Try a simpler query or increase the timeout limit"),
            Self::InvalidInput(_) => Some("Review the request parameters"),
            _ => None,
        }
    }

    /// Error text followed by its suggestion, for surfacing to end users.
    pub fn user_message(&self) -> String {
        match self.suggestion() {
            Some(hint) => format!("{}. {}", self, hint),
            None => self.to_string(),
        }
    }
}

/// Map MySQL server error numbers to semantic ServerError types.
pub fn from_sql_error(operation: &str, code: u16, message: &str) -> ServerError {
    match code {
        // Authentication errors
        1045 => ServerError::auth(message),

        // Database errors
        1049 => ServerError::DatabaseNotFound(message.to_string()),

        // Object not found errors
        1146 => ServerError::object_not_found("Table", message),
        1054 => ServerError::object_not_found("Column", message),

        // Permission errors
        1044 | 1142 | 1143 | 1227 => ServerError::permission_denied(message),

        // Connection errors
        2002 | 2003 | 2006 | 2013 => {
            ServerError::connection(format!("Server connection lost: {}", message))
        }

        // Syntax errors
        1064 => ServerError::query_error_with_code(
            operation,
            format!("Syntax error: {}", message),
            code,
        ),

        // Lock wait timeout / deadlock
        1205 | 1213 => ServerError::query_error_with_code(
            operation,
            format!("Transaction was rolled back: {}", message),
            code,
        ),

        // Default: generic query error
        _ => ServerError::query_error_with_code(operation, message, code),
    }
}

/// Check if a MySQL error number indicates a transient error.
fn is_transient_sql_error(code: u16) -> bool {
    matches!(
        code,
        1040    // Too many connections
        | 1205  // Lock wait timeout
        | 1213  // Deadlock
        | 2002  // Can't connect through socket
        | 2003  // Can't connect to server
        | 2006  // Server has gone away
        | 2013 // Lost connection during query
    )
}

/// Convert a driver error into a ServerError, tagged with the operation that failed.
pub fn from_sqlx_error(operation: &str, e: sqlx::Error) -> ServerError {
    use sqlx::Error;

    match e {
        Error::Database(db) => {
            let number = db
                .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                .map(|mysql| mysql.number());
            match number {
                Some(code) => from_sql_error(operation, code, db.message()),
                None => ServerError::query_error(operation, db.message()),
            }
        }
        Error::Io(io) => ServerError::connection_with_source(io_error_message(io.kind()), io),
        Error::Tls(tls) => ServerError::connection(format!("TLS error: {}", tls)),
        Error::Protocol(msg) => ServerError::connection(format!("Protocol error: {}", msg)),
        Error::PoolTimedOut => ServerError::connection("Timed out acquiring a pooled connection"),
        Error::PoolClosed => ServerError::connection("Connection pool is closed"),
        Error::WorkerCrashed => ServerError::connection("Connection worker crashed"),
        Error::Configuration(msg) => ServerError::config(msg.to_string()),
        Error::ColumnDecode { index, source } => ServerError::query_error(
            operation,
            format!("Failed to decode column {}: {}", index, source),
        ),
        other => ServerError::query_error(operation, other.to_string()),
    }
}

fn io_error_message(kind: std::io::ErrorKind) -> String {
    use std::io::ErrorKind;
    match kind {
        ErrorKind::ConnectionRefused => "Connection refused".to_string(),
        ErrorKind::ConnectionReset => "Connection reset".to_string(),
        ErrorKind::ConnectionAborted => "Connection aborted".to_string(),
        ErrorKind::NotConnected => "Not connected".to_string(),
        ErrorKind::TimedOut => "Connection timed out".to_string(),
        _ => format!("IO error: {:?}", kind),
    }
}
