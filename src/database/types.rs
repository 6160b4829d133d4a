//! MySQL type mapping to Rust types.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row, TypeInfo};

/// A SQL value that can be bound as a parameter or serialized to JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Decimal(Decimal),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    DateTimeUtc(DateTime<Utc>),
    Json(serde_json::Value),
}

impl SqlValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Borrow the value as a string slice, if it holds text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to a display string.
    pub fn to_display_string(&self) -> String {
        match self {
            SqlValue::Null => "NULL".to_string(),
            SqlValue::Bool(v) => v.to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::U64(v) => v.to_string(),
            SqlValue::F32(v) => v.to_string(),
            SqlValue::F64(v) => v.to_string(),
            SqlValue::String(v) => v.clone(),
            SqlValue::Bytes(v) => format!("0x{}", hex::encode(v)),
            SqlValue::Decimal(v) => v.to_string(),
            SqlValue::Date(v) => v.to_string(),
            SqlValue::Time(v) => v.to_string(),
            SqlValue::DateTime(v) => v.to_string(),
            SqlValue::DateTimeUtc(v) => v.to_rfc3339(),
            SqlValue::Json(v) => v.to_string(),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::String(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::String(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::I64(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Type mapper for converting MySQL columns to [`SqlValue`]s.
pub struct TypeMapper;

impl TypeMapper {
    /// Extract a value from a MySQL row column.
    ///
    /// The declared column type picks the first decoder to try; anything the
    /// driver refuses falls through the remaining decoders in order of likelihood.
    pub fn extract_column(row: &MySqlRow, idx: usize) -> SqlValue {
        let Some(col) = row.columns().get(idx) else {
            return SqlValue::Null;
        };

        let type_name = col.type_info().name().to_uppercase();
        if type_name == "NULL" {
            return SqlValue::Null;
        }

        if let Some(value) = Self::extract_by_type(row, idx, &type_name) {
            return value;
        }

        // Strings (most common)
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(SqlValue::String).unwrap_or(SqlValue::Null);
        }

        // Integers
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(SqlValue::I64).unwrap_or(SqlValue::Null);
        }
        if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
            return v.map(SqlValue::U64).unwrap_or(SqlValue::Null);
        }

        // Floating point
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return v.map(SqlValue::F64).unwrap_or(SqlValue::Null);
        }

        // Binary
        if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return v.map(SqlValue::Bytes).unwrap_or(SqlValue::Null);
        }

        // Fall back to NULL for unsupported types
        SqlValue::Null
    }

    fn extract_by_type(row: &MySqlRow, idx: usize, type_name: &str) -> Option<SqlValue> {
        fn get<'r, T>(row: &'r MySqlRow, idx: usize, wrap: fn(T) -> SqlValue) -> Option<SqlValue>
        where
            T: sqlx::Decode<'r, sqlx::MySql> + sqlx::Type<sqlx::MySql>,
        {
            row.try_get::<Option<T>, _>(idx)
                .ok()
                .map(|v| v.map(wrap).unwrap_or(SqlValue::Null))
        }

        match type_name {
            "BOOLEAN" => get(row, idx, SqlValue::Bool),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
                get(row, idx, SqlValue::I64)
            }
            "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
            | "BIGINT UNSIGNED" | "YEAR" | "BIT" => get(row, idx, SqlValue::U64),
            "FLOAT" => get(row, idx, SqlValue::F32),
            "DOUBLE" => get(row, idx, SqlValue::F64),
            "DECIMAL" => get(row, idx, SqlValue::Decimal),
            "DATE" => get(row, idx, SqlValue::Date),
            "TIME" => get(row, idx, SqlValue::Time),
            "DATETIME" => get(row, idx, SqlValue::DateTime),
            "TIMESTAMP" => get(row, idx, SqlValue::DateTimeUtc),
            "JSON" => get(row, idx, SqlValue::Json),
            "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM"
            | "SET" => get(row, idx, SqlValue::String),
            "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
                get(row, idx, SqlValue::Bytes)
            }
            _ => None,
        }
    }
}

/// Hex encoding helper (minimal implementation to avoid extra dependency).
mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02X}", b)).collect()
    }
}
