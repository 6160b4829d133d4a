//! Result rows and query text helpers.

use crate::constants::LOG_QUERY_MAX_CHARS;
use crate::database::types::{SqlValue, TypeMapper};
use serde::{Deserialize, Serialize};
use sqlx::mysql::MySqlRow;
use sqlx::{Column, Row};
use std::collections::HashMap;

/// A single row of query results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Column values indexed by column name.
    #[serde(flatten)]
    pub columns: HashMap<String, SqlValue>,
}

impl ResultRow {
    /// Create a new result row.
    pub fn new() -> Self {
        Self {
            columns: HashMap::new(),
        }
    }

    /// Build a row from `(column, value)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SqlValue>,
    {
        Self {
            columns: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Materialize a driver row.
    pub fn from_mysql_row(row: &MySqlRow) -> Self {
        let mut result = Self::new();
        for (idx, col) in row.columns().iter().enumerate() {
            result.insert(col.name().to_string(), TypeMapper::extract_column(row, idx));
        }
        result
    }

    /// Get a value by column name.
    ///
    /// MySQL may report information_schema columns in upper case, so an
    /// exact miss falls back to a case-insensitive lookup.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns.get(column).or_else(|| {
            self.columns
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(column))
                .map(|(_, value)| value)
        })
    }

    /// Insert a value.
    pub fn insert(&mut self, column: String, value: SqlValue) {
        self.columns.insert(column, value);
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Default for ResultRow {
    fn default() -> Self {
        Self::new()
    }
}

/// Shorten query text for log output, on a character boundary.
pub fn truncate_for_log(query: &str) -> String {
    match query.char_indices().nth(LOG_QUERY_MAX_CHARS) {
        Some((cut, _)) => format!("{}...", &query[..cut]),
        None => query.to_string(),
    }
}
