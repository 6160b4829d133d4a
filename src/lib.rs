//! # guarded-sql
//!
//! Policy-gated, self-healing access to a MySQL database.
//!
//! This crate provides:
//! - **Validation**: a lexical SQL validator that enforces an allow-list and
//!   block-list of statement verbs and rejects known-dangerous patterns
//! - **Policies**: a read-only preset and an unrestricted preset that can be
//!   swapped at runtime
//! - **Connection management**: a pooled connection with health checks and a
//!   background task that reconnects on a fixed interval
//!
//! ## Architecture
//!
//! Every query flows through [`ConnectionManager::query`], which validates the
//! text against the active policy before any network I/O:
//! - rejected statements fail with [`ServerError::Validation`]
//! - accepted statements fail fast with a connection error while disconnected
//! - otherwise rows are materialized as [`ResultRow`]s

pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod security;

pub use config::Config;
pub use database::{ConnectionManager, ConnectionStatus, ResultRow, SqlValue};
pub use error::ServerError;
pub use security::{SecurityPolicy, SqlValidator, ValidationError};
