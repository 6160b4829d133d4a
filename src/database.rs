//! Database connectivity and gated query execution.

mod connection;
pub mod driver;
mod manager;
mod mode;
mod query;
pub mod types;

pub use connection::{connect_options, create_pool, ConnectionPool, MySqlConnector, MySqlHandle};
pub use driver::{Connector, DbHandle};
pub use manager::{ConnectionManager, ConnectionStatus};
pub use query::{truncate_for_log, ResultRow};
pub use types::{SqlValue, TypeMapper};
