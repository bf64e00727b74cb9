//! Persistence layer: libSQL-backed storage for users, businesses, tokens
//! and the message log.

pub mod libsql_backend;
pub mod migrations;
pub mod models;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;
