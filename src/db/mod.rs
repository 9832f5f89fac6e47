//! Database error handling shared by the route catalog and account
//! stores. Connection pools themselves are built directly with
//! `sqlx::sqlite::SqlitePoolOptions` at the call sites that need one
//! (`bin/server.rs`, integration tests) rather than behind a wrapper.

pub mod error;

pub use error::{DatabaseError, DbResult};
