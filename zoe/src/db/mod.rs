//! Database layer for data persistence and access.
//!
//! SQLx over SQLite, organised as repositories:
//!
//! ```text
//! handlers (api)  ->  db::handlers (repositories)  ->  db::models  ->  SQLite
//! ```
//!
//! - [`handlers`]: repository implementations for CRUD operations
//! - [`models`]: database record structures matching table schemas
//! - [`errors`]: database-specific error types
//!
//! Schema migrations live in `migrations/` and are applied by [`crate::migrator`].

pub mod errors;
pub mod handlers;
pub mod models;
