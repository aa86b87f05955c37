//! Shared database schema, migrations, and query builders.
//!
//! Used by: the store (migrator, backfill, read path) and the server.

pub mod migrations;
pub mod ownership;
pub mod share_grants;
pub mod tables;
pub mod users;

// Re-export tables for convenience
pub use tables::*;
