//! Canonical schema definitions.
//!
//! `MIGRATIONS` is the first-run schema registry, replayed by name through the
//! `_migrations` ledger. The ownership migrator in `gantt-store` brings older
//! single-tenant stores forward before this registry runs.

/// A named migration: `(name, sql)`.
pub type Migration = (&'static str, &'static str);

pub const MIGRATIONS: &[Migration] = &[(
    "0001_schema",
    include_str!("../../migrations/0001_schema.sql"),
)];

/// Identity table. Its absence means the store has never been initialized.
pub const IDENTITY_TABLE: &str = "users";

/// Ownership column added to every owned table.
pub const OWNER_COLUMN: &str = "owner_id";

/// Tables that gain the owner column through a plain `ADD COLUMN`, in order.
pub const ALTERABLE_OWNED_TABLES: &[&str] = &["categories", "projects", "tasks"];

/// Expansion-state table. Its target shape is keyed on `(owner_id, project_id)`,
/// which SQLite can only reach by rebuilding the table.
pub const EXPANSION_TABLE: &str = "project_expansion";

/// Shadow table used while `EXPANSION_TABLE` is rebuilt in place.
pub const EXPANSION_SHADOW_TABLE: &str = "project_expansion_new";

/// Every table whose rows carry an owner, in backfill order.
pub const OWNED_TABLES: &[&str] = &["categories", "projects", "tasks", "project_expansion"];

/// DDL for the shadow table with the target expansion-state shape.
pub const EXPANSION_SHADOW_DDL: &str = "CREATE TABLE project_expansion_new (
    owner_id    INTEGER REFERENCES users(id),
    project_id  INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    expanded    INTEGER NOT NULL DEFAULT 1,
    PRIMARY KEY (owner_id, project_id)
)";
