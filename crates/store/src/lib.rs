//! SQLite store for the Gantt tracker.
//!
//! The [`Store`] handle is opened by the caller and passed explicitly to the
//! ownership migrator ([`migrate::migrate`]), the backfill
//! ([`backfill::backfill`]) and the read path. Dropping it closes the
//! connection.

pub mod backfill;
mod error;
pub mod migrate;
pub mod reads;
pub mod schema;

use rusqlite::{Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use gantt_api::db::migrations::MIGRATIONS;
use gantt_api::db::{share_grants, users};
use gantt_api::UserId;

pub use backfill::{BackfillOutcome, BackfillReport, backfill};
pub use error::{Result, StoreError};
pub use migrate::{MigrationReport, ShadowRepair, TableFailure, migrate};
pub use schema::SchemaState;

pub type Built = (String, sea_query::Values);

/// How long a writer waits for another connection's write lock by default.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// SQLite-backed store.
/// Thread-safe: wraps the connection in a Mutex so it can be shared via `Arc<Store>`.
pub struct Store {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl Store {
    /// Open (or create) the store at `path` with the default busy timeout.
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open (or create) the store at `path`.
    ///
    /// `busy_timeout` bounds how long a migration waits while another process
    /// holds the write lock.
    pub fn open_with_timeout(path: &Path, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::configure(conn, busy_timeout, Some(path.to_path_buf()))
    }

    /// Private in-memory store, for tests and tooling.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(conn, DEFAULT_BUSY_TIMEOUT, None)
    }

    fn configure(conn: Connection, busy_timeout: Duration, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(busy_timeout)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("store mutex poisoned")
    }

    /// Snapshot the live schema.
    pub fn schema_state(&self) -> Result<SchemaState> {
        Ok(SchemaState::capture(&self.conn())?)
    }

    /// First-run schema creation: apply every entry of the migration registry
    /// not yet recorded in `_migrations`. Returns the names applied.
    ///
    /// Run the ownership migrator first on stores that predate ownership, so
    /// that the owner columns the registry indexes already exist.
    pub fn ensure_schema(&self) -> Result<Vec<&'static str>> {
        let mut conn = self.conn();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _migrations (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )?;

        let mut applied = Vec::new();
        for &(name, sql) in MIGRATIONS {
            let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
            let already_applied: bool = tx.query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )?;
            if already_applied {
                continue;
            }
            tx.execute_batch(sql)
                .map_err(|source| StoreError::Migration { name, source })?;
            tx.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])?;
            tx.commit()?;
            tracing::info!("Applied migration: {name}");
            applied.push(name);
        }
        Ok(applied)
    }

    // ── Users and grants ────────────────────────────────────────────────

    /// Insert a user and return its id.
    pub fn create_user(
        &self,
        username: &str,
        api_key: Option<&str>,
        is_admin: bool,
    ) -> Result<UserId> {
        let conn = self.conn();
        sq_execute(&conn, users::insert(username, api_key, is_admin))?;
        Ok(conn.last_insert_rowid())
    }

    /// Insert a share grant and return its id.
    pub fn create_share_grant(&self, params: &share_grants::InsertParams<'_>) -> Result<i64> {
        let conn = self.conn();
        sq_execute(&conn, share_grants::insert(params))?;
        Ok(conn.last_insert_rowid())
    }

    /// Revoke a grant. Returns false if it was unknown or already revoked.
    pub fn revoke_share_grant(
        &self,
        grant_id: i64,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<bool> {
        let stamp = at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let changed = sq_execute(&self.conn(), share_grants::revoke(grant_id, &stamp))?;
        Ok(changed > 0)
    }
}

// ── sea-query bridge ───────────────────────────────────────────────────────

fn sq_value(value: &sea_query::Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    use sea_query::Value as Sq;

    match value {
        Sq::Bool(Some(b)) => Sql::Integer(i64::from(*b)),
        Sq::TinyInt(Some(i)) => Sql::Integer(i64::from(*i)),
        Sq::SmallInt(Some(i)) => Sql::Integer(i64::from(*i)),
        Sq::Int(Some(i)) => Sql::Integer(i64::from(*i)),
        Sq::BigInt(Some(i)) => Sql::Integer(*i),
        Sq::TinyUnsigned(Some(i)) => Sql::Integer(i64::from(*i)),
        Sq::SmallUnsigned(Some(i)) => Sql::Integer(i64::from(*i)),
        Sq::Unsigned(Some(i)) => Sql::Integer(i64::from(*i)),
        Sq::BigUnsigned(Some(i)) => Sql::Integer(i64::try_from(*i).unwrap_or(i64::MAX)),
        Sq::Float(Some(f)) => Sql::Real(f64::from(*f)),
        Sq::Double(Some(f)) => Sql::Real(*f),
        Sq::String(Some(s)) => Sql::Text(s.as_str().to_owned()),
        Sq::Char(Some(c)) => Sql::Text(c.to_string()),
        Sq::Bytes(Some(b)) => Sql::Blob(b.as_slice().to_vec()),
        _ => Sql::Null,
    }
}

fn sq_params(values: &sea_query::Values) -> impl rusqlite::Params {
    rusqlite::params_from_iter(values.0.iter().map(sq_value).collect::<Vec<_>>())
}

/// Execute a built statement, returning the number of changed rows.
pub fn sq_execute(conn: &Connection, (sql, values): Built) -> rusqlite::Result<usize> {
    conn.execute(&sql, sq_params(&values))
}

/// Run a built SELECT and map every row.
pub fn sq_query_map<T>(
    conn: &Connection,
    (sql, values): Built,
    f: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Vec<T>> {
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(sq_params(&values), f)?;
    rows.collect()
}

/// Run a built SELECT expected to return at most one row.
pub fn sq_query_row<T>(
    conn: &Connection,
    (sql, values): Built,
    f: impl FnOnce(&Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Option<T>> {
    conn.query_row(&sql, sq_params(&values), f).optional()
}
