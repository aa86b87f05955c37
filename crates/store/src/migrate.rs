//! Ownership schema migration.
//!
//! Brings a single-tenant store forward to the owned shape: every owned table
//! gains a nullable `owner_id`, and the expansion-state table is rebuilt around
//! an `(owner_id, project_id)` key. Safe to run any number of times. The run
//! holds the SQLite write lock (`BEGIN IMMEDIATE`) from the schema snapshot to
//! the commit, so two processes migrating the same file serialize, and the
//! second one finds nothing left to do.

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{debug, info, warn};

use gantt_api::db::migrations::{
    ALTERABLE_OWNED_TABLES, EXPANSION_SHADOW_DDL, EXPANSION_SHADOW_TABLE, EXPANSION_TABLE,
    IDENTITY_TABLE, OWNER_COLUMN,
};

use crate::schema::SchemaState;
use crate::{Result, Store};

/// What the shadow-table check found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadowRepair {
    /// No shadow table.
    #[default]
    NotPresent,
    /// The shadow held the rebuilt data but was never swapped in; it now
    /// replaces the stale target.
    SwapCompleted,
    /// The target already had the owner column; the leftover shadow was dropped.
    OrphanDropped,
}

impl ShadowRepair {
    pub fn as_str(&self) -> &str {
        match self {
            Self::NotPresent => "not_present",
            Self::SwapCompleted => "swap_completed",
            Self::OrphanDropped => "orphan_dropped",
        }
    }
}

impl std::fmt::Display for ShadowRepair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One table whose step failed and was rolled back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFailure {
    pub table: String,
    pub message: String,
}

/// Operator-facing summary of one migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// The identity table is missing; nothing was attempted.
    pub schema_absent: bool,
    /// Tables that gained the owner column, in processing order.
    pub altered: Vec<String>,
    pub shadow: ShadowRepair,
    /// The expansion-state table was rebuilt in place this run.
    pub rebuilt: bool,
    pub failures: Vec<TableFailure>,
}

impl MigrationReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Whether this run changed the schema at all.
    pub fn changed_schema(&self) -> bool {
        !self.altered.is_empty() || self.shadow != ShadowRepair::NotPresent || self.rebuilt
    }
}

/// Run the ownership migration against `store`.
///
/// Per-table failures are rolled back, logged and listed in the report;
/// only failing to take the lock, introspect, or commit is an error.
pub fn migrate(store: &Store) -> Result<MigrationReport> {
    let mut conn = store.conn();
    let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let state = SchemaState::capture(&tx)?;
    let report = migrate_snapshot(&mut tx, &state)?;
    tx.commit()?;
    Ok(report)
}

fn migrate_snapshot(tx: &mut Transaction<'_>, state: &SchemaState) -> Result<MigrationReport> {
    let mut report = MigrationReport::default();

    if !state.has_table(IDENTITY_TABLE) {
        info!("No {IDENTITY_TABLE} table; awaiting first-run schema creation");
        report.schema_absent = true;
        return Ok(report);
    }

    for &table in ALTERABLE_OWNED_TABLES {
        if !state.has_table(table) {
            debug!("Skipping {table}: table does not exist yet");
            continue;
        }
        if state.has_column(table, OWNER_COLUMN) {
            continue;
        }
        if isolated(tx, table, &mut report.failures, |conn| {
            add_owner_column(conn, table)
        })?
        .is_some()
        {
            info!("Added {OWNER_COLUMN} to {table}");
            report.altered.push(table.to_string());
        }
    }

    let shadow_exists = state.has_table(EXPANSION_SHADOW_TABLE);
    let mut target_exists = state.has_table(EXPANSION_TABLE);
    let mut target_has_owner = state.has_column(EXPANSION_TABLE, OWNER_COLUMN);
    let mut target_has_expanded = state.has_column(EXPANSION_TABLE, "expanded");

    if shadow_exists {
        if target_has_owner {
            if isolated(tx, EXPANSION_SHADOW_TABLE, &mut report.failures, drop_orphan_shadow)?
                .is_some()
            {
                info!("Dropped orphan shadow table {EXPANSION_SHADOW_TABLE}");
                report.shadow = ShadowRepair::OrphanDropped;
            }
        } else if isolated(tx, EXPANSION_TABLE, &mut report.failures, |conn| {
            complete_swap(conn, target_exists)
        })?
        .is_some()
        {
            info!("Completed interrupted swap of {EXPANSION_SHADOW_TABLE} into {EXPANSION_TABLE}");
            report.shadow = ShadowRepair::SwapCompleted;
            target_exists = true;
            // The renamed shadow is the target now.
            target_has_owner = state.has_column(EXPANSION_SHADOW_TABLE, OWNER_COLUMN);
            target_has_expanded = state.has_column(EXPANSION_SHADOW_TABLE, "expanded");
        }
    }

    // A shadow that could not be resolved blocks the rebuild, which needs its name.
    let shadow_cleared = !shadow_exists || report.shadow != ShadowRepair::NotPresent;
    if target_exists && !target_has_owner && shadow_cleared {
        if !state.has_table("projects") {
            warn!("Cannot rebuild {EXPANSION_TABLE}: projects table is missing");
            report.failures.push(TableFailure {
                table: EXPANSION_TABLE.to_string(),
                message: "projects table is missing".to_string(),
            });
        } else if isolated(tx, EXPANSION_TABLE, &mut report.failures, |conn| {
            rebuild_expansion(conn, target_has_expanded)
        })?
        .is_some()
        {
            info!("Rebuilt {EXPANSION_TABLE} with {OWNER_COLUMN}");
            report.rebuilt = true;
        }
    }

    Ok(report)
}

/// Run `step` inside a savepoint. On failure the savepoint is rolled back, the
/// failure is logged and recorded, and `Ok(None)` lets the caller continue.
pub(crate) fn isolated<T>(
    tx: &mut Transaction<'_>,
    table: &str,
    failures: &mut Vec<TableFailure>,
    step: impl FnOnce(&Connection) -> rusqlite::Result<T>,
) -> Result<Option<T>> {
    let sp = tx.savepoint()?;
    let conn: &Connection = &sp;
    match step(conn) {
        Ok(value) => {
            sp.commit()?;
            Ok(Some(value))
        }
        Err(e) => {
            warn!(table, error = %e, "Schema step failed; continuing with remaining tables");
            failures.push(TableFailure {
                table: table.to_string(),
                message: e.to_string(),
            });
            Ok(None)
        }
    }
}

fn add_owner_column(conn: &Connection, table: &str) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        "ALTER TABLE \"{table}\" ADD COLUMN {OWNER_COLUMN} INTEGER REFERENCES users(id)"
    ))
}

fn drop_orphan_shadow(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(&format!("DROP TABLE \"{EXPANSION_SHADOW_TABLE}\""))
}

fn complete_swap(conn: &Connection, target_exists: bool) -> rusqlite::Result<()> {
    if target_exists {
        conn.execute_batch(&format!("DROP TABLE \"{EXPANSION_TABLE}\""))?;
    }
    conn.execute_batch(&format!(
        "ALTER TABLE \"{EXPANSION_SHADOW_TABLE}\" RENAME TO \"{EXPANSION_TABLE}\""
    ))
}

/// Copy the legacy expansion rows into a fresh shadow table with the owned
/// shape, then swap it in. Rows for projects that no longer exist are dropped.
fn rebuild_expansion(conn: &Connection, has_expanded: bool) -> rusqlite::Result<()> {
    let expanded = if has_expanded {
        "expanded"
    } else {
        "1"
    };
    conn.execute_batch(EXPANSION_SHADOW_DDL)?;
    let copied = conn.execute(
        &format!(
            "INSERT OR IGNORE INTO \"{EXPANSION_SHADOW_TABLE}\" (owner_id, project_id, expanded) \
             SELECT NULL, project_id, {expanded} FROM \"{EXPANSION_TABLE}\" \
             WHERE project_id IN (SELECT id FROM projects)"
        ),
        [],
    )?;
    debug!("Copied {copied} rows into {EXPANSION_SHADOW_TABLE}");
    complete_swap(conn, true)
}
