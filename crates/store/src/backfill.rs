//! Default-owner backfill for rows left ownerless by the migration.

use std::collections::BTreeMap;

use rusqlite::TransactionBehavior;
use tracing::{info, warn};

use gantt_api::UserId;
use gantt_api::db::migrations::{EXPANSION_TABLE, IDENTITY_TABLE, OWNED_TABLES, OWNER_COLUMN};
use gantt_api::db::{ownership, users};

use crate::migrate::{TableFailure, isolated};
use crate::schema::SchemaState;
use crate::{Result, Store, sq_execute, sq_query_row};

/// How the default owner was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackfillOutcome {
    /// The identity table is missing; nothing was attempted.
    SchemaAbsent,
    /// No admin exists, so there is no safe default owner. Rows were left as is.
    NoAdmin,
    /// Ownerless rows were assigned to this admin.
    Assigned { owner: UserId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillReport {
    pub outcome: BackfillOutcome,
    /// Rows given an owner, per table.
    pub updated: BTreeMap<String, usize>,
    /// Rows still without an owner after this run, per table.
    pub ownerless: BTreeMap<String, i64>,
    /// Owned tables that are missing or still lack the owner column.
    pub skipped: Vec<String>,
    pub failures: Vec<TableFailure>,
}

impl BackfillReport {
    fn new(outcome: BackfillOutcome) -> Self {
        Self {
            outcome,
            updated: BTreeMap::new(),
            ownerless: BTreeMap::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total_updated(&self) -> usize {
        self.updated.values().sum()
    }
}

/// Assign every ownerless row to the default owner: the admin with the lowest id.
///
/// Runs after [`crate::migrate`]. Tables that fail are rolled back on their
/// own and reported; the others still commit.
pub fn backfill(store: &Store) -> Result<BackfillReport> {
    let mut conn = store.conn();
    let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let state = SchemaState::capture(&tx)?;

    if !state.has_table(IDENTITY_TABLE) {
        info!("No {IDENTITY_TABLE} table; nothing to backfill");
        return Ok(BackfillReport::new(BackfillOutcome::SchemaAbsent));
    }

    let owner: Option<UserId> = sq_query_row(&tx, users::default_owner(), |row| row.get(0))?;
    let mut report = BackfillReport::new(match owner {
        Some(owner) => BackfillOutcome::Assigned { owner },
        None => BackfillOutcome::NoAdmin,
    });

    for &table in OWNED_TABLES {
        if !state.has_column(table, OWNER_COLUMN) {
            report.skipped.push(table.to_string());
            continue;
        }

        if let Some(owner) = owner {
            let updated = isolated(&mut tx, table, &mut report.failures, |conn| {
                if table == EXPANSION_TABLE {
                    sq_execute(conn, ownership::drop_shadowed_expansion(owner))?;
                    sq_execute(conn, ownership::drop_duplicate_ownerless_expansion())?;
                }
                sq_execute(conn, ownership::assign_owner(table, owner))
            })?;
            if let Some(updated) = updated {
                info!("Assigned {updated} {table} rows to user {owner}");
                report.updated.insert(table.to_string(), updated);
            }
        }

        match sq_query_row(&tx, ownership::count_ownerless(table), |row| row.get::<_, i64>(0)) {
            Ok(Some(remaining)) if remaining > 0 => {
                report.ownerless.insert(table.to_string(), remaining);
            }
            Ok(_) => {}
            Err(e) => warn!(table, error = %e, "Could not count ownerless rows"),
        }
    }

    if owner.is_none() && !report.ownerless.is_empty() {
        warn!(
            "No admin user; {} ownerless rows left unassigned",
            report.ownerless.values().sum::<i64>()
        );
    }

    tx.commit()?;
    Ok(report)
}
