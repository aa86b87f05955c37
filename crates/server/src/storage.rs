use anyhow::{Context, Result};
use std::sync::Arc;

use gantt_runtime_config::StoreSettings;
use gantt_store::{BackfillOutcome, Store};

/// Shared store handle.
#[derive(Clone)]
pub struct Db {
    store: Arc<Store>,
}

impl Db {
    pub fn new(store: Store) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }
}

/// Open the store and bring it forward before any request is served.
pub fn init_db(settings: &StoreSettings) -> Result<Db> {
    let store = Store::open_with_timeout(&settings.path, settings.busy_timeout())
        .with_context(|| format!("opening store at {}", settings.path.display()))?;
    run_admin_phase(&store)?;
    Ok(Db::new(store))
}

/// Ownership migration, first-run schema, then the owner backfill.
///
/// Per-table failures are logged and left for `gantt-migrate` to report; the
/// server still starts.
pub fn run_admin_phase(store: &Store) -> Result<()> {
    let report = gantt_store::migrate(store).context("running ownership migration")?;
    if report.changed_schema() {
        tracing::info!(
            altered = report.altered.len(),
            shadow = %report.shadow,
            rebuilt = report.rebuilt,
            "ownership migration applied"
        );
    }
    for failure in &report.failures {
        tracing::warn!("migration step failed for {}: {}", failure.table, failure.message);
    }

    let applied = store.ensure_schema().context("creating schema")?;
    for name in applied {
        tracing::info!("schema migration applied: {name}");
    }

    let backfill = gantt_store::backfill(store).context("backfilling owners")?;
    match backfill.outcome {
        BackfillOutcome::Assigned { owner } if backfill.total_updated() > 0 => {
            tracing::info!("assigned {} ownerless rows to user {owner}", backfill.total_updated());
        }
        BackfillOutcome::NoAdmin if !backfill.ownerless.is_empty() => {
            tracing::warn!("no admin user exists; ownerless rows stay hidden until one does");
        }
        _ => {}
    }
    for failure in &backfill.failures {
        tracing::warn!("backfill failed for {}: {}", failure.table, failure.message);
    }
    Ok(())
}
