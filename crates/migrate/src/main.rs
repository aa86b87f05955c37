use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use gantt_runtime_config::{CONFIG_FILE_NAME, ENV_DB_PATH};
use gantt_store::{BackfillOutcome, BackfillReport, MigrationReport, Store};

#[derive(Parser, Debug)]
#[command(
    name = "gantt-migrate",
    about = "Bring a Gantt tracker store forward to the owned schema and backfill owners"
)]
struct Cli {
    /// Store to migrate
    #[arg(long, env = ENV_DB_PATH)]
    db: Option<PathBuf>,

    /// Configuration file (store path and busy timeout)
    #[arg(long, default_value = CONFIG_FILE_NAME)]
    config: PathBuf,

    /// Create the first-run schema when the store has none
    #[arg(long)]
    init: bool,

    /// Exit with status 2 when any table step failed
    #[arg(long)]
    strict: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Clean,
    TableFailures,
}

impl Outcome {
    fn exit_status(self, strict: bool) -> u8 {
        match (self, strict) {
            (Self::TableFailures, true) => 2,
            _ => 0,
        }
    }
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gantt_migrate=info,gantt_store=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let strict = cli.strict;
    match run(cli) {
        Ok(outcome) => Ok(ExitCode::from(outcome.exit_status(strict))),
        Err(e) => {
            tracing::error!("{e:#}");
            Err(e)
        }
    }
}

fn run(cli: Cli) -> Result<Outcome> {
    let mut config = gantt_runtime_config::load(&cli.config)?;
    if let Some(db) = cli.db {
        config.store.path = db;
    }
    let path = &config.store.path;
    tracing::info!("store: {}", path.display());

    let store = Store::open_with_timeout(path, config.store.busy_timeout())
        .with_context(|| format!("opening store at {}", path.display()))?;

    let migration = gantt_store::migrate(&store).context("running ownership migration")?;
    print_migration(&migration);

    if cli.init {
        let applied = store.ensure_schema().context("creating first-run schema")?;
        if applied.is_empty() {
            println!("schema: up to date");
        }
        for name in applied {
            println!("schema: applied {name}");
        }
    } else if migration.schema_absent {
        println!("store is empty; rerun with --init to create the schema");
        return Ok(Outcome::Clean);
    }

    let backfill = gantt_store::backfill(&store).context("backfilling owners")?;
    print_backfill(&backfill);

    if migration.is_success() && backfill.is_success() {
        Ok(Outcome::Clean)
    } else {
        Ok(Outcome::TableFailures)
    }
}

fn print_migration(report: &MigrationReport) {
    if report.schema_absent {
        println!("migrate: no users table, nothing to migrate");
        return;
    }
    if !report.changed_schema() {
        println!("migrate: already up to date");
    }
    for table in &report.altered {
        println!("migrate: added owner_id to {table}");
    }
    if report.shadow != gantt_store::ShadowRepair::NotPresent {
        println!("migrate: shadow table {}", report.shadow);
    }
    if report.rebuilt {
        println!("migrate: rebuilt project_expansion");
    }
    for failure in &report.failures {
        println!("migrate: FAILED {}: {}", failure.table, failure.message);
    }
}

fn print_backfill(report: &BackfillReport) {
    match report.outcome {
        BackfillOutcome::SchemaAbsent => println!("backfill: no users table, skipped"),
        BackfillOutcome::NoAdmin => println!("backfill: no admin user, rows left unassigned"),
        BackfillOutcome::Assigned { owner } => {
            println!("backfill: default owner is user {owner}");
            for (table, updated) in &report.updated {
                println!("backfill: {table}: {updated} rows assigned");
            }
        }
    }
    for (table, remaining) in &report.ownerless {
        println!("backfill: {table}: {remaining} rows without owner");
    }
    for failure in &report.failures {
        println!("backfill: FAILED {}: {}", failure.table, failure.message);
    }
}
