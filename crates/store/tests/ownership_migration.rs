use std::path::PathBuf;
use std::thread;

use tempfile::TempDir;

use chrono::Utc;
use gantt_api::db::share_grants::InsertParams;
use gantt_api::share::Caller;
use gantt_api::{ProjectRow, ReadQuery, Resource, TaskRow};
use gantt_store::{BackfillOutcome, ShadowRepair, Store, backfill, migrate};

/// A store as it looked before ownership existed.
const LEGACY_SCHEMA: &str = "
    CREATE TABLE users (
        id INTEGER PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        api_key TEXT UNIQUE,
        is_admin INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE categories (id INTEGER PRIMARY KEY, name TEXT NOT NULL, position INTEGER NOT NULL DEFAULT 0);
    CREATE TABLE projects (
        id INTEGER PRIMARY KEY,
        category_id INTEGER,
        name TEXT NOT NULL,
        start_date TEXT,
        due_date TEXT,
        priority INTEGER NOT NULL DEFAULT 0,
        position INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE tasks (
        id INTEGER PRIMARY KEY,
        project_id INTEGER,
        name TEXT NOT NULL,
        start_date TEXT,
        due_date TEXT,
        priority INTEGER NOT NULL DEFAULT 0,
        position INTEGER NOT NULL DEFAULT 0,
        completed INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE project_expansion (project_id INTEGER PRIMARY KEY, expanded INTEGER NOT NULL DEFAULT 1);
";

const LEGACY_DATA: &str = "
    INSERT INTO users (id, username, api_key, is_admin) VALUES
        (1, 'viewer', 'key-viewer', 0),
        (2, 'root', 'key-root', 1),
        (3, 'second-admin', 'key-second', 1);
    INSERT INTO categories (id, name) VALUES (1, 'Work'), (2, 'Home');
    INSERT INTO projects (id, category_id, name) VALUES (10, 1, 'Launch'), (20, 2, 'Garden');
    INSERT INTO tasks (id, project_id, name, completed) VALUES
        (100, 10, 'Draft', 0), (101, 10, 'Ship', 1), (200, 20, 'Seeds', 0);
    INSERT INTO project_expansion (project_id, expanded) VALUES (10, 0), (20, 1);
";

fn legacy_path() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("legacy.db");
    let store = Store::open_path(&path).unwrap();
    store.conn().execute_batch(LEGACY_SCHEMA).unwrap();
    store.conn().execute_batch(LEGACY_DATA).unwrap();
    (dir, path)
}

fn legacy_store() -> (TempDir, Store) {
    let (dir, path) = legacy_path();
    (dir, Store::open_path(&path).unwrap())
}

fn expansion_rows(store: &Store) -> Vec<(i64, i64)> {
    let conn = store.conn();
    let mut stmt = conn
        .prepare("SELECT project_id, expanded FROM project_expansion ORDER BY project_id")
        .unwrap();
    stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .unwrap()
        .collect::<rusqlite::Result<_>>()
        .unwrap()
}

fn count(store: &Store, sql: &str) -> i64 {
    store.conn().query_row(sql, [], |row| row.get(0)).unwrap()
}

fn bring_forward(store: &Store) {
    assert!(migrate(store).unwrap().is_success());
    store.ensure_schema().unwrap();
    assert!(backfill(store).unwrap().is_success());
}

#[test]
fn legacy_store_gains_owner_columns() {
    let (_dir, store) = legacy_store();
    let report = migrate(&store).unwrap();
    assert!(report.is_success());
    assert_eq!(report.altered, vec!["categories", "projects", "tasks"]);
    assert!(report.rebuilt);

    let state = store.schema_state().unwrap();
    for table in ["categories", "projects", "tasks", "project_expansion"] {
        assert!(state.has_column(table, "owner_id"), "{table}");
    }
    assert_eq!(count(&store, "SELECT COUNT(*) FROM project_expansion"), 2);
    assert_eq!(count(&store, "SELECT COUNT(*) FROM tasks"), 3);
}

#[test]
fn second_run_changes_nothing() {
    let (_dir, store) = legacy_store();
    assert!(migrate(&store).unwrap().changed_schema());
    let before = store.schema_state().unwrap();

    let again = migrate(&store).unwrap();
    assert!(again.is_success());
    assert!(!again.changed_schema());
    assert_eq!(store.schema_state().unwrap(), before);
}

#[test]
fn ensure_schema_after_migrate_adds_only_missing_tables() {
    let (_dir, store) = legacy_store();
    migrate(&store).unwrap();
    assert_eq!(store.ensure_schema().unwrap(), vec!["0001_schema"]);
    let state = store.schema_state().unwrap();
    assert!(state.has_table("share_grants"));
    assert_eq!(count(&store, "SELECT COUNT(*) FROM projects"), 2);
}

#[test]
fn interrupted_swap_is_completed() {
    let (_dir, store) = legacy_store();
    store
        .conn()
        .execute_batch(
            "CREATE TABLE project_expansion_new (
                 owner_id INTEGER REFERENCES users(id),
                 project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                 expanded INTEGER NOT NULL DEFAULT 1,
                 PRIMARY KEY (owner_id, project_id)
             );
             INSERT INTO project_expansion_new (owner_id, project_id, expanded) VALUES (NULL, 10, 0);",
        )
        .unwrap();

    let report = migrate(&store).unwrap();
    assert!(report.is_success());
    assert_eq!(report.shadow, ShadowRepair::SwapCompleted);
    assert!(!report.rebuilt);

    let state = store.schema_state().unwrap();
    assert!(!state.has_table("project_expansion_new"));
    assert!(state.has_column("project_expansion", "owner_id"));
    // The shadow's rows win over the stale target.
    assert_eq!(count(&store, "SELECT COUNT(*) FROM project_expansion"), 1);
}

#[test]
fn orphan_shadow_is_dropped() {
    let (_dir, store) = legacy_store();
    migrate(&store).unwrap();
    let before = expansion_rows(&store);
    assert_eq!(before, vec![(10, 0), (20, 1)]);
    store
        .conn()
        .execute_batch(
            "CREATE TABLE project_expansion_new (owner_id INTEGER, project_id INTEGER,
                                                  expanded INTEGER);
             INSERT INTO project_expansion_new VALUES (NULL, 10, 1), (NULL, 30, 0);",
        )
        .unwrap();

    let report = migrate(&store).unwrap();
    assert_eq!(report.shadow, ShadowRepair::OrphanDropped);
    assert!(!store.schema_state().unwrap().has_table("project_expansion_new"));
    assert_eq!(expansion_rows(&store), before);
}

#[test]
fn backfill_assigns_every_row_to_lowest_admin() {
    let (_dir, store) = legacy_store();
    migrate(&store).unwrap();
    store.ensure_schema().unwrap();

    let report = backfill(&store).unwrap();
    assert_eq!(report.outcome, BackfillOutcome::Assigned { owner: 2 });
    assert_eq!(report.total_updated(), 2 + 2 + 3 + 2);
    assert!(report.ownerless.is_empty());
    for table in ["categories", "projects", "tasks", "project_expansion"] {
        let ownerless = count(
            &store,
            &format!("SELECT COUNT(*) FROM {table} WHERE owner_id IS NULL"),
        );
        assert_eq!(ownerless, 0, "{table}");
        let foreign = count(&store, &format!("SELECT COUNT(*) FROM {table} WHERE owner_id != 2"));
        assert_eq!(foreign, 0, "{table}");
    }

    let again = backfill(&store).unwrap();
    assert_eq!(again.total_updated(), 0);
}

#[test]
fn backfill_without_admin_is_a_no_op() {
    let (_dir, store) = legacy_store();
    store
        .conn()
        .execute_batch("UPDATE users SET is_admin = 0;")
        .unwrap();
    migrate(&store).unwrap();

    let report = backfill(&store).unwrap();
    assert_eq!(report.outcome, BackfillOutcome::NoAdmin);
    assert_eq!(report.total_updated(), 0);
    assert_eq!(report.ownerless.get("tasks"), Some(&3));
    assert_eq!(count(&store, "SELECT COUNT(*) FROM tasks WHERE owner_id IS NULL"), 3);
}

#[test]
fn token_reads_only_see_the_granted_project() {
    let (_dir, store) = legacy_store();
    bring_forward(&store);
    store
        .create_share_grant(&InsertParams {
            project_id: 20,
            owner_id: 2,
            collaborator: None,
            token: Some("garden"),
            expires_at: None,
        })
        .unwrap();

    let query = ReadQuery {
        share_token: Some("garden".into()),
        ..ReadQuery::default()
    };
    let spec = store
        .resolve_read(&Caller::Anonymous, Resource::Projects, &query, Utc::now())
        .unwrap();
    let projects: Vec<i64> = store
        .read::<ProjectRow>(&spec)
        .unwrap()
        .iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(projects, vec![20]);

    let spec = store
        .resolve_read(&Caller::Anonymous, Resource::Tasks, &query, Utc::now())
        .unwrap();
    let tasks: Vec<i64> = store.read::<TaskRow>(&spec).unwrap().iter().map(|t| t.id).collect();
    assert_eq!(tasks, vec![200]);

    // The viewer owns nothing after the backfill.
    let viewer = store.resolve_caller(Some("key-viewer")).unwrap().unwrap();
    let spec = store
        .resolve_read(&viewer, Resource::Projects, &ReadQuery::default(), Utc::now())
        .unwrap();
    assert!(store.read::<ProjectRow>(&spec).unwrap().is_empty());
}

#[test]
fn concurrent_migrations_serialize() {
    let (_dir, path) = legacy_path();
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let path = path.clone();
            thread::spawn(move || {
                let store = Store::open_path(&path).unwrap();
                migrate(&store).unwrap()
            })
        })
        .collect();
    let reports: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(reports.iter().all(|r| r.is_success()));
    assert_eq!(reports.iter().filter(|r| r.changed_schema()).count(), 1);

    let store = Store::open_path(&path).unwrap();
    assert_eq!(count(&store, "SELECT COUNT(*) FROM project_expansion"), 2);
    assert!(store.schema_state().unwrap().has_column("tasks", "owner_id"));
}
