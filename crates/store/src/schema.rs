//! Live schema introspection.

use rusqlite::Connection;
use std::collections::{BTreeMap, BTreeSet};

/// Immutable snapshot of the tables in a store and their columns.
///
/// The migrator captures one snapshot after taking the write lock and branches
/// on it for the whole run, instead of re-querying the schema between steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaState {
    tables: BTreeMap<String, BTreeSet<String>>,
}

impl SchemaState {
    /// Introspect every ordinary table (SQLite internals excluded).
    pub fn capture(conn: &Connection) -> rusqlite::Result<Self> {
        let names: Vec<String> = {
            let mut stmt = conn.prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' \
                 ORDER BY name",
            )?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        let mut columns_stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
        let mut tables = BTreeMap::new();
        for name in names {
            let columns = columns_stmt
                .query_map([&name], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<BTreeSet<_>>>()?;
            tables.insert(name, columns);
        }
        Ok(Self { tables })
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.tables
            .get(table)
            .is_some_and(|columns| columns.contains(column))
    }

    pub fn columns(&self, table: &str) -> Option<&BTreeSet<String>> {
        self.tables.get(table)
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_lists_tables_and_columns() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, is_admin INTEGER);
             CREATE TABLE tasks (id INTEGER PRIMARY KEY, name TEXT);
             CREATE VIEW task_names AS SELECT name FROM tasks;",
        )
        .unwrap();

        let state = SchemaState::capture(&conn).unwrap();
        assert_eq!(state.tables().collect::<Vec<_>>(), vec!["tasks", "users"]);
        assert!(state.has_column("tasks", "name"));
        assert!(!state.has_column("tasks", "owner_id"));
        assert!(!state.has_column("projects", "id"));
        assert!(!state.has_table("task_names"));
    }

    #[test]
    fn snapshot_does_not_follow_later_changes() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE tasks (id INTEGER PRIMARY KEY);")
            .unwrap();
        let before = SchemaState::capture(&conn).unwrap();
        conn.execute_batch("ALTER TABLE tasks ADD COLUMN owner_id INTEGER;")
            .unwrap();
        assert!(!before.has_column("tasks", "owner_id"));
        assert!(SchemaState::capture(&conn).unwrap().has_column("tasks", "owner_id"));
    }

    #[test]
    fn empty_store_has_no_tables() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(SchemaState::capture(&conn).unwrap(), SchemaState::default());
    }
}
