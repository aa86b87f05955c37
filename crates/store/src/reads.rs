//! Share-scoped reads.

use chrono::{DateTime, Utc};
use rusqlite::Row;

use gantt_api::db::{share_grants, users};
use gantt_api::share::{AuthenticatedUser, Caller, QuerySpec, ShareGrant, ShareQueryResolver};
use gantt_api::{CategoryRow, ProjectRow, ReadQuery, Resource, TaskRow};

use crate::{Result, Store, StoreError, sq_query_map, sq_query_row};

/// A row type returned by [`Store::read`].
///
/// `from_row` reads columns in the order [`QuerySpec::select`] renders them.
pub trait ReadRow: Sized {
    const RESOURCE: Resource;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

impl ReadRow for CategoryRow {
    const RESOURCE: Resource = Resource::Categories;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            position: row.get(2)?,
            owner_id: row.get(3)?,
        })
    }
}

impl ReadRow for ProjectRow {
    const RESOURCE: Resource = Resource::Projects;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            category_id: row.get(1)?,
            name: row.get(2)?,
            start_date: row.get(3)?,
            due_date: row.get(4)?,
            priority: row.get(5)?,
            position: row.get(6)?,
            owner_id: row.get(7)?,
        })
    }
}

impl ReadRow for TaskRow {
    const RESOURCE: Resource = Resource::Tasks;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            name: row.get(2)?,
            start_date: row.get(3)?,
            due_date: row.get(4)?,
            priority: row.get(5)?,
            position: row.get(6)?,
            completed: row.get::<_, i64>(7)? != 0,
            owner_id: row.get(8)?,
        })
    }
}

fn grant_from_row(row: &Row<'_>) -> rusqlite::Result<ShareGrant> {
    let expires_at: Option<String> = row.get(6)?;
    let revoked_at: Option<String> = row.get(7)?;
    Ok(ShareGrant {
        id: row.get(0)?,
        project_id: row.get(1)?,
        owner_id: row.get(2)?,
        owner_name: row.get(3)?,
        collaborator: row.get(4)?,
        token: row.get(5)?,
        expires_at: expires_at.map(|raw| parse_expiry(&raw)),
        revoked: revoked_at.is_some(),
    })
}

/// Unparseable expiry stamps are treated as already expired.
fn parse_expiry(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl Store {
    /// Map a bearer credential to a caller.
    ///
    /// `None` means anonymous. `Ok(None)` means the key matched no user.
    pub fn resolve_caller(&self, api_key: Option<&str>) -> Result<Option<Caller>> {
        let Some(key) = api_key else {
            return Ok(Some(Caller::Anonymous));
        };
        let user = sq_query_row(&self.conn(), users::get_by_api_key(key), |row| {
            Ok(AuthenticatedUser {
                id: row.get(0)?,
                username: row.get(1)?,
                is_admin: row.get::<_, i64>(2)? != 0,
            })
        })?;
        Ok(user.map(Caller::User))
    }

    /// Load the grants that can affect a read by `caller` with `token`.
    pub fn share_grants_for(
        &self,
        caller: &Caller,
        token: Option<&str>,
    ) -> Result<Vec<ShareGrant>> {
        let user = match caller {
            Caller::Anonymous => None,
            Caller::User(user) => Some((user.id, user.username.as_str())),
        };
        Ok(sq_query_map(
            &self.conn(),
            share_grants::relevant(user, token),
            grant_from_row,
        )?)
    }

    /// Resolve which rows of `resource` a caller may read, as of `now`.
    pub fn resolve_read(
        &self,
        caller: &Caller,
        resource: Resource,
        query: &ReadQuery,
        now: DateTime<Utc>,
    ) -> Result<QuerySpec> {
        let grants = self.share_grants_for(caller, query.effective_share_token())?;
        Ok(ShareQueryResolver::new(&grants, now).resolve(caller, resource, query))
    }

    /// Execute a resolved read.
    pub fn read<T: ReadRow>(&self, spec: &QuerySpec) -> Result<Vec<T>> {
        if spec.resource != T::RESOURCE {
            return Err(StoreError::ResourceMismatch {
                spec: spec.resource,
                requested: T::RESOURCE,
            });
        }
        if spec.visibility.is_nothing() {
            return Ok(Vec::new());
        }
        Ok(sq_query_map(&self.conn(), spec.select(), T::from_row)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use gantt_api::db::share_grants::InsertParams;
    use gantt_api::{FilterScope, SortKey};

    struct Fixture {
        store: Store,
        alice: Account,
        bob: Account,
    }

    struct Account {
        id: i64,
        key: &'static str,
    }

    fn fixture() -> Fixture {
        let store = Store::open_in_memory().unwrap();
        store.ensure_schema().unwrap();
        let alice = store.create_user("alice", Some("key-alice"), true).unwrap();
        let bob = store.create_user("bob", Some("key-bob"), false).unwrap();
        store
            .conn()
            .execute_batch(&format!(
                "INSERT INTO categories (id, name, position, owner_id) VALUES
                     (1, 'Work', 0, {alice}), (2, 'Home', 1, {bob});
                 INSERT INTO projects (id, category_id, name, due_date, priority, position, owner_id) VALUES
                     (10, 1, 'Launch', '2025-04-01', 1, 1, {alice}),
                     (11, 1, 'Audit', NULL, 3, 0, {alice}),
                     (20, 2, 'Garden', '2025-03-10', 2, 0, {bob});
                 INSERT INTO tasks (id, project_id, name, position, completed, owner_id) VALUES
                     (100, 10, 'Draft', 0, 0, {alice}),
                     (101, 10, 'Ship', 1, 1, {alice}),
                     (200, 20, 'Seeds', 0, 0, {bob});"
            ))
            .unwrap();
        Fixture {
            store,
            alice: Account { id: alice, key: "key-alice" },
            bob: Account { id: bob, key: "key-bob" },
        }
    }

    fn caller(store: &Store, key: &str) -> Caller {
        store.resolve_caller(Some(key)).unwrap().unwrap()
    }

    fn project_ids(store: &Store, caller: &Caller, query: &ReadQuery) -> Vec<i64> {
        let spec = store
            .resolve_read(caller, Resource::Projects, query, Utc::now())
            .unwrap();
        store
            .read::<ProjectRow>(&spec)
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect()
    }

    #[test]
    fn resolve_caller_distinguishes_anonymous_and_unknown() {
        let f = fixture();
        assert_eq!(f.store.resolve_caller(None).unwrap(), Some(Caller::Anonymous));
        assert_eq!(f.store.resolve_caller(Some("nope")).unwrap(), None);
        match caller(&f.store, f.alice.key) {
            Caller::User(user) => {
                assert_eq!(user.id, f.alice.id);
                assert!(user.is_admin);
            }
            Caller::Anonymous => panic!("expected a user"),
        }
    }

    #[test]
    fn own_scope_sorted_by_due_date_puts_nulls_last() {
        let f = fixture();
        let alice = caller(&f.store, f.alice.key);
        let query = ReadQuery {
            sort: Some(SortKey::DueDate),
            ..ReadQuery::default()
        };
        assert_eq!(project_ids(&f.store, &alice, &query), vec![10, 11]);
    }

    #[test]
    fn shared_with_me_follows_active_grants() {
        let f = fixture();
        let grant = f
            .store
            .create_share_grant(&InsertParams {
                project_id: 20,
                owner_id: f.bob.id,
                collaborator: Some("alice"),
                token: None,
                expires_at: None,
            })
            .unwrap();
        let alice = caller(&f.store, f.alice.key);
        let shared = ReadQuery {
            filter_scope: FilterScope::SharedWithMe,
            ..ReadQuery::default()
        };
        assert_eq!(project_ids(&f.store, &alice, &shared), vec![20]);

        let all = ReadQuery {
            filter_scope: FilterScope::All,
            sort: Some(SortKey::Name),
            ..ReadQuery::default()
        };
        assert_eq!(project_ids(&f.store, &alice, &all), vec![11, 20, 10]);

        let spec = f
            .store
            .resolve_read(&alice, Resource::Tasks, &shared, Utc::now())
            .unwrap();
        let tasks: Vec<i64> = f
            .store
            .read::<TaskRow>(&spec)
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(tasks, vec![200]);

        f.store.revoke_share_grant(grant, Utc::now()).unwrap();
        assert!(project_ids(&f.store, &alice, &shared).is_empty());
    }

    #[test]
    fn token_reads_are_isolated_to_the_granted_project() {
        let f = fixture();
        f.store
            .create_share_grant(&InsertParams {
                project_id: 10,
                owner_id: f.alice.id,
                collaborator: None,
                token: Some("view-10"),
                expires_at: None,
            })
            .unwrap();
        let query = ReadQuery {
            share_token: Some("view-10".into()),
            include_completed: true,
            ..ReadQuery::default()
        };

        // The token wins over the caller's own rows.
        let bob = caller(&f.store, f.bob.key);
        assert_eq!(project_ids(&f.store, &bob, &query), vec![10]);
        assert_eq!(project_ids(&f.store, &Caller::Anonymous, &query), vec![10]);

        let spec = f
            .store
            .resolve_read(&Caller::Anonymous, Resource::Categories, &query, Utc::now())
            .unwrap();
        let categories = f.store.read::<CategoryRow>(&spec).unwrap();
        assert_eq!(categories.iter().map(|c| c.id).collect::<Vec<_>>(), vec![1]);

        let spec = f
            .store
            .resolve_read(&Caller::Anonymous, Resource::Tasks, &query, Utc::now())
            .unwrap();
        assert_eq!(f.store.read::<TaskRow>(&spec).unwrap().len(), 2);
    }

    #[test]
    fn expired_and_unknown_tokens_see_nothing() {
        let f = fixture();
        let past = (Utc::now() - Duration::hours(1)).to_rfc3339();
        f.store
            .create_share_grant(&InsertParams {
                project_id: 10,
                owner_id: f.alice.id,
                collaborator: None,
                token: Some("old"),
                expires_at: Some(past.as_str()),
            })
            .unwrap();
        f.store
            .create_share_grant(&InsertParams {
                project_id: 11,
                owner_id: f.alice.id,
                collaborator: None,
                token: Some("garbled"),
                expires_at: Some("not a date"),
            })
            .unwrap();
        let alice = caller(&f.store, f.alice.key);
        for token in ["old", "garbled", "missing"] {
            let query = ReadQuery {
                share_token: Some(token.into()),
                ..ReadQuery::default()
            };
            assert!(project_ids(&f.store, &alice, &query).is_empty(), "{token}");
        }
    }

    #[test]
    fn completed_tasks_hidden_unless_requested() {
        let f = fixture();
        let alice = caller(&f.store, f.alice.key);
        let spec = f
            .store
            .resolve_read(&alice, Resource::Tasks, &ReadQuery::default(), Utc::now())
            .unwrap();
        let ids: Vec<i64> = f.store.read::<TaskRow>(&spec).unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![100]);
    }

    #[test]
    fn read_rejects_mismatched_row_type() {
        let f = fixture();
        let spec = f
            .store
            .resolve_read(&Caller::Anonymous, Resource::Tasks, &ReadQuery::default(), Utc::now())
            .unwrap();
        assert!(matches!(
            f.store.read::<ProjectRow>(&spec),
            Err(StoreError::ResourceMismatch { .. })
        ));
    }

    #[test]
    fn malformed_expiry_parses_as_expired() {
        assert_eq!(parse_expiry("soon"), DateTime::<Utc>::MIN_UTC);
        assert!(parse_expiry("2030-01-01T00:00:00Z") > Utc::now());
    }
}
