//! Share-scoped read resolution.
//!
//! [`ShareQueryResolver`] turns a caller, a [`ReadQuery`] and a snapshot of
//! share grants into a [`QuerySpec`]: which rows a read may return and in what
//! order. It performs no I/O. The store loads the grant snapshot and executes
//! the rendered SELECT.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use sea_query::{
    Cond, Expr, NullOrdering, Order, Query, SelectStatement, SimpleExpr, SqliteQueryBuilder,
};

use crate::db::tables::{Categories, Projects, Tasks};
use crate::{FilterScope, ReadQuery, Resource, SortKey, UserId};

pub type Built = (String, sea_query::Values);

/// Who is reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Anonymous,
    User(AuthenticatedUser),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: UserId,
    pub username: String,
    pub is_admin: bool,
}

/// A share grant as seen by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareGrant {
    pub id: i64,
    /// Shared resource: the project and its task tree.
    pub project_id: i64,
    pub owner_id: UserId,
    pub owner_name: String,
    /// Username the grant is addressed to, if any.
    pub collaborator: Option<String>,
    /// Opaque token for anonymous viewers, if any.
    pub token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked: bool,
}

impl ShareGrant {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.expires_at.is_none_or(|expires| expires > now)
    }

    fn names(&self, username: &str) -> bool {
        self.collaborator.as_deref() == Some(username)
    }
}

/// Effective scope of a read after the share token has been considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShareScope {
    Own,
    SharedWithMe,
    All,
    ByToken,
}

impl From<FilterScope> for ShareScope {
    fn from(scope: FilterScope) -> Self {
        match scope {
            FilterScope::Own => Self::Own,
            FilterScope::SharedWithMe => Self::SharedWithMe,
            FilterScope::All => Self::All,
        }
    }
}

/// Row predicate of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    /// Matches zero rows.
    Nothing,
    /// Rows owned by `owner`, or reachable from any of `projects`.
    Rows {
        owner: Option<UserId>,
        projects: BTreeSet<i64>,
    },
}

impl Visibility {
    fn rows(owner: Option<UserId>, projects: BTreeSet<i64>) -> Self {
        if owner.is_none() && projects.is_empty() {
            Self::Nothing
        } else {
            Self::Rows { owner, projects }
        }
    }

    pub fn is_nothing(&self) -> bool {
        matches!(self, Self::Nothing)
    }
}

/// Predicate and ordering for one read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySpec {
    pub resource: Resource,
    pub scope: ShareScope,
    pub visibility: Visibility,
    pub sort: SortKey,
    pub exclude_completed: bool,
}

/// Resolves reads against a fixed snapshot of grants at a fixed instant.
pub struct ShareQueryResolver<'a> {
    grants: &'a [ShareGrant],
    now: DateTime<Utc>,
}

impl<'a> ShareQueryResolver<'a> {
    pub fn new(grants: &'a [ShareGrant], now: DateTime<Utc>) -> Self {
        Self { grants, now }
    }

    pub fn resolve(&self, caller: &Caller, resource: Resource, query: &ReadQuery) -> QuerySpec {
        let token = query.effective_share_token();
        let scope = match token {
            Some(_) => ShareScope::ByToken,
            None => ShareScope::from(query.filter_scope),
        };

        let visibility = match (scope, caller) {
            (ShareScope::ByToken, _) => self.token_visibility(token.unwrap_or_default()),
            (_, Caller::Anonymous) => Visibility::Nothing,
            (ShareScope::Own, Caller::User(user)) => {
                Visibility::rows(Some(user.id), BTreeSet::new())
            }
            (ShareScope::SharedWithMe, Caller::User(user)) => Visibility::rows(
                None,
                self.shared_projects(user, query.filter_collaborator.as_deref()),
            ),
            (ShareScope::All, Caller::User(user)) => {
                Visibility::rows(Some(user.id), self.shared_projects(user, None))
            }
        };

        QuerySpec {
            resource,
            scope,
            visibility,
            sort: query.sort_key(),
            exclude_completed: resource == Resource::Tasks && !query.include_completed,
        }
    }

    fn active(&self) -> impl Iterator<Item = &ShareGrant> {
        self.grants.iter().filter(|g| g.is_active(self.now))
    }

    fn token_visibility(&self, token: &str) -> Visibility {
        match self.active().find(|g| g.token.as_deref() == Some(token)) {
            Some(grant) => Visibility::rows(None, BTreeSet::from([grant.project_id])),
            None => Visibility::Nothing,
        }
    }

    /// Projects shared with `user`. With `other`, only grants exchanged between
    /// `user` and `other` in either direction count.
    fn shared_projects(&self, user: &AuthenticatedUser, other: Option<&str>) -> BTreeSet<i64> {
        self.active()
            .filter(|g| match other {
                None => g.names(&user.username) && g.owner_id != user.id,
                Some(other) => {
                    (g.names(&user.username) && g.owner_name == other)
                        || (g.owner_id == user.id && g.names(other))
                }
            })
            .map(|g| g.project_id)
            .collect()
    }
}

// ── Rendering ──────────────────────────────────────────────────────────────

impl QuerySpec {
    /// Render the SELECT for this read.
    /// Column order must match the row mappers in `gantt-store`.
    pub fn select(&self) -> Built {
        let mut q = Query::select();
        match self.resource {
            Resource::Categories => {
                q.column((Categories::Table, Categories::Id))
                    .column((Categories::Table, Categories::Name))
                    .column((Categories::Table, Categories::Position))
                    .column((Categories::Table, Categories::OwnerId))
                    .from(Categories::Table);
            }
            Resource::Projects => {
                q.column((Projects::Table, Projects::Id))
                    .column((Projects::Table, Projects::CategoryId))
                    .column((Projects::Table, Projects::Name))
                    .column((Projects::Table, Projects::StartDate))
                    .column((Projects::Table, Projects::DueDate))
                    .column((Projects::Table, Projects::Priority))
                    .column((Projects::Table, Projects::Position))
                    .column((Projects::Table, Projects::OwnerId))
                    .from(Projects::Table);
            }
            Resource::Tasks => {
                q.column((Tasks::Table, Tasks::Id))
                    .column((Tasks::Table, Tasks::ProjectId))
                    .column((Tasks::Table, Tasks::Name))
                    .column((Tasks::Table, Tasks::StartDate))
                    .column((Tasks::Table, Tasks::DueDate))
                    .column((Tasks::Table, Tasks::Priority))
                    .column((Tasks::Table, Tasks::Position))
                    .column((Tasks::Table, Tasks::Completed))
                    .column((Tasks::Table, Tasks::OwnerId))
                    .from(Tasks::Table);
            }
        }

        q.cond_where(self.condition());
        if self.exclude_completed {
            q.and_where(Expr::col((Tasks::Table, Tasks::Completed)).eq(0));
        }
        self.order(&mut q);
        q.build(SqliteQueryBuilder)
    }

    fn condition(&self) -> Cond {
        match &self.visibility {
            Visibility::Nothing => Cond::all().add(Expr::cust("1 = 0")),
            Visibility::Rows { owner, projects } => {
                let mut any = Cond::any();
                if let Some(owner) = owner {
                    any = any.add(owner_expr(self.resource, *owner));
                }
                if !projects.is_empty() {
                    any = any.add(reach_expr(self.resource, projects));
                }
                any
            }
        }
    }

    fn order(&self, q: &mut SelectStatement) {
        match (self.resource, self.sort) {
            (Resource::Categories, SortKey::Name) => {
                q.order_by((Categories::Table, Categories::Name), Order::Asc);
            }
            // Categories carry no dates or priorities.
            (Resource::Categories, _) => {
                q.order_by((Categories::Table, Categories::Position), Order::Asc);
            }
            (Resource::Projects, SortKey::Manual) => {
                q.order_by((Projects::Table, Projects::Position), Order::Asc);
            }
            (Resource::Projects, SortKey::DueDate) => {
                q.order_by_with_nulls(
                    (Projects::Table, Projects::DueDate),
                    Order::Asc,
                    NullOrdering::Last,
                );
            }
            (Resource::Projects, SortKey::Priority) => {
                q.order_by((Projects::Table, Projects::Priority), Order::Desc);
            }
            (Resource::Projects, SortKey::Name) => {
                q.order_by((Projects::Table, Projects::Name), Order::Asc);
            }
            (Resource::Tasks, SortKey::Manual) => {
                q.order_by((Tasks::Table, Tasks::Position), Order::Asc);
            }
            (Resource::Tasks, SortKey::DueDate) => {
                q.order_by_with_nulls(
                    (Tasks::Table, Tasks::DueDate),
                    Order::Asc,
                    NullOrdering::Last,
                );
            }
            (Resource::Tasks, SortKey::Priority) => {
                q.order_by((Tasks::Table, Tasks::Priority), Order::Desc);
            }
            (Resource::Tasks, SortKey::Name) => {
                q.order_by((Tasks::Table, Tasks::Name), Order::Asc);
            }
        }

        // Total tie-break so repeated reads come back in the same order.
        match self.resource {
            Resource::Categories => q.order_by((Categories::Table, Categories::Id), Order::Asc),
            Resource::Projects => q.order_by((Projects::Table, Projects::Id), Order::Asc),
            Resource::Tasks => q.order_by((Tasks::Table, Tasks::Id), Order::Asc),
        };
    }
}

fn owner_expr(resource: Resource, owner: UserId) -> SimpleExpr {
    match resource {
        Resource::Categories => Expr::col((Categories::Table, Categories::OwnerId)).eq(owner),
        Resource::Projects => Expr::col((Projects::Table, Projects::OwnerId)).eq(owner),
        Resource::Tasks => Expr::col((Tasks::Table, Tasks::OwnerId)).eq(owner),
    }
}

fn reach_expr(resource: Resource, projects: &BTreeSet<i64>) -> SimpleExpr {
    let ids = projects.iter().copied();
    match resource {
        Resource::Projects => Expr::col((Projects::Table, Projects::Id)).is_in(ids),
        Resource::Tasks => Expr::col((Tasks::Table, Tasks::ProjectId)).is_in(ids),
        Resource::Categories => Expr::col((Categories::Table, Categories::Id)).in_subquery(
            Query::select()
                .column((Projects::Table, Projects::CategoryId))
                .from(Projects::Table)
                .and_where(Expr::col((Projects::Table, Projects::Id)).is_in(ids))
                .to_owned(),
        ),
    }
}
