//! Share grant query builders.

use sea_query::{Cond, Expr, Order, Query, SqliteQueryBuilder};

use super::tables::{ShareGrants, Users};
use crate::UserId;

pub type Built = (String, sea_query::Values);

/// SELECT the grants that can matter for one read: grants addressed to or
/// issued by `user`, plus the grant carrying `token`.
///
/// Column order must match `grant_from_row()` in `gantt-store`.
pub fn relevant(user: Option<(UserId, &str)>, token: Option<&str>) -> Built {
    let mut any = Cond::any();
    if let Some((id, username)) = user {
        any = any
            .add(Expr::col((ShareGrants::Table, ShareGrants::Collaborator)).eq(username))
            .add(Expr::col((ShareGrants::Table, ShareGrants::OwnerId)).eq(id));
    }
    if let Some(token) = token {
        any = any.add(Expr::col((ShareGrants::Table, ShareGrants::Token)).eq(token));
    }
    if user.is_none() && token.is_none() {
        any = any.add(Expr::cust("1 = 0"));
    }

    Query::select()
        .column((ShareGrants::Table, ShareGrants::Id))
        .column((ShareGrants::Table, ShareGrants::ProjectId))
        .column((ShareGrants::Table, ShareGrants::OwnerId))
        .column((Users::Table, Users::Username))
        .column((ShareGrants::Table, ShareGrants::Collaborator))
        .column((ShareGrants::Table, ShareGrants::Token))
        .column((ShareGrants::Table, ShareGrants::ExpiresAt))
        .column((ShareGrants::Table, ShareGrants::RevokedAt))
        .from(ShareGrants::Table)
        .inner_join(
            Users::Table,
            Expr::col((Users::Table, Users::Id)).equals((ShareGrants::Table, ShareGrants::OwnerId)),
        )
        .cond_where(any)
        .order_by((ShareGrants::Table, ShareGrants::Id), Order::Asc)
        .build(SqliteQueryBuilder)
}

/// Parameters for inserting a grant.
pub struct InsertParams<'a> {
    pub project_id: i64,
    pub owner_id: UserId,
    pub collaborator: Option<&'a str>,
    pub token: Option<&'a str>,
    pub expires_at: Option<&'a str>,
}

pub fn insert(p: &InsertParams<'_>) -> Built {
    Query::insert()
        .into_table(ShareGrants::Table)
        .columns([
            ShareGrants::ProjectId,
            ShareGrants::OwnerId,
            ShareGrants::Collaborator,
            ShareGrants::Token,
            ShareGrants::ExpiresAt,
        ])
        .values_panic([
            p.project_id.into(),
            p.owner_id.into(),
            p.collaborator.map(|s| s.to_string()).into(),
            p.token.map(|s| s.to_string()).into(),
            p.expires_at.map(|s| s.to_string()).into(),
        ])
        .build(SqliteQueryBuilder)
}

/// Mark a grant revoked. Already-revoked grants keep their original timestamp.
pub fn revoke(grant_id: i64, revoked_at: &str) -> Built {
    Query::update()
        .table(ShareGrants::Table)
        .value(ShareGrants::RevokedAt, revoked_at)
        .and_where(Expr::col(ShareGrants::Id).eq(grant_id))
        .and_where(Expr::col(ShareGrants::RevokedAt).is_null())
        .build(SqliteQueryBuilder)
}
