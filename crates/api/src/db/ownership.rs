//! Owner backfill query builders.
//!
//! Table names come from [`super::migrations::OWNED_TABLES`], so they are
//! addressed through `Alias` rather than the typed `Iden` enums.

use sea_query::{Alias, Asterisk, Expr, Func, Query, SqliteQueryBuilder};

use super::migrations::{EXPANSION_TABLE, OWNER_COLUMN};
use crate::UserId;

pub type Built = (String, sea_query::Values);

/// UPDATE every ownerless row of `table` to `owner`.
pub fn assign_owner(table: &str, owner: UserId) -> Built {
    Query::update()
        .table(Alias::new(table))
        .value(Alias::new(OWNER_COLUMN), owner)
        .and_where(Expr::col(Alias::new(OWNER_COLUMN)).is_null())
        .build(SqliteQueryBuilder)
}

/// COUNT ownerless rows of `table`.
pub fn count_ownerless(table: &str) -> Built {
    Query::select()
        .expr(Func::count(Expr::col(Asterisk)))
        .from(Alias::new(table))
        .and_where(Expr::col(Alias::new(OWNER_COLUMN)).is_null())
        .build(SqliteQueryBuilder)
}

/// DELETE ownerless expansion rows for projects `owner` already has a row for.
///
/// Must run before [`assign_owner`] on the expansion table, whose key is
/// `(owner_id, project_id)`.
pub fn drop_shadowed_expansion(owner: UserId) -> Built {
    Query::delete()
        .from_table(Alias::new(EXPANSION_TABLE))
        .and_where(Expr::col(Alias::new(OWNER_COLUMN)).is_null())
        .and_where(
            Expr::col(Alias::new("project_id")).in_subquery(
                Query::select()
                    .column(Alias::new("project_id"))
                    .from(Alias::new(EXPANSION_TABLE))
                    .and_where(Expr::col(Alias::new(OWNER_COLUMN)).eq(owner))
                    .to_owned(),
            ),
        )
        .build(SqliteQueryBuilder)
}

/// DELETE all but the first ownerless expansion row per project.
///
/// The composite key does not stop several `NULL`-owner rows for one project;
/// once they share an owner they would collide.
pub fn drop_duplicate_ownerless_expansion() -> Built {
    Query::delete()
        .from_table(Alias::new(EXPANSION_TABLE))
        .and_where(Expr::col(Alias::new(OWNER_COLUMN)).is_null())
        .and_where(
            Expr::col(Alias::new("rowid")).not_in_subquery(
                Query::select()
                    .expr(Func::min(Expr::col(Alias::new("rowid"))))
                    .from(Alias::new(EXPANSION_TABLE))
                    .and_where(Expr::col(Alias::new(OWNER_COLUMN)).is_null())
                    .group_by_col(Alias::new("project_id"))
                    .to_owned(),
            ),
        )
        .build(SqliteQueryBuilder)
}
