//! User lookup query builders.

use sea_query::{Expr, Order, Query, SqliteQueryBuilder};

use super::tables::Users;

pub type Built = (String, sea_query::Values);

/// Resolve a bearer credential (returns id, username, is_admin).
pub fn get_by_api_key(api_key: &str) -> Built {
    Query::select()
        .columns([Users::Id, Users::Username, Users::IsAdmin])
        .from(Users::Table)
        .and_where(Expr::col(Users::ApiKey).eq(api_key))
        .build(SqliteQueryBuilder)
}

/// The default owner for backfill: the admin with the lowest id.
///
/// More than one admin may exist; ordering by id makes the pick stable
/// across runs instead of depending on scan order.
pub fn default_owner() -> Built {
    Query::select()
        .column(Users::Id)
        .from(Users::Table)
        .and_where(Expr::col(Users::IsAdmin).ne(0))
        .order_by(Users::Id, Order::Asc)
        .limit(1)
        .build(SqliteQueryBuilder)
}

/// Insert a user (returns nothing; id is assigned by SQLite).
pub fn insert(username: &str, api_key: Option<&str>, is_admin: bool) -> Built {
    Query::insert()
        .into_table(Users::Table)
        .columns([Users::Username, Users::ApiKey, Users::IsAdmin])
        .values_panic([
            username.into(),
            api_key.map(|s| s.to_string()).into(),
            i64::from(is_admin).into(),
        ])
        .build(SqliteQueryBuilder)
}
