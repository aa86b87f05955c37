//! Shared API types, schema, and query builders for the Gantt tracker.
//!
//! This crate is the **single source of truth** for the read contract between
//! the client and the server. The `backend` feature adds the `sea-query`
//! table identifiers and the share-scoped query resolver used by the store.

use serde::{Deserialize, Serialize};

#[cfg(feature = "backend")]
pub mod db;
#[cfg(feature = "backend")]
pub mod share;

/// Identity value of a row in `users`.
pub type UserId = i64;

// ─── Shared Enums ────────────────────────────────────────────────────────────

/// Visibility mode requested by an authenticated reader.
///
/// The `byToken` scope is never requested directly: it is selected whenever a
/// share token accompanies the read.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum FilterScope {
    #[default]
    Own,
    SharedWithMe,
    All,
}

impl FilterScope {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Own => "own",
            Self::SharedWithMe => "sharedWithMe",
            Self::All => "all",
        }
    }
}

impl std::fmt::Display for FilterScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordering key for list reads. Every key is followed by `id ASC`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    #[default]
    Manual,
    DueDate,
    Priority,
    Name,
}

impl SortKey {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Manual => "manual",
            Self::DueDate => "dueDate",
            Self::Priority => "priority",
            Self::Name => "name",
        }
    }
}

impl std::fmt::Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Readable resource families.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Categories,
    Projects,
    Tasks,
}

impl Resource {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Categories => "categories",
            Self::Projects => "projects",
            Self::Tasks => "tasks",
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Reads ───────────────────────────────────────────────────────────────────

/// Query parameters for `GET /api/{categories,projects,tasks}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReadQuery {
    /// Selects the `byToken` scope when present; `filterScope` is then ignored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_token: Option<String>,
    #[serde(default)]
    pub filter_scope: FilterScope,
    /// Narrows `sharedWithMe` to grants exchanged with this username.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_collaborator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortKey>,
    /// Task reads only.
    #[serde(default)]
    pub include_completed: bool,
}

impl ReadQuery {
    /// The share token, if one was supplied and is not blank.
    pub fn effective_share_token(&self) -> Option<&str> {
        self.share_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn sort_key(&self) -> SortKey {
        self.sort.unwrap_or_default()
    }
}

/// A category row as returned by the read API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CategoryRow {
    pub id: i64,
    pub name: String,
    pub position: i64,
    pub owner_id: Option<UserId>,
}

/// A project row as returned by the read API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectRow {
    pub id: i64,
    pub category_id: Option<i64>,
    pub name: String,
    pub start_date: Option<String>,
    pub due_date: Option<String>,
    pub priority: i64,
    pub position: i64,
    pub owner_id: Option<UserId>,
}

/// A task row as returned by the read API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskRow {
    pub id: i64,
    pub project_id: Option<i64>,
    pub name: String,
    pub start_date: Option<String>,
    pub due_date: Option<String>,
    pub priority: i64,
    pub position: i64,
    pub completed: bool,
    pub owner_id: Option<UserId>,
}

/// Envelope for every list read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
}

// ─── Health ──────────────────────────────────────────────────────────────────

/// Returned by `GET /api/health` — server liveness check.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// JSON error body produced by the server.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_query_defaults_when_params_absent() {
        let q: ReadQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(q.filter_scope, FilterScope::Own);
        assert_eq!(q.sort_key(), SortKey::Manual);
        assert!(!q.include_completed);
        assert!(q.effective_share_token().is_none());
    }

    #[test]
    fn read_query_uses_camel_case_wire_names() {
        let q: ReadQuery = serde_json::from_str(
            r#"{"shareToken":"abc","filterScope":"sharedWithMe","filterCollaborator":"bob","sort":"dueDate","includeCompleted":true}"#,
        )
        .unwrap();
        assert_eq!(q.effective_share_token(), Some("abc"));
        assert_eq!(q.filter_scope, FilterScope::SharedWithMe);
        assert_eq!(q.filter_collaborator.as_deref(), Some("bob"));
        assert_eq!(q.sort, Some(SortKey::DueDate));
        assert!(q.include_completed);
    }

    #[test]
    fn blank_share_token_is_treated_as_absent() {
        let q = ReadQuery {
            share_token: Some("   ".into()),
            ..Default::default()
        };
        assert!(q.effective_share_token().is_none());
    }

    #[test]
    fn scope_round_trips_through_display() {
        for scope in [FilterScope::Own, FilterScope::SharedWithMe, FilterScope::All] {
            let json = serde_json::to_string(&scope).unwrap();
            assert_eq!(json, format!("\"{scope}\""));
        }
    }
}
