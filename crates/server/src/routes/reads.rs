use axum::{
    Json,
    extract::{Query, State, rejection::QueryRejection},
};
use chrono::Utc;

use gantt_api::{CategoryRow, ListResponse, ProjectRow, ReadQuery, TaskRow};
use gantt_store::reads::ReadRow;

use super::auth::ReadCaller;
use crate::error::ApiErr;
use crate::storage::Db;

type ListResult<T> = Result<Json<ListResponse<T>>, ApiErr>;

/// GET /api/categories
pub async fn list_categories(
    State(db): State<Db>,
    caller: ReadCaller,
    query: Result<Query<ReadQuery>, QueryRejection>,
) -> ListResult<CategoryRow> {
    list(&db, caller, query)
}

/// GET /api/projects
pub async fn list_projects(
    State(db): State<Db>,
    caller: ReadCaller,
    query: Result<Query<ReadQuery>, QueryRejection>,
) -> ListResult<ProjectRow> {
    list(&db, caller, query)
}

/// GET /api/tasks
pub async fn list_tasks(
    State(db): State<Db>,
    caller: ReadCaller,
    query: Result<Query<ReadQuery>, QueryRejection>,
) -> ListResult<TaskRow> {
    list(&db, caller, query)
}

fn list<T: ReadRow>(
    db: &Db,
    ReadCaller(caller): ReadCaller,
    query: Result<Query<ReadQuery>, QueryRejection>,
) -> ListResult<T> {
    let Query(query) = query.map_err(|e| ApiErr::bad_request(e.body_text()))?;
    let spec = db
        .store()
        .resolve_read(&caller, T::RESOURCE, &query, Utc::now())
        .map_err(ApiErr::from_db("resolve read"))?;
    let items = db
        .store()
        .read::<T>(&spec)
        .map_err(ApiErr::from_db("read rows"))?;
    Ok(Json(ListResponse { items }))
}
