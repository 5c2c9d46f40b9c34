//! Task query endpoints.
//!
//! `task/{id}` and `stats` read the scheduler's live state; `tasks` reads the
//! journal, which also remembers tasks already swept from memory and those
//! interrupted by a restart. `task/{id}/detail` and `lyrics/{id}` pass a
//! provider task id straight through to the provider.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use melodia_core::{PollTarget, SchedulerStats, Task, TaskId, TaskLogEntry};
use serde_json::Value;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::common::ApiResponse;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(
    get_task,
    delete_task,
    list_tasks,
    get_stats,
    get_task_detail,
    get_lyrics_detail
))]
pub struct TasksApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/task/{id}", get(get_task).delete(delete_task))
        .route("/task/{id}/detail", get(get_task_detail))
        .route("/tasks", get(list_tasks))
        .route("/stats", get(get_stats))
        .route("/lyrics/{id}", get(get_lyrics_detail))
}

/// Unparseable ids cannot name a task, so they are reported as missing.
fn parse_task_id(id: &str) -> Result<TaskId, ServerError> {
    id.parse()
        .map_err(|_| ServerError::NotFound(format!("task {id} not found")))
}

#[utoipa::path(
    get,
    path = "/api/music/task/{id}",
    tag = "tasks",
    params(
        ("id" = String, Path, description = "Task id returned at submission")
    ),
    responses(
        (status = 200, description = "Full task snapshot", body = Value),
        (status = 404, description = "Task not found"),
    )
)]
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Task>>, ServerError> {
    let task_id = parse_task_id(&id)?;
    let task = state
        .scheduler
        .get(&task_id)
        .await
        .ok_or_else(|| ServerError::NotFound(format!("task {id} not found")))?;
    Ok(Json(ApiResponse::ok(task)))
}

#[utoipa::path(
    delete,
    path = "/api/music/task/{id}",
    tag = "tasks",
    params(
        ("id" = String, Path, description = "Task id returned at submission")
    ),
    responses(
        (status = 200, description = "Task removed; a running pipeline is aborted"),
        (status = 404, description = "Task not found"),
    )
)]
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ServerError> {
    let task_id = parse_task_id(&id)?;
    if !state.scheduler.delete(&task_id).await {
        return Err(ServerError::NotFound(format!("task {id} not found")));
    }
    Ok(Json(ApiResponse::success()))
}

#[utoipa::path(
    get,
    path = "/api/music/tasks",
    tag = "tasks",
    responses(
        (status = 200, description = "Journal entries, most recently updated first", body = Value)
    )
)]
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<Vec<TaskLogEntry>>> {
    Json(ApiResponse::ok(state.scheduler.journal().await))
}

#[utoipa::path(
    get,
    path = "/api/music/stats",
    tag = "tasks",
    responses(
        (status = 200, description = "Task counts and queue occupancy", body = Value)
    )
)]
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<ApiResponse<SchedulerStats>> {
    Json(ApiResponse::ok(state.scheduler.stats().await))
}

#[utoipa::path(
    get,
    path = "/api/music/task/{id}/detail",
    tag = "tasks",
    params(
        ("id" = String, Path, description = "Provider task id")
    ),
    responses(
        (status = 200, description = "Raw provider generation record", body = Value),
        (status = 502, description = "Provider lookup failed"),
    )
)]
pub async fn get_task_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Value>>, ServerError> {
    let record = state.provider.raw_record(PollTarget::Media, &id).await?;
    Ok(Json(ApiResponse::ok(record)))
}

#[utoipa::path(
    get,
    path = "/api/music/lyrics/{id}",
    tag = "tasks",
    params(
        ("id" = String, Path, description = "Provider task id")
    ),
    responses(
        (status = 200, description = "Raw provider lyrics record", body = Value),
        (status = 502, description = "Provider lookup failed"),
    )
)]
pub async fn get_lyrics_detail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Value>>, ServerError> {
    let record = state.provider.raw_record(PollTarget::Lyrics, &id).await?;
    Ok(Json(ApiResponse::ok(record)))
}
