//! Service info and heartbeat endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{Value, json};
use utoipa::OpenApi;

use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(get_service_info, get_health))]
pub struct HealthApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_service_info))
        .route("/health", get(get_health))
}

/// Service description and endpoint index.
#[utoipa::path(
    get,
    path = "/",
    tag = "health",
    responses(
        (status = 200, description = "Service information", body = Value)
    )
)]
pub async fn get_service_info() -> Json<Value> {
    Json(json!({
        "service": "melodia",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Asynchronous music generation, lyrics writing and audio processing",
        "endpoints": {
            "generateLyrics": "POST /api/music/generate-lyrics",
            "getLyricsDetail": "GET /api/music/lyrics/{taskId}",
            "generateMusic": "POST /api/music/generate",
            "extendMusic": "POST /api/music/extend",
            "uploadAudio": "POST /api/upload/audio",
            "addVocals": "POST /api/music/add-vocals",
            "addInstrumental": "POST /api/music/add-instrumental",
            "getTask": "GET /api/music/task/{taskId}",
            "getTaskDetail": "GET /api/music/task/{taskId}/detail",
            "getAllTasks": "GET /api/music/tasks",
            "deleteTask": "DELETE /api/music/task/{taskId}",
            "stats": "GET /api/music/stats",
            "health": "GET /health"
        }
    }))
}

/// Heartbeat endpoint.
///
/// Load-balancers and monitoring systems should poll this endpoint.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is healthy", body = Value)
    )
)]
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "melodia",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now(),
        "uptimeSecs": state.started_at.elapsed().as_secs(),
    }))
}

// ── Tests ──────────────────────────────────────────────────────────────────────
