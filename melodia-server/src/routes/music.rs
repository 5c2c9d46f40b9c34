//! Task submission endpoints.
//!
//! Every handler validates its body, hands the task to the scheduler and
//! answers 202 with the Pending snapshot; progress is then read through the
//! task routes.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use melodia_core::TaskType;
use serde::Serialize;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::extract::ValidatedJson;
use crate::schemas::common::ApiResponse;
use crate::schemas::music::{
    AddInstrumentalRequest, AddVocalsRequest, ExtendMusicRequest, GenerateLyricsRequest,
    GenerateMusicRequest,
};
use crate::schemas::task::TaskAccepted;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(generate_music, generate_lyrics, add_vocals, add_instrumental, extend_music),
    components(schemas(
        GenerateMusicRequest,
        GenerateLyricsRequest,
        AddVocalsRequest,
        AddInstrumentalRequest,
        ExtendMusicRequest,
        TaskAccepted
    ))
)]
pub struct MusicApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/generate", post(generate_music))
        .route("/generate-lyrics", post(generate_lyrics))
        .route("/add-vocals", post(add_vocals))
        .route("/add-instrumental", post(add_instrumental))
        .route("/extend", post(extend_music))
}

type Accepted = (StatusCode, Json<ApiResponse<TaskAccepted>>);

async fn admit<R: Serialize>(
    state: &AppState,
    task_type: TaskType,
    request: &R,
    callback_url: Option<String>,
) -> Result<Accepted, ServerError> {
    let input = serde_json::to_value(request)
        .map_err(|e| ServerError::Internal(format!("failed to encode task input: {e}")))?;
    let task = state.scheduler.submit(task_type, input, callback_url).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::accepted(TaskAccepted::from(&task))),
    ))
}

#[utoipa::path(
    post,
    path = "/api/music/generate",
    tag = "music",
    request_body = GenerateMusicRequest,
    responses(
        (status = 202, description = "Task accepted", body = TaskAccepted),
        (status = 400, description = "Invalid request"),
        (status = 503, description = "Queue is full"),
    )
)]
pub async fn generate_music(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<GenerateMusicRequest>,
) -> Result<Accepted, ServerError> {
    admit(&state, TaskType::MusicGeneration, &req, req.callback_url.clone()).await
}

#[utoipa::path(
    post,
    path = "/api/music/generate-lyrics",
    tag = "music",
    request_body = GenerateLyricsRequest,
    responses(
        (status = 202, description = "Task accepted", body = TaskAccepted),
        (status = 400, description = "Invalid request"),
        (status = 503, description = "Queue is full"),
    )
)]
pub async fn generate_lyrics(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<GenerateLyricsRequest>,
) -> Result<Accepted, ServerError> {
    admit(&state, TaskType::LyricsGeneration, &req, req.callback_url.clone()).await
}

#[utoipa::path(
    post,
    path = "/api/music/add-vocals",
    tag = "music",
    request_body = AddVocalsRequest,
    responses(
        (status = 202, description = "Task accepted", body = TaskAccepted),
        (status = 400, description = "Invalid request"),
        (status = 503, description = "Queue is full"),
    )
)]
pub async fn add_vocals(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<AddVocalsRequest>,
) -> Result<Accepted, ServerError> {
    admit(&state, TaskType::AddVocals, &req, req.callback_url.clone()).await
}

#[utoipa::path(
    post,
    path = "/api/music/add-instrumental",
    tag = "music",
    request_body = AddInstrumentalRequest,
    responses(
        (status = 202, description = "Task accepted", body = TaskAccepted),
        (status = 400, description = "Invalid request"),
        (status = 503, description = "Queue is full"),
    )
)]
pub async fn add_instrumental(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<AddInstrumentalRequest>,
) -> Result<Accepted, ServerError> {
    admit(&state, TaskType::AddInstrumental, &req, req.callback_url.clone()).await
}

#[utoipa::path(
    post,
    path = "/api/music/extend",
    tag = "music",
    request_body = ExtendMusicRequest,
    responses(
        (status = 202, description = "Task accepted", body = TaskAccepted),
        (status = 400, description = "Invalid request"),
        (status = 503, description = "Queue is full"),
    )
)]
pub async fn extend_music(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<ExtendMusicRequest>,
) -> Result<Accepted, ServerError> {
    admit(&state, TaskType::Extend, &req, req.callback_url.clone()).await
}
