//! Provider push notifications.
//!
//! The provider calls these with its own progress reports. Task state is
//! driven by polling, so a notification is only logged and acknowledged;
//! a malformed one is still acknowledged so the provider does not retry it.

use std::sync::Arc;

use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::Value;
use tracing::{info, warn};
use utoipa::OpenApi;

use crate::schemas::common::ApiResponse;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(paths(music_notification, lyrics_notification))]
pub struct CallbackApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/music-internal", post(music_notification))
        .route("/lyrics-internal", post(lyrics_notification))
}

fn log_notification(kind: &'static str, body: &[u8]) {
    match serde_json::from_slice::<Value>(body) {
        Ok(payload) => {
            let data = &payload["data"];
            let external_task_id = data["task_id"]
                .as_str()
                .or_else(|| data["taskId"].as_str())
                .unwrap_or_default();
            info!(
                kind,
                external_task_id,
                callback_type = data["callbackType"].as_str().unwrap_or_default(),
                code = ?payload.get("code"),
                "provider notification received"
            );
        }
        Err(e) => warn!(kind, error = %e, bytes = body.len(), "unparseable provider notification"),
    }
}

#[utoipa::path(
    post,
    path = "/api/callback/music-internal",
    tag = "callback",
    request_body = Value,
    responses(
        (status = 200, description = "Notification acknowledged")
    )
)]
pub async fn music_notification(body: Bytes) -> Json<ApiResponse<()>> {
    log_notification("music", &body);
    Json(ApiResponse::success())
}

#[utoipa::path(
    post,
    path = "/api/callback/lyrics-internal",
    tag = "callback",
    request_body = Value,
    responses(
        (status = 200, description = "Notification acknowledged")
    )
)]
pub async fn lyrics_notification(body: Bytes) -> Json<ApiResponse<()>> {
    log_notification("lyrics", &body);
    Json(ApiResponse::success())
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::TestApp;
    use axum::http::StatusCode;
    use serde_json::json;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn notifications_are_logged_and_acknowledged() {
        let app = TestApp::new();
        let (status, body) = app
            .post_json(
                "/api/callback/music-internal",
                json!({
                    "code": 200,
                    "msg": "All generated successfully.",
                    "data": { "callbackType": "complete", "task_id": "ext-77", "data": [] }
                }),
            )
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], 200);
        assert!(logs_contain("provider notification received"));
        assert!(logs_contain("ext-77"));
    }

    #[tokio::test]
    async fn garbage_is_still_acknowledged() {
        let app = TestApp::new();
        let (status, _) = app.post_raw("/api/callback/lyrics-internal", "%%%").await;
        assert_eq!(status, StatusCode::OK);
    }
}
