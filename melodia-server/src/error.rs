//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors become the same
//! `{ "code", "msg" }` envelope successful responses use.
//!
//! Internal errors are logged with full detail but only a generic message is
//! returned to the caller.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use melodia_core::{ProviderError, RuntimeError};
use thiserror::Error;
use tracing::{error, warn};

use crate::schemas::common::ApiResponse;

/// All errors that can occur in the melodia-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Propagated from the scheduler.
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// A pass-through provider lookup failed.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Request body failed field validation.
    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// The caller referenced a resource that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::Validation(e) => (StatusCode::BAD_REQUEST, e.to_string()),

            ServerError::Runtime(e) => match e {
                RuntimeError::QueueFull { .. } | RuntimeError::ShuttingDown => {
                    warn!(error = %e, "task admission refused");
                    (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
                }
                RuntimeError::TaskNotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
                _ => {
                    error!(error = %e, "runtime error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal server error".to_owned(),
                    )
                }
            },
            ServerError::Provider(e) => {
                warn!(error = %e, "provider lookup failed");
                let message = match e {
                    ProviderError::Rejected { message, .. } => message.clone(),
                    _ => "provider unavailable".to_owned(),
                };
                (StatusCode::BAD_GATEWAY, message)
            }
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        let body: ApiResponse<()> = ApiResponse::message(status, message);
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(e: anyhow::Error) -> Self {
        error!(error = ?e, "converting anyhow error to ServerError::Internal");
        ServerError::Internal(e.to_string())
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        ServerError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_full_is_service_unavailable() {
        let err = ServerError::from(RuntimeError::QueueFull {
            current: 3,
            capacity: 3,
        });
        let (status, message) = err.status_and_message();
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(message.contains("capacity 3"), "{message}");
    }

    #[test]
    fn internal_detail_is_not_exposed() {
        let err = ServerError::Internal("/srv/secret/path exploded".into());
        let (status, message) = err.status_and_message();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(message, "internal server error");
    }

    #[test]
    fn provider_rejections_keep_their_message() {
        let err = ServerError::from(ProviderError::Rejected {
            code: 404,
            message: "record not found".into(),
        });
        let (status, message) = err.status_and_message();
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(message, "record not found");
    }
}
