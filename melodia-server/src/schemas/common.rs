use axum::http::StatusCode;
use serde::Serialize;

/// Envelope wrapped around every JSON response.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            msg: "success".to_owned(),
            data: Some(data),
        }
    }

    pub fn accepted(data: T) -> Self {
        Self {
            code: StatusCode::ACCEPTED.as_u16(),
            msg: "Task created successfully".to_owned(),
            data: Some(data),
        }
    }

    /// Envelope without a payload.
    pub fn message(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            code: status.as_u16(),
            msg: msg.into(),
            data: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn success() -> Self {
        Self::message(StatusCode::OK, "success")
    }
}
