use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// A freshly stored upload.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UploadedFile {
    /// Public URL the provider can fetch the file from.
    pub url: String,
    pub filename: String,
    pub size: u64,
}

/// One entry of `GET /api/upload/list`.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct StoredUpload {
    pub filename: String,
    pub size: u64,
    pub created: Option<DateTime<Utc>>,
    pub url: String,
}
