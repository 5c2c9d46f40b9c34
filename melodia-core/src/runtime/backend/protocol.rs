//! Collaborator seams used by the pipeline.
//!
//! The runtime never talks HTTP or touches disk directly; it calls through
//! these traits so the concrete services in [`crate::services`] can be
//! swapped for in-memory mocks in tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::runtime::status::{PollTarget, ProviderStatus};
use crate::runtime::types::{TaskResult, TaskStatus, TaskType};

// ── Errors ────────────────────────────────────────────────────────────────────

/// Failure talking to the external generation provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Request never produced a usable HTTP response (DNS, connect, timeout).
    #[error("provider transport error: {0}")]
    Transport(String),

    /// The provider answered but refused the request.
    #[error("provider rejected request (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}

/// Failure persisting an artifact to object storage.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("failed to obtain signed upload url: {0}")]
    SignedUrl(String),

    #[error("failed to download artifact from {url}: {message}")]
    Download { url: String, message: String },

    #[error("storage rejected upload with HTTP {status}")]
    Rejected { status: u16 },

    #[error("upload transport error: {0}")]
    Transport(String),

    #[error("upload I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reading or writing the task journal.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("task log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("task log is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The journal could not be parsed; it was moved to `preserved` so the
    /// next write cannot clobber it.
    #[error("task log is corrupt (kept at {}): {source}", preserved.display())]
    Corrupt {
        preserved: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// ── Provider data ─────────────────────────────────────────────────────────────

/// One generated clip as reported by the provider.
///
/// `fields` holds every other provider attribute (id, title, tags, duration, ...)
/// untouched so it can be echoed back in the final result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaArtifact {
    #[serde(rename = "audioUrl", default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Normalized answer of a media status query.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationStatus {
    pub status: ProviderStatus,
    /// The provider's own status string, kept for logs.
    pub raw_status: String,
    pub artifacts: Vec<MediaArtifact>,
    pub error_message: Option<String>,
}

/// Normalized answer of a lyrics status query.
#[derive(Debug, Clone, PartialEq)]
pub struct LyricsStatus {
    pub status: ProviderStatus,
    pub raw_status: String,
    pub text: Option<String>,
    pub title: Option<String>,
    pub error_message: Option<String>,
}

// ── Callback / journal data ───────────────────────────────────────────────────

/// Body POSTed to a caller's callback URL once a task is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackPayload {
    pub task_id: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Status as recorded in the durable journal.
///
/// `Interrupted` only appears there: it marks work a previous process was
/// running when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggedStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Interrupted,
}

impl LoggedStatus {
    pub fn is_unfinished(self) -> bool {
        matches!(self, LoggedStatus::Pending | LoggedStatus::Processing)
    }
}

impl From<TaskStatus> for LoggedStatus {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Pending => LoggedStatus::Pending,
            TaskStatus::Processing => LoggedStatus::Processing,
            TaskStatus::Completed => LoggedStatus::Completed,
            TaskStatus::Failed => LoggedStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLogEntry {
    pub task_id: String,
    pub task_type: TaskType,
    pub status: LoggedStatus,
    pub external_task_id: Option<String>,
    pub progress: u8,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ── Traits ────────────────────────────────────────────────────────────────────

/// Client for the external generation provider.
#[async_trait]
pub trait ProviderClient: Send + Sync + 'static {
    /// Start a generation and return the provider's task id.
    ///
    /// `callback_url`, when set, is where the provider pushes its own
    /// progress notifications.
    async fn submit(
        &self,
        task_type: TaskType,
        input: &serde_json::Value,
        callback_url: Option<&str>,
    ) -> Result<String, ProviderError>;

    async fn poll_status(&self, external_task_id: &str)
    -> Result<GenerationStatus, ProviderError>;

    async fn poll_lyrics(&self, external_task_id: &str) -> Result<LyricsStatus, ProviderError>;

    /// Unprocessed record for a provider task, used by detail lookups.
    async fn raw_record(
        &self,
        target: PollTarget,
        external_task_id: &str,
    ) -> Result<serde_json::Value, ProviderError> {
        let _ = (target, external_task_id);
        Err(ProviderError::NotConfigured(
            "raw record lookup is not supported by this provider".into(),
        ))
    }
}

/// Persists a remotely hosted artifact and returns its storage key.
#[async_trait]
pub trait ObjectUploader: Send + Sync + 'static {
    async fn upload_from_url(&self, url: &str, extension: &str) -> Result<String, UploadError>;
}

/// Best-effort delivery of terminal notifications. Never fails.
#[async_trait]
pub trait CallbackNotifier: Send + Sync + 'static {
    async fn deliver(&self, url: &str, payload: &CallbackPayload);
}

/// Durable store behind the task journal.
#[async_trait]
pub trait TaskPersistence: Send + Sync + 'static {
    async fn load(&self) -> Result<HashMap<String, TaskLogEntry>, PersistenceError>;

    async fn save(&self, entries: &HashMap<String, TaskLogEntry>) -> Result<(), PersistenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_payload_names_the_task_type_field_type() {
        let payload = CallbackPayload {
            task_id: "t-1".into(),
            task_type: TaskType::LyricsGeneration,
            status: TaskStatus::Failed,
            result: None,
            error: Some("boom".into()),
            completed_at: Utc::now(),
        };

        let body = serde_json::to_value(&payload).unwrap();
        assert_eq!(body["type"], "lyrics_generation");
        assert!(body.get("taskType").is_none());
        assert!(body.get("result").is_none());
        assert_eq!(body["error"], "boom");
        assert!(body.get("completedAt").is_some());
    }
}
