use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use thiserror::Error;
use uuid::Uuid;

use crate::runtime::backend::protocol::{MediaArtifact, ProviderError, UploadError};
use crate::runtime::status::PollTarget;

/// Unique identifier for a task admitted by the [`Scheduler`].
///
/// Assigned once at admission and never reused.
///
/// [`Scheduler`]: crate::runtime::scheduler::Scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Kind of generation work a task performs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TaskType {
    MusicGeneration,
    LyricsGeneration,
    AddVocals,
    AddInstrumental,
    #[serde(rename = "music_extend")]
    #[strum(serialize = "music_extend")]
    Extend,
}

impl TaskType {
    /// Which terminal rules and result shape apply while polling the provider.
    pub fn poll_target(self) -> PollTarget {
        match self {
            TaskType::LyricsGeneration => PollTarget::Lyrics,
            TaskType::MusicGeneration
            | TaskType::AddVocals
            | TaskType::AddInstrumental
            | TaskType::Extend => PollTarget::Media,
        }
    }
}

/// Coarse lifecycle state exposed to callers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// A generated clip after its audio has been persisted to object storage.
///
/// `metadata` carries the provider's clip fields minus every raw audio URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredClip {
    #[serde(rename = "fileName")]
    pub file_name: String,
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl StoredClip {
    /// Replace the artifact's ephemeral links with the storage key.
    pub fn from_artifact(artifact: MediaArtifact, file_name: String) -> Self {
        let mut metadata = artifact.fields;
        metadata.retain(|key, _| !is_ephemeral_media_key(key));
        Self {
            file_name,
            metadata,
        }
    }
}

/// Provider-hosted audio links (`audioUrl`, `streamAudioUrl`, `sourceAudioUrl`, ...)
/// expire and may be signed; they never leave the pipeline.
fn is_ephemeral_media_key(key: &str) -> bool {
    key.to_ascii_lowercase().ends_with("audiourl")
}

/// Success payload of a completed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TaskResult {
    Media {
        clips: Vec<StoredClip>,
        #[serde(rename = "externalTaskId")]
        external_task_id: String,
    },
    Lyrics {
        lyrics: String,
        title: String,
        #[serde(rename = "externalTaskId")]
        external_task_id: String,
    },
}

/// The unit of work tracked end-to-end by the scheduler.
///
/// Values handed out by the scheduler are snapshots; only the pipeline that
/// owns a task mutates the stored copy, through the transition methods below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub progress: u8,
    pub input: serde_json::Value,
    pub external_task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub callback_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Progress reported as soon as a pipeline picks the task up.
pub const PROGRESS_STARTED: u8 = 10;
/// Highest progress a task may report before it completes.
pub const PROGRESS_CEILING: u8 = 99;
pub const PROGRESS_DONE: u8 = 100;

impl Task {
    pub fn new(
        task_type: TaskType,
        input: serde_json::Value,
        callback_url: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            task_type,
            status: TaskStatus::Pending,
            progress: 0,
            input,
            external_task_id: None,
            result: None,
            error: None,
            callback_url,
            created_at: now,
            updated_at: now,
        }
    }

    /// Pending -> Processing.
    pub(crate) fn begin(&mut self) -> bool {
        if self.status != TaskStatus::Pending {
            return false;
        }
        self.status = TaskStatus::Processing;
        self.progress = PROGRESS_STARTED;
        self.touch();
        true
    }

    /// Raise progress while Processing. Lower values are ignored.
    pub(crate) fn advance(&mut self, progress: u8) -> bool {
        let progress = progress.min(PROGRESS_CEILING);
        if self.status != TaskStatus::Processing || progress <= self.progress {
            return false;
        }
        self.progress = progress;
        self.touch();
        true
    }

    pub(crate) fn assign_external_id(&mut self, external_task_id: &str, progress: u8) -> bool {
        if self.status != TaskStatus::Processing {
            return false;
        }
        self.external_task_id = Some(external_task_id.to_owned());
        self.progress = self.progress.max(progress.min(PROGRESS_CEILING));
        self.touch();
        true
    }

    pub(crate) fn complete(&mut self, result: TaskResult) -> bool {
        if self.status != TaskStatus::Processing {
            return false;
        }
        self.status = TaskStatus::Completed;
        self.progress = PROGRESS_DONE;
        self.result = Some(result);
        self.error = None;
        self.touch();
        true
    }

    /// Any non-terminal state -> Failed. Progress resets to 0 so a stale
    /// value is never read as partial success.
    pub(crate) fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TaskStatus::Failed;
        self.progress = 0;
        self.result = None;
        self.error = Some(error.into());
        self.touch();
        true
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Counters returned by [`Scheduler::stats`].
///
/// [`Scheduler::stats`]: crate::runtime::scheduler::Scheduler::stats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    /// Admitted tasks still waiting for a concurrency slot.
    pub queued: usize,
    /// Tasks currently holding a concurrency slot.
    pub in_flight: usize,
}

/// Errors produced by the runtime layer.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Admission refused: queued plus in-flight tasks reached the limit.
    #[error("queue full: {current} tasks queued or running (capacity {capacity})")]
    QueueFull { current: usize, capacity: usize },

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// The provider rejected a call or answered with something unusable.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// The provider reported the generation itself as failed.
    #[error("provider task {external_task_id} failed: {message}")]
    ProviderTaskFailed {
        external_task_id: String,
        message: String,
    },

    /// No terminal provider status within the polling budget.
    #[error("poll timeout: no terminal status after {attempts} attempts for provider task {external_task_id}")]
    PollTimeout {
        external_task_id: String,
        attempts: u32,
    },

    #[error(transparent)]
    Upload(#[from] UploadError),

    /// The end-to-end deadline of a pipeline expired.
    #[error("task timeout after {seconds}s")]
    TaskTimeout { seconds: u64 },

    #[error("pipeline panicked: {0}")]
    Panicked(String),

    #[error("scheduler is shutting down")]
    ShuttingDown,
}
