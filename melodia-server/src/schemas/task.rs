use melodia_core::{Task, TaskStatus};
use serde::Serialize;
use utoipa::ToSchema;

/// Returned by every submission endpoint with HTTP 202.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskAccepted {
    /// Poll `GET /api/music/task/{taskId}` with this id.
    pub task_id: String,
    #[schema(value_type = String, example = "pending")]
    pub status: TaskStatus,
    pub progress: u8,
}

impl From<&Task> for TaskAccepted {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id.to_string(),
            status: task.status,
            progress: task.progress,
        }
    }
}
