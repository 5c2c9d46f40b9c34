//! Per-task state machine: submit → poll → upload → complete.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use tracing::{info, warn};

use crate::runtime::backend::protocol::{CallbackPayload, ProviderError};
use crate::runtime::polling::poll_until_terminal;
use crate::runtime::scheduler::{Collaborators, SchedulerConfig};
use crate::runtime::status::PollTarget;
use crate::runtime::storage::TaskWriter;
use crate::runtime::types::{
    PROGRESS_CEILING, RuntimeError, StoredClip, Task, TaskResult, TaskType,
};

/// Progress once the provider accepted the task.
pub const PROGRESS_SUBMITTED: u8 = 30;
/// Progress once polling is over and artifacts are being stored.
pub const PROGRESS_POLLED: u8 = 70;
const UPLOAD_PROGRESS_SPAN: usize = 30;

/// Extension given to stored media artifacts.
const MEDIA_EXTENSION: &str = ".mp3";

/// `70 + floor(uploaded / total * 30)`, capped below completion.
pub fn upload_progress(uploaded: usize, total: usize) -> u8 {
    if total == 0 {
        return PROGRESS_POLLED;
    }
    let gained = uploaded.min(total) * UPLOAD_PROGRESS_SPAN / total;
    (usize::from(PROGRESS_POLLED) + gained).min(usize::from(PROGRESS_CEILING)) as u8
}

#[derive(Clone)]
pub struct Pipeline {
    config: Arc<SchedulerConfig>,
    deps: Collaborators,
}

impl Pipeline {
    pub fn new(config: Arc<SchedulerConfig>, deps: Collaborators) -> Self {
        Self { config, deps }
    }

    /// Drive `task` to a terminal state and return the final snapshot.
    ///
    /// Every failure, including a panic or the end-to-end deadline expiring,
    /// ends up as a Failed task. `None` means the task was deleted meanwhile.
    pub async fn execute(&self, task: &Task, writer: &TaskWriter) -> Option<Task> {
        let deadline = self.config.task_timeout;
        let run = AssertUnwindSafe(self.run(task, writer)).catch_unwind();

        let outcome = match tokio::time::timeout(deadline, run).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(panic)) => Err(RuntimeError::Panicked(panic_message(panic.as_ref()))),
            Err(_) => Err(RuntimeError::TaskTimeout {
                seconds: deadline.as_secs(),
            }),
        };

        match outcome {
            Ok(result) => {
                info!(task_id = %task.id, task_type = %task.task_type, "task completed");
                writer.complete(result).await
            }
            Err(e) => {
                warn!(task_id = %task.id, task_type = %task.task_type, error = %e, "task failed");
                writer.fail(e.to_string()).await
            }
        }
    }

    async fn run(&self, task: &Task, writer: &TaskWriter) -> Result<TaskResult, RuntimeError> {
        writer.begin().await;

        let provider_callback = self.internal_callback_url(task.task_type);
        let external_task_id = self
            .deps
            .provider
            .submit(task.task_type, &task.input, provider_callback.as_deref())
            .await?;
        if external_task_id.trim().is_empty() {
            return Err(ProviderError::InvalidResponse(
                "provider accepted the request without a task id".into(),
            )
            .into());
        }
        writer
            .assign_external_id(&external_task_id, PROGRESS_SUBMITTED)
            .await;
        info!(task_id = %task.id, %external_task_id, "submitted to provider");

        match task.task_type.poll_target() {
            PollTarget::Lyrics => self.collect_lyrics(external_task_id, writer).await,
            PollTarget::Media => self.collect_media(external_task_id, writer).await,
        }
    }

    async fn collect_lyrics(
        &self,
        external_task_id: String,
        writer: &TaskWriter,
    ) -> Result<TaskResult, RuntimeError> {
        let provider = &self.deps.provider;
        let ext_id = external_task_id.as_str();
        let status = poll_until_terminal(
            self.config.lyrics_poll,
            PollTarget::Lyrics,
            ext_id,
            writer,
            || provider.poll_lyrics(ext_id),
        )
        .await?;

        Ok(TaskResult::Lyrics {
            lyrics: status.text.unwrap_or_default(),
            title: status.title.unwrap_or_default(),
            external_task_id,
        })
    }

    async fn collect_media(
        &self,
        external_task_id: String,
        writer: &TaskWriter,
    ) -> Result<TaskResult, RuntimeError> {
        let provider = &self.deps.provider;
        let ext_id = external_task_id.as_str();
        let status = poll_until_terminal(
            self.config.media_poll,
            PollTarget::Media,
            ext_id,
            writer,
            || provider.poll_status(ext_id),
        )
        .await?;
        writer.advance(PROGRESS_POLLED).await;

        let artifacts: Vec<_> = status
            .artifacts
            .into_iter()
            .filter_map(|artifact| {
                let url = artifact.audio_url.clone().filter(|url| !url.is_empty())?;
                Some((url, artifact))
            })
            .collect();
        let total = artifacts.len();

        let mut clips = Vec::with_capacity(total);
        for (index, (url, artifact)) in artifacts.into_iter().enumerate() {
            let key = self
                .deps
                .uploader
                .upload_from_url(&url, MEDIA_EXTENSION)
                .await?;
            info!(task_id = %writer.id(), %external_task_id, storage_key = %key, "stored artifact");
            clips.push(StoredClip::from_artifact(artifact, key));
            writer.advance(upload_progress(index + 1, total)).await;
        }

        Ok(TaskResult::Media {
            clips,
            external_task_id,
        })
    }

    fn internal_callback_url(&self, task_type: TaskType) -> Option<String> {
        let base = self.config.internal_callback_base.as_deref()?;
        let route = match task_type.poll_target() {
            PollTarget::Lyrics => "lyrics-internal",
            PollTarget::Media => "music-internal",
        };
        Some(format!("{}/api/callback/{route}", base.trim_end_matches('/')))
    }

    /// Tell the caller about a terminal task, if it asked to be told.
    pub async fn notify(&self, task: &Task) {
        let Some(url) = task.callback_url.as_deref() else {
            return;
        };
        let payload = CallbackPayload {
            task_id: task.id.to_string(),
            task_type: task.task_type,
            status: task.status,
            result: task.result.clone(),
            error: task.error.clone(),
            completed_at: Utc::now(),
        };
        self.deps.notifier.deliver(url, &payload).await;
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
