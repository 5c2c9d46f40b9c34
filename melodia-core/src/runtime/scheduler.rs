use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::runtime::backend::admission::{AdmissionController, Ticket};
use crate::runtime::backend::protocol::{
    CallbackNotifier, ObjectUploader, PersistenceError, ProviderClient, TaskLogEntry,
    TaskPersistence,
};
use crate::runtime::cleanup::CleanupSweeper;
use crate::runtime::pipeline::Pipeline;
use crate::runtime::polling::PollPolicy;
use crate::runtime::storage::{TaskRegistry, TaskWriter};
use crate::runtime::types::{RuntimeError, SchedulerStats, Task, TaskId, TaskType};

/// Tunables for a [`Scheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pipelines allowed to run at the same time.
    pub max_concurrency: usize,
    /// Queued plus running tasks accepted before admission is refused.
    pub max_queue_size: usize,
    /// End-to-end deadline for one pipeline.
    pub task_timeout: Duration,
    pub media_poll: PollPolicy,
    pub lyrics_poll: PollPolicy,
    /// How long a terminal task stays queryable.
    pub retention: Duration,
    pub cleanup_interval: Duration,
    /// Public base URL the provider can push its own notifications to.
    pub internal_callback_base: Option<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            max_queue_size: 2500,
            task_timeout: Duration::from_secs(600),
            media_poll: PollPolicy::new(Duration::from_secs(5), 120),
            lyrics_poll: PollPolicy::new(Duration::from_secs(5), 60),
            retention: Duration::from_secs(300),
            cleanup_interval: Duration::from_secs(60),
            internal_callback_base: None,
        }
    }
}

/// External services a pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub provider: Arc<dyn ProviderClient>,
    pub uploader: Arc<dyn ObjectUploader>,
    pub notifier: Arc<dyn CallbackNotifier>,
    pub persistence: Option<Arc<dyn TaskPersistence>>,
}

/// Tracks abort handles of spawned pipelines, keyed by task ID.
struct PipelineHandles {
    handles: std::sync::Mutex<HashMap<TaskId, AbortHandle>>,
}

impl PipelineHandles {
    fn new() -> Self {
        Self {
            handles: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Abort and forget a pipeline. Returns `true` if it was tracked.
    fn cancel(&self, id: &TaskId) -> bool {
        if let Ok(mut map) = self.handles.lock() {
            if let Some(handle) = map.remove(id) {
                handle.abort();
                return true;
            }
        }
        false
    }

    fn remove(&self, id: &TaskId) {
        if let Ok(mut map) = self.handles.lock() {
            map.remove(id);
        }
    }

    fn abort_all(&self) -> usize {
        match self.handles.lock() {
            Ok(mut map) => {
                let count = map.len();
                for (_, handle) in map.drain() {
                    handle.abort();
                }
                count
            }
            Err(_) => 0,
        }
    }

    /// Drop handles whose pipeline already ended without deregistering.
    fn prune_finished(&self) {
        if let Ok(mut map) = self.handles.lock() {
            map.retain(|_, handle| !handle.is_finished());
        }
    }
}

struct SchedulerInner {
    config: Arc<SchedulerConfig>,
    registry: TaskRegistry,
    admission: AdmissionController,
    pipeline: Pipeline,
    handles: PipelineHandles,
}

/// Admits generation tasks and runs them under a bounded worker pool.
///
/// Cheap to clone; every clone drives the same queue and task store.
///
/// # Usage
///
/// ```rust,ignore
/// let scheduler = Scheduler::new(SchedulerConfig::default(), collaborators);
/// let task = scheduler.submit(TaskType::LyricsGeneration, json!({"prompt": "rain"}), None).await?;
/// let snapshot = scheduler.get(&task.id).await;
/// ```
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.inner.config)
            .field("queued", &self.inner.admission.queued())
            .field("in_flight", &self.inner.admission.in_flight())
            .finish()
    }
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, deps: Collaborators) -> Self {
        let config = Arc::new(config);
        let registry = TaskRegistry::new(deps.persistence.clone());
        let admission = AdmissionController::new(config.max_concurrency, config.max_queue_size);
        let pipeline = Pipeline::new(Arc::clone(&config), deps);
        Self {
            inner: Arc::new(SchedulerInner {
                config,
                registry,
                admission,
                pipeline,
                handles: PipelineHandles::new(),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Admit a task and schedule its pipeline.
    ///
    /// Returns the Pending snapshot immediately; the pipeline starts once a
    /// concurrency slot frees up, in admission order.
    pub async fn submit(
        &self,
        task_type: TaskType,
        input: serde_json::Value,
        callback_url: Option<String>,
    ) -> Result<Task, RuntimeError> {
        if self.inner.admission.is_closed() {
            return Err(RuntimeError::ShuttingDown);
        }
        let ticket = self.inner.admission.try_admit()?;

        let task = Task::new(task_type, input, callback_url);
        let id = task.id;
        self.inner.registry.insert(task.clone()).await;

        {
            // Held across spawn so the pipeline cannot deregister before it
            // is registered.
            let mut handles = self
                .inner
                .handles
                .handles
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let inner = Arc::clone(&self.inner);
            let join = tokio::spawn(async move { inner.drive(id, ticket).await });
            handles.insert(id, join.abort_handle());
        }

        info!(task_id = %id, %task_type, "task admitted");
        Ok(task)
    }

    /// Snapshot of a task.
    pub async fn get(&self, id: &TaskId) -> Option<Task> {
        self.inner.registry.get(id).await
    }

    /// Snapshots of every tracked task, newest first.
    pub async fn list(&self) -> Vec<Task> {
        self.inner.registry.list().await
    }

    /// Forget a task, aborting its pipeline if it is still running.
    pub async fn delete(&self, id: &TaskId) -> bool {
        if self.inner.handles.cancel(id) {
            debug!(task_id = %id, "aborted running pipeline");
        }
        let removed = self.inner.registry.remove(id).await.is_some();
        if removed {
            info!(task_id = %id, "task deleted");
        }
        removed
    }

    pub async fn stats(&self) -> SchedulerStats {
        let mut stats = self.inner.registry.counts().await;
        stats.queued = self.inner.admission.queued();
        stats.in_flight = self.inner.admission.in_flight();
        stats
    }

    /// One cleanup pass against the wall clock.
    pub async fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Utc::now()).await
    }

    /// One cleanup pass as if the current time were `now`.
    pub async fn sweep_expired_at(&self, now: DateTime<Utc>) -> usize {
        self.inner.handles.prune_finished();
        let removed = self
            .inner
            .registry
            .sweep_expired(now, self.inner.config.retention)
            .await;
        if removed > 0 {
            info!(removed, "swept expired tasks");
        }
        removed
    }

    /// Start the periodic cleanup sweep.
    pub fn start_cleanup(&self) -> CleanupSweeper {
        CleanupSweeper::spawn(self.clone(), self.inner.config.cleanup_interval)
    }

    /// Durable task journal, most recently updated first.
    pub async fn journal(&self) -> Vec<TaskLogEntry> {
        self.inner.registry.journal_entries().await
    }

    /// Load the journal a previous process left behind.
    pub async fn restore_journal(&self) -> Result<usize, PersistenceError> {
        let interrupted = self.inner.registry.restore_journal().await?;
        if interrupted > 0 {
            warn!(interrupted, "tasks from a previous run were interrupted");
        }
        Ok(interrupted)
    }

    /// Refuse new work, abort running pipelines and record unfinished tasks
    /// as interrupted.
    pub async fn shutdown(&self) {
        self.inner.admission.close();
        let aborted = self.inner.handles.abort_all();
        let interrupted = self.inner.registry.interrupt_unfinished().await;
        info!(aborted, interrupted, "scheduler shut down");
    }
}

impl SchedulerInner {
    async fn drive(self: Arc<Self>, id: TaskId, ticket: Ticket) {
        let slot = match self.admission.acquire_slot().await {
            Ok(slot) => slot,
            Err(e) => {
                self.registry.update(&id, |task| task.fail(e.to_string())).await;
                self.handles.remove(&id);
                return;
            }
        };

        let Some(task) = self.registry.get(&id).await else {
            debug!(task_id = %id, "task deleted before it started");
            self.handles.remove(&id);
            return;
        };

        let writer = TaskWriter::new(self.registry.clone(), id);
        let finished = self.pipeline.execute(&task, &writer).await;

        drop(slot);
        drop(ticket);
        self.handles.remove(&id);

        if let Some(task) = finished {
            self.pipeline.notify(&task).await;
        }
    }
}
