use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::runtime::backend::protocol::{
    LoggedStatus, PersistenceError, TaskLogEntry, TaskPersistence,
};
use crate::runtime::types::{SchedulerStats, Task, TaskId, TaskResult, TaskStatus};

/// Journal entries kept after their tasks were swept from memory.
const MAX_JOURNAL_ENTRIES: usize = 10_000;

/// Scheduler-owned task store.
///
/// Tasks live in a `tokio::sync::RwLock<HashMap>` so readers can take
/// snapshots while pipelines write. Every write is mirrored into a journal of
/// [`TaskLogEntry`] rows and, when a [`TaskPersistence`] is attached, flushed
/// to it. The journal mutex is always taken before the task lock, which keeps
/// flushes in mutation order.
#[derive(Clone)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<TaskId, Task>>>,
    journal: Arc<Journal>,
}

struct Journal {
    entries: Mutex<HashMap<String, TaskLogEntry>>,
    persistence: Option<Arc<dyn TaskPersistence>>,
}

impl Journal {
    async fn flush(&self, entries: &HashMap<String, TaskLogEntry>) {
        if let Some(persistence) = &self.persistence {
            if let Err(e) = persistence.save(entries).await {
                warn!(error = %e, "failed to persist task journal");
            }
        }
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("persistent", &self.journal.persistence.is_some())
            .finish()
    }
}

fn log_entry(task: &Task) -> TaskLogEntry {
    TaskLogEntry {
        task_id: task.id.to_string(),
        task_type: task.task_type,
        status: task.status.into(),
        external_task_id: task.external_task_id.clone(),
        progress: task.progress,
        error: task.error.clone(),
        created_at: task.created_at,
        updated_at: task.updated_at,
    }
}

impl TaskRegistry {
    pub fn new(persistence: Option<Arc<dyn TaskPersistence>>) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            journal: Arc::new(Journal {
                entries: Mutex::new(HashMap::new()),
                persistence,
            }),
        }
    }

    pub async fn insert(&self, task: Task) {
        let mut entries = self.journal.entries.lock().await;
        entries.insert(task.id.to_string(), log_entry(&task));
        self.tasks.write().await.insert(task.id, task);
        self.journal.flush(&entries).await;
    }

    /// Return a snapshot of the task.
    pub async fn get(&self, id: &TaskId) -> Option<Task> {
        self.tasks.read().await.get(id).cloned()
    }

    /// Snapshots of every task, newest first.
    pub async fn list(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }

    /// Apply `mutate` to the stored task.
    ///
    /// `mutate` reports whether it changed anything; only then is the journal
    /// updated and the new snapshot returned.
    pub async fn update<F>(&self, id: &TaskId, mutate: F) -> Option<Task>
    where
        F: FnOnce(&mut Task) -> bool + Send,
    {
        let mut entries = self.journal.entries.lock().await;
        let snapshot = {
            let mut tasks = self.tasks.write().await;
            let task = tasks.get_mut(id)?;
            if !mutate(task) {
                return None;
            }
            task.clone()
        };
        entries.insert(snapshot.id.to_string(), log_entry(&snapshot));
        self.journal.flush(&entries).await;
        Some(snapshot)
    }

    /// Remove a task from memory and from the journal.
    pub async fn remove(&self, id: &TaskId) -> Option<Task> {
        let mut entries = self.journal.entries.lock().await;
        let removed = self.tasks.write().await.remove(id)?;
        entries.remove(&id.to_string());
        self.journal.flush(&entries).await;
        Some(removed)
    }

    /// Drop terminal tasks whose last update is more than `retention` ago.
    ///
    /// Their journal rows stay behind as history, capped at the newest
    /// [`MAX_JOURNAL_ENTRIES`].
    pub async fn sweep_expired(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        let retention = TimeDelta::from_std(retention).unwrap_or(TimeDelta::MAX);
        let mut entries = self.journal.entries.lock().await;

        let removed = {
            let mut tasks = self.tasks.write().await;
            let before = tasks.len();
            tasks.retain(|_, task| {
                !(task.status.is_terminal() && now.signed_duration_since(task.updated_at) > retention)
            });
            before - tasks.len()
        };

        let pruned = prune_oldest(&mut entries, MAX_JOURNAL_ENTRIES);
        if pruned > 0 {
            debug!(pruned, "pruned task journal");
            self.journal.flush(&entries).await;
        }
        removed
    }

    /// Counts by status. Queue figures are filled in by the scheduler.
    pub async fn counts(&self) -> SchedulerStats {
        let tasks = self.tasks.read().await;
        let mut stats = SchedulerStats {
            total: tasks.len(),
            ..SchedulerStats::default()
        };
        for task in tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Processing => stats.processing += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Journal rows, most recently updated first.
    pub async fn journal_entries(&self) -> Vec<TaskLogEntry> {
        let mut rows: Vec<TaskLogEntry> =
            self.journal.entries.lock().await.values().cloned().collect();
        rows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        rows
    }

    /// Load the journal left by a previous process.
    ///
    /// Rows that were still pending or processing are rewritten as
    /// `interrupted`; their work is not resumed. Returns how many were.
    pub async fn restore_journal(&self) -> Result<usize, PersistenceError> {
        let Some(persistence) = &self.journal.persistence else {
            return Ok(0);
        };
        let mut loaded = persistence.load().await?;
        let interrupted = mark_interrupted(&mut loaded);

        let mut entries = self.journal.entries.lock().await;
        for (id, entry) in loaded {
            entries.entry(id).or_insert(entry);
        }
        persistence.save(&entries).await?;
        Ok(interrupted)
    }

    /// Record every unfinished journal row as interrupted.
    pub async fn interrupt_unfinished(&self) -> usize {
        let mut entries = self.journal.entries.lock().await;
        let interrupted = mark_interrupted(&mut entries);
        if interrupted > 0 {
            self.journal.flush(&entries).await;
        }
        interrupted
    }
}

fn mark_interrupted(entries: &mut HashMap<String, TaskLogEntry>) -> usize {
    let now = Utc::now();
    let mut count = 0;
    for entry in entries.values_mut().filter(|e| e.status.is_unfinished()) {
        entry.status = LoggedStatus::Interrupted;
        entry.updated_at = now;
        count += 1;
    }
    count
}

fn prune_oldest(entries: &mut HashMap<String, TaskLogEntry>, cap: usize) -> usize {
    if entries.len() <= cap {
        return 0;
    }
    let mut finished: Vec<(DateTime<Utc>, String)> = entries
        .iter()
        .filter(|(_, e)| !e.status.is_unfinished())
        .map(|(id, e)| (e.updated_at, id.clone()))
        .collect();
    finished.sort();

    let excess = entries.len() - cap;
    let mut pruned = 0;
    for (_, id) in finished.into_iter().take(excess) {
        entries.remove(&id);
        pruned += 1;
    }
    pruned
}

/// Write handle for one task, held by the pipeline that owns it.
///
/// Every method is a no-op once the task is terminal or has been deleted.
#[derive(Debug, Clone)]
pub struct TaskWriter {
    registry: TaskRegistry,
    id: TaskId,
}

impl TaskWriter {
    pub fn new(registry: TaskRegistry, id: TaskId) -> Self {
        Self { registry, id }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub async fn begin(&self) -> bool {
        self.registry.update(&self.id, Task::begin).await.is_some()
    }

    pub async fn advance(&self, progress: u8) -> bool {
        self.registry
            .update(&self.id, |task| task.advance(progress))
            .await
            .is_some()
    }

    pub async fn assign_external_id(&self, external_task_id: &str, progress: u8) -> bool {
        self.registry
            .update(&self.id, |task| task.assign_external_id(external_task_id, progress))
            .await
            .is_some()
    }

    pub async fn complete(&self, result: TaskResult) -> Option<Task> {
        self.registry
            .update(&self.id, move |task| task.complete(result))
            .await
    }

    pub async fn fail(&self, error: String) -> Option<Task> {
        self.registry
            .update(&self.id, move |task| task.fail(error))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::types::TaskType;
    use serde_json::json;

    fn lyrics_task() -> Task {
        Task::new(TaskType::LyricsGeneration, json!({ "prompt": "test" }), None)
    }

    #[tokio::test]
    async fn update_only_reports_real_changes() {
        let registry = TaskRegistry::new(None);
        let task = lyrics_task();
        let id = task.id;
        registry.insert(task).await;

        let writer = TaskWriter::new(registry.clone(), id);
        assert!(writer.begin().await);
        assert!(!writer.begin().await);
        assert!(writer.advance(40).await);
        assert!(!writer.advance(20).await);
        assert_eq!(registry.get(&id).await.unwrap().progress, 40);
    }

    #[tokio::test]
    async fn journal_mirrors_and_forgets_deleted_tasks() {
        let registry = TaskRegistry::new(None);
        let task = lyrics_task();
        let id = task.id;
        registry.insert(task).await;
        TaskWriter::new(registry.clone(), id).begin().await;

        let rows = registry.journal_entries().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, LoggedStatus::Processing);
        assert_eq!(rows[0].progress, 10);

        assert!(registry.remove(&id).await.is_some());
        assert!(registry.journal_entries().await.is_empty());
        assert!(registry.remove(&id).await.is_none());
    }

    #[tokio::test]
    async fn interrupt_marks_only_unfinished_rows() {
        let registry = TaskRegistry::new(None);
        let running = lyrics_task();
        let done = lyrics_task();
        let (running_id, done_id) = (running.id, done.id);
        registry.insert(running).await;
        registry.insert(done).await;

        let writer = TaskWriter::new(registry.clone(), done_id);
        writer.begin().await;
        writer.fail("boom".into()).await;

        assert_eq!(registry.interrupt_unfinished().await, 1);
        for row in registry.journal_entries().await {
            if row.task_id == running_id.to_string() {
                assert_eq!(row.status, LoggedStatus::Interrupted);
            } else {
                assert_eq!(row.status, LoggedStatus::Failed);
            }
        }
    }

    #[test]
    fn pruning_keeps_unfinished_rows() {
        let mut entries = HashMap::new();
        let base = Utc::now();
        for (i, status) in [
            LoggedStatus::Completed,
            LoggedStatus::Processing,
            LoggedStatus::Failed,
        ]
        .into_iter()
        .enumerate()
        {
            entries.insert(
                format!("t{i}"),
                TaskLogEntry {
                    task_id: format!("t{i}"),
                    task_type: TaskType::MusicGeneration,
                    status,
                    external_task_id: None,
                    progress: 0,
                    error: None,
                    created_at: base,
                    updated_at: base + TimeDelta::seconds(i as i64),
                },
            );
        }

        assert_eq!(prune_oldest(&mut entries, 1), 2);
        assert!(entries.contains_key("t1"));
    }
}
