//! melodia-core: task queue, scheduler and pipeline for asynchronous music
//! and lyrics generation.
//!
//! [`Scheduler`] admits tasks, runs each through the submit → poll → upload
//! pipeline under a bounded worker pool and keeps their state queryable until
//! the cleanup sweep retires them. The provider, object storage, callback
//! delivery and journal are reached through the traits in
//! [`runtime::backend::protocol`]; [`services`] holds the HTTP and file
//! implementations used in production.

pub mod runtime;
pub mod services;

pub use runtime::backend::protocol::{
    CallbackNotifier, CallbackPayload, GenerationStatus, LoggedStatus, LyricsStatus,
    MediaArtifact, ObjectUploader, PersistenceError, ProviderClient, ProviderError,
    TaskLogEntry, TaskPersistence, UploadError,
};
pub use runtime::cleanup::CleanupSweeper;
pub use runtime::polling::PollPolicy;
pub use runtime::scheduler::{Collaborators, Scheduler, SchedulerConfig};
pub use runtime::status::{PollTarget, ProviderStatus};
pub use runtime::types::{
    RuntimeError, SchedulerStats, StoredClip, Task, TaskId, TaskResult, TaskStatus, TaskType,
};
