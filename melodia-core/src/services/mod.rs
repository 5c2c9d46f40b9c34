//! Production collaborators: the Suno API client, object storage uploads,
//! callback delivery and the on-disk task journal.

pub mod callback;
pub mod oss;
pub mod suno;
pub mod task_log;

pub use callback::{CallbackConfig, HttpCallbackNotifier};
pub use oss::{OssConfig, OssUploader};
pub use suno::{SunoClient, SunoConfig};
pub use task_log::JsonTaskLog;
