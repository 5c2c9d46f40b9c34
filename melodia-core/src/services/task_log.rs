use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::runtime::backend::protocol::{PersistenceError, TaskLogEntry, TaskPersistence};

/// Task journal stored as one pretty-printed JSON object keyed by task id.
///
/// Writes go to a sibling temp file first and are renamed into place, so a
/// crash mid-write never leaves a truncated journal behind.
#[derive(Debug, Clone)]
pub struct JsonTaskLog {
    path: PathBuf,
}

impl JsonTaskLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn sibling_path(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "tasks.json".into());
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn staging_path(&self) -> PathBuf {
        self.sibling_path(".tmp")
    }

    /// Move an unparseable journal aside so later saves start a fresh file.
    async fn preserve_corrupt(&self, source: serde_json::Error) -> PersistenceError {
        let preserved = self.sibling_path(&format!(".corrupt-{}", Utc::now().timestamp()));
        if let Err(e) = tokio::fs::rename(&self.path, &preserved).await {
            return PersistenceError::Io(e);
        }
        warn!(
            path = %self.path.display(),
            preserved = %preserved.display(),
            error = %source,
            "task journal is corrupt; moved aside"
        );
        PersistenceError::Corrupt { preserved, source }
    }

    async fn write(&self, entries: &HashMap<String, TaskLogEntry>) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec_pretty(entries)?;
        let staging = self.staging_path();
        tokio::fs::write(&staging, json).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl TaskPersistence for JsonTaskLog {
    async fn load(&self) -> Result<HashMap<String, TaskLogEntry>, PersistenceError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let entries: HashMap<String, TaskLogEntry> = match serde_json::from_slice(&bytes) {
                    Ok(entries) => entries,
                    Err(e) => return Err(self.preserve_corrupt(e).await),
                };
                info!(path = %self.path.display(), count = entries.len(), "loaded task journal");
                Ok(entries)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no task journal yet; creating one");
                let entries = HashMap::new();
                self.write(&entries).await?;
                Ok(entries)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, entries: &HashMap<String, TaskLogEntry>) -> Result<(), PersistenceError> {
        self.write(entries).await?;
        debug!(path = %self.path.display(), count = entries.len(), "saved task journal");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::backend::protocol::LoggedStatus;
    use crate::runtime::types::TaskType;
    use chrono::Utc;

    fn entry(id: &str, status: LoggedStatus) -> TaskLogEntry {
        let now = Utc::now();
        TaskLogEntry {
            task_id: id.into(),
            task_type: TaskType::Extend,
            status,
            external_task_id: Some("ext".into()),
            progress: 30,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn missing_file_loads_empty_and_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("tasks.json");
        let log = JsonTaskLog::new(&path);

        assert!(log.load().await.unwrap().is_empty());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn save_then_load_keeps_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        let log = JsonTaskLog::new(&path);

        let mut entries = HashMap::new();
        entries.insert("a".to_owned(), entry("a", LoggedStatus::Processing));
        log.save(&entries).await.unwrap();

        let loaded = log.load().await.unwrap();
        assert_eq!(loaded, entries);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"taskType\": \"music_extend\""), "{raw}");
        assert!(raw.contains("\"status\": \"processing\""), "{raw}");
        assert!(!dir.path().join("tasks.json.tmp").exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let log = JsonTaskLog::new(&path);

        let err = log.load().await.unwrap_err();
        let preserved = match err {
            PersistenceError::Corrupt { preserved, .. } => preserved,
            other => panic!("expected a corrupt journal error, got {other:?}"),
        };
        assert!(!path.exists());
        assert_eq!(std::fs::read(&preserved).unwrap(), b"{ not json");
        let name = preserved.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("tasks.json.corrupt-"), "{name}");

        log.save(&HashMap::new()).await.unwrap();
        assert_eq!(std::fs::read(&preserved).unwrap(), b"{ not json");
    }
}
