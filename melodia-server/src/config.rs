//! Server configuration, loaded from environment variables at startup.

use std::path::PathBuf;
use std::time::Duration;

use melodia_core::services::suno::DEFAULT_BASE_URL;
use melodia_core::SchedulerConfig;

const DEFAULT_SIGNED_URL_API: &str = "https://ai.mediaio.net/api/v1/ai/signed-upload-url";

/// Runtime configuration for melodia-server.
///
/// Everything except the Suno API key has a default, so a bare
/// `MELODIA_SUNO_API_KEY=... melodia-server` is enough to start.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:3001"`).
    pub bind_address: String,

    /// Externally reachable base URL of this server, e.g.
    /// `https://music.example.com`. Used for the provider's push callbacks
    /// and for the public URLs of uploaded files. Without it the provider is
    /// not given a callback target and upload URLs are relative.
    pub public_base_url: Option<String>,

    pub suno_api_key: String,
    pub suno_api_base_url: String,

    pub max_concurrency: usize,
    pub max_queue_size: usize,
    pub task_timeout: Duration,

    /// Per-attempt timeout for outbound task-completion callbacks.
    pub callback_timeout: Duration,

    /// Endpoint handing out signed object-storage upload URLs.
    pub oss_signed_url_api: String,
    pub oss_upload_timeout: Duration,

    /// Holds the task journal (`tasks.json`).
    pub data_dir: PathBuf,
    /// User uploads, served under `/uploads`.
    pub upload_dir: PathBuf,
    /// Staging area for artifacts on their way to object storage.
    pub temp_dir: PathBuf,
    pub log_dir: PathBuf,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit console log records as newline-delimited JSON.
    pub log_json: bool,

    /// Comma-separated list of allowed CORS origins; any origin when unset.
    pub cors_allowed_origins: Option<String>,

    pub enable_swagger: bool,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build [`Config`] from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env = Env(lookup);
        Self {
            bind_address: env.or("MELODIA_BIND", "0.0.0.0:3001"),
            public_base_url: env
                .non_empty("MELODIA_PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_owned()),
            suno_api_key: env.or("MELODIA_SUNO_API_KEY", ""),
            suno_api_base_url: env.or("MELODIA_SUNO_API_BASE_URL", DEFAULT_BASE_URL),
            max_concurrency: env.parse("MELODIA_MAX_CONCURRENCY", 10),
            max_queue_size: env.parse("MELODIA_MAX_QUEUE_SIZE", 2500),
            task_timeout: Duration::from_secs(env.parse("MELODIA_TASK_TIMEOUT_SECS", 600)),
            callback_timeout: Duration::from_millis(env.parse("MELODIA_CALLBACK_TIMEOUT_MS", 10_000)),
            oss_signed_url_api: env.or("MELODIA_OSS_SIGNED_URL_API", DEFAULT_SIGNED_URL_API),
            oss_upload_timeout: Duration::from_millis(env.parse("MELODIA_OSS_UPLOAD_TIMEOUT_MS", 60_000)),
            data_dir: env.or("MELODIA_DATA_DIR", "./data").into(),
            upload_dir: env.or("MELODIA_UPLOAD_DIR", "./uploads").into(),
            temp_dir: env.or("MELODIA_TEMP_DIR", "./temp_audio").into(),
            log_dir: env.or("MELODIA_LOG_DIR", "./logs").into(),
            log_level: env.or("MELODIA_LOG", "info"),
            log_json: env.flag("MELODIA_LOG_JSON", false),
            cors_allowed_origins: env.non_empty("MELODIA_CORS_ORIGINS"),
            enable_swagger: env.flag("MELODIA_ENABLE_SWAGGER", true),
        }
    }

    /// Scheduler settings; polling and retention keep their built-in values.
    pub fn scheduler_config(&self) -> SchedulerConfig {
        let defaults = SchedulerConfig::default();
        SchedulerConfig {
            max_concurrency: self.max_concurrency,
            max_queue_size: self.max_queue_size,
            task_timeout: self.task_timeout,
            internal_callback_base: self.public_base_url.clone(),
            ..defaults
        }
    }

    /// Public URL of a file stored in the upload directory.
    pub fn upload_url(&self, file_name: &str) -> String {
        match &self.public_base_url {
            Some(base) => format!("{base}/uploads/{file_name}"),
            None => format!("/uploads/{file_name}"),
        }
    }

    /// Location of the task journal.
    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("tasks.json")
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn or(&self, key: &str, default: &str) -> String {
        (self.0)(key).unwrap_or_else(|| default.to_owned())
    }

    fn non_empty(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        (self.0)(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        (self.0)(key)
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_without_environment() {
        let cfg = config_from(&[]);
        assert_eq!(cfg.bind_address, "0.0.0.0:3001");
        assert_eq!(cfg.max_concurrency, 10);
        assert_eq!(cfg.max_queue_size, 2500);
        assert_eq!(cfg.task_timeout, Duration::from_secs(600));
        assert_eq!(cfg.callback_timeout, Duration::from_secs(10));
        assert_eq!(cfg.suno_api_base_url, DEFAULT_BASE_URL);
        assert!(cfg.public_base_url.is_none());
        assert!(cfg.enable_swagger);
        assert!(!cfg.log_json);
        assert_eq!(cfg.journal_path(), PathBuf::from("./data").join("tasks.json"));
    }

    #[test]
    fn malformed_numbers_fall_back_to_defaults() {
        let cfg = config_from(&[
            ("MELODIA_MAX_CONCURRENCY", "lots"),
            ("MELODIA_MAX_QUEUE_SIZE", " 50 "),
        ]);
        assert_eq!(cfg.max_concurrency, 10);
        assert_eq!(cfg.max_queue_size, 50);
    }

    #[test]
    fn scheduler_config_carries_public_base() {
        let cfg = config_from(&[
            ("MELODIA_PUBLIC_BASE_URL", "https://music.example.com/"),
            ("MELODIA_MAX_CONCURRENCY", "3"),
            ("MELODIA_TASK_TIMEOUT_SECS", "30"),
        ]);
        let scheduler = cfg.scheduler_config();
        assert_eq!(scheduler.max_concurrency, 3);
        assert_eq!(scheduler.task_timeout, Duration::from_secs(30));
        assert_eq!(
            scheduler.internal_callback_base.as_deref(),
            Some("https://music.example.com")
        );
        assert_eq!(scheduler.media_poll.max_attempts, 120);
    }

    #[test]
    fn upload_urls_follow_public_base() {
        assert_eq!(config_from(&[]).upload_url("a.mp3"), "/uploads/a.mp3");
        let cfg = config_from(&[("MELODIA_PUBLIC_BASE_URL", "http://host:3001")]);
        assert_eq!(cfg.upload_url("a.mp3"), "http://host:3001/uploads/a.mp3");
    }

    #[test]
    fn flags_accept_one_or_true() {
        let cfg = config_from(&[
            ("MELODIA_LOG_JSON", "TRUE"),
            ("MELODIA_ENABLE_SWAGGER", "0"),
        ]);
        assert!(cfg.log_json);
        assert!(!cfg.enable_swagger);
    }
}
