//! Router harness for route tests: in-memory collaborators and request helpers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use melodia_core::{
    CallbackNotifier, CallbackPayload, Collaborators, GenerationStatus, LyricsStatus,
    ObjectUploader, PollTarget, ProviderClient, ProviderError, ProviderStatus, Scheduler,
    TaskType, UploadError,
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use crate::config::Config;
use crate::state::AppState;

/// Accepts every submission and never finishes it.
struct StubProvider;

#[async_trait]
impl ProviderClient for StubProvider {
    async fn submit(
        &self,
        _task_type: TaskType,
        _input: &Value,
        _callback_url: Option<&str>,
    ) -> Result<String, ProviderError> {
        Ok("ext-1".into())
    }

    async fn poll_status(&self, _external_task_id: &str) -> Result<GenerationStatus, ProviderError> {
        Ok(GenerationStatus {
            status: ProviderStatus::Pending,
            raw_status: "PENDING".into(),
            artifacts: Vec::new(),
            error_message: None,
        })
    }

    async fn poll_lyrics(&self, _external_task_id: &str) -> Result<LyricsStatus, ProviderError> {
        Ok(LyricsStatus {
            status: ProviderStatus::Pending,
            raw_status: "PENDING".into(),
            text: None,
            title: None,
            error_message: None,
        })
    }

    async fn raw_record(&self, target: PollTarget, external_task_id: &str) -> Result<Value, ProviderError> {
        if external_task_id == "missing" {
            return Err(ProviderError::Rejected {
                code: 404,
                message: "record not found".into(),
            });
        }
        let record = match target {
            PollTarget::Media => "generation",
            PollTarget::Lyrics => "lyrics",
        };
        Ok(json!({ "taskId": external_task_id, "record": record }))
    }
}

struct StubUploader;

#[async_trait]
impl ObjectUploader for StubUploader {
    async fn upload_from_url(&self, _url: &str, extension: &str) -> Result<String, UploadError> {
        Ok(format!("stub{extension}"))
    }
}

struct SilentNotifier;

#[async_trait]
impl CallbackNotifier for SilentNotifier {
    async fn deliver(&self, _url: &str, _payload: &CallbackPayload) {}
}

pub(crate) struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    _uploads: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_env(&[])
    }

    /// Build the app from the given environment on top of the test defaults:
    /// a temporary upload directory, `http://melodia.test` as public base and
    /// Swagger off.
    pub fn with_env(pairs: &[(&str, &str)]) -> Self {
        let uploads = tempfile::tempdir().unwrap();
        let mut vars: HashMap<String, String> = HashMap::from([
            (
                "MELODIA_UPLOAD_DIR".to_owned(),
                uploads.path().to_string_lossy().into_owned(),
            ),
            ("MELODIA_PUBLIC_BASE_URL".to_owned(), "http://melodia.test".to_owned()),
            ("MELODIA_ENABLE_SWAGGER".to_owned(), "false".to_owned()),
        ]);
        vars.extend(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        let config = Config::from_lookup(|key| vars.get(key).cloned());

        let provider: Arc<dyn ProviderClient> = Arc::new(StubProvider);
        let scheduler = Scheduler::new(
            config.scheduler_config(),
            Collaborators {
                provider: Arc::clone(&provider),
                uploader: Arc::new(StubUploader),
                notifier: Arc::new(SilentNotifier),
                persistence: None,
            },
        );
        let state = Arc::new(AppState {
            config: Arc::new(config),
            scheduler,
            provider,
            started_at: Instant::now(),
        });

        Self {
            router: super::build(Arc::clone(&state)),
            state,
            _uploads: uploads,
        }
    }

    /// Send a request and decode the JSON body (`Null` when there is none).
    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.post_raw(uri, body.to_string()).await
    }

    pub async fn post_raw(&self, uri: &str, body: impl Into<Body>) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
                .unwrap(),
        )
        .await
    }
}
