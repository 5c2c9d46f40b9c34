//! HTTP client for the Suno generation API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::runtime::backend::protocol::{
    GenerationStatus, LyricsStatus, MediaArtifact, ProviderClient, ProviderError,
};
use crate::runtime::status::{PollTarget, ProviderStatus};
use crate::runtime::types::TaskType;

pub const DEFAULT_BASE_URL: &str = "https://api.sunoapi.org/api/v1";

/// Response code the API uses for success inside its envelope.
const CODE_OK: i64 = 200;

#[derive(Debug, Clone)]
pub struct SunoConfig {
    pub api_key: String,
    pub base_url: String,
    pub request_timeout: Duration,
}

impl SunoConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

impl Envelope {
    fn into_data(self) -> Result<Value, ProviderError> {
        if self.code != CODE_OK {
            return Err(ProviderError::Rejected {
                code: self.code,
                message: self.msg.unwrap_or_else(|| "request rejected".into()),
            });
        }
        Ok(self.data.unwrap_or(Value::Null))
    }
}

/// [`ProviderClient`] backed by the Suno REST API.
#[derive(Debug, Clone)]
pub struct SunoClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SunoClient {
    /// Fails with [`ProviderError::NotConfigured`] when no API key is set.
    pub fn new(config: SunoConfig) -> Result<Self, ProviderError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::NotConfigured(
                "a Suno API key is required".into(),
            ));
        }
        let client = Client::builder()
            .user_agent(concat!("melodia/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, ProviderError> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let envelope = serde_json::from_str::<Envelope>(&body);
        if !status.is_success() {
            let message = envelope
                .ok()
                .and_then(|e| e.msg)
                .unwrap_or_else(|| format!("HTTP {status}"));
            return Err(ProviderError::Rejected {
                code: i64::from(status.as_u16()),
                message,
            });
        }
        envelope
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?
            .into_data()
    }

    async fn record(&self, target: PollTarget, external_task_id: &str) -> Result<Value, ProviderError> {
        let path = match target {
            PollTarget::Media => "/generate/record-info",
            PollTarget::Lyrics => "/lyrics/record-info",
        };
        let url = Url::parse_with_params(&self.url(path), &[("taskId", external_task_id)])
            .map_err(|e| ProviderError::NotConfigured(format!("invalid base url: {e}")))?;
        self.send(self.client.get(url)).await
    }
}

/// API path that starts each kind of task.
pub fn submit_path(task_type: TaskType) -> &'static str {
    match task_type {
        TaskType::MusicGeneration => "/generate",
        TaskType::Extend => "/generate/extend",
        TaskType::AddVocals => "/generate/add-vocals",
        TaskType::AddInstrumental => "/generate/add-instrumental",
        TaskType::LyricsGeneration => "/lyrics",
    }
}

/// Body sent to [`submit_path`]: the request parameters plus the provider
/// callback target.
pub fn submit_body(input: &Value, callback_url: Option<&str>) -> Value {
    let mut body = match input {
        Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    if let Some(url) = callback_url {
        body.insert("callBackUrl".into(), Value::String(url.to_owned()));
    }
    Value::Object(body)
}

/// Read a `/generate/record-info` payload.
pub fn parse_generation_record(data: &Value) -> GenerationStatus {
    let raw_status = data["status"].as_str().unwrap_or_default().to_owned();
    let response = &data["response"];
    let clips = response["sunoData"]
        .as_array()
        .or_else(|| response["data"].as_array());

    let artifacts = clips
        .into_iter()
        .flatten()
        .filter_map(|clip| match serde_json::from_value::<MediaArtifact>(clip.clone()) {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                warn!(error = %e, "skipping malformed clip");
                None
            }
        })
        .collect();

    GenerationStatus {
        status: ProviderStatus::from_provider(&raw_status),
        artifacts,
        error_message: non_empty(&data["errorMessage"]),
        raw_status,
    }
}

/// Read a `/lyrics/record-info` payload.
pub fn parse_lyrics_record(data: &Value) -> LyricsStatus {
    let raw_status = data["status"].as_str().unwrap_or_default().to_owned();
    let response = &data["response"];

    let (text, title) = match response["data"].as_array().and_then(|items| items.first()) {
        Some(first) => (non_empty(&first["text"]), non_empty(&first["title"])),
        None => (non_empty(&response["text"]), non_empty(&response["title"])),
    };

    LyricsStatus {
        status: ProviderStatus::from_provider(&raw_status),
        text,
        title,
        error_message: non_empty(&data["errorMessage"]),
        raw_status,
    }
}

fn non_empty(value: &Value) -> Option<String> {
    value
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

#[async_trait]
impl ProviderClient for SunoClient {
    async fn submit(
        &self,
        task_type: TaskType,
        input: &Value,
        callback_url: Option<&str>,
    ) -> Result<String, ProviderError> {
        let path = submit_path(task_type);
        debug!(path, %task_type, "submitting generation request");
        let data = self
            .send(self.client.post(self.url(path)).json(&submit_body(input, callback_url)))
            .await?;

        data["taskId"]
            .as_str()
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .ok_or_else(|| ProviderError::Rejected {
                code: CODE_OK,
                message: "response did not include a taskId".into(),
            })
    }

    async fn poll_status(&self, external_task_id: &str) -> Result<GenerationStatus, ProviderError> {
        let data = self.record(PollTarget::Media, external_task_id).await?;
        Ok(parse_generation_record(&data))
    }

    async fn poll_lyrics(&self, external_task_id: &str) -> Result<LyricsStatus, ProviderError> {
        let data = self.record(PollTarget::Lyrics, external_task_id).await?;
        Ok(parse_lyrics_record(&data))
    }

    async fn raw_record(&self, target: PollTarget, external_task_id: &str) -> Result<Value, ProviderError> {
        self.record(target, external_task_id).await
    }
}
