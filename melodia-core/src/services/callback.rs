//! Outbound task-completion notifications.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{info, warn};

use crate::runtime::backend::protocol::{CallbackNotifier, CallbackPayload};

#[derive(Debug, Clone)]
pub struct CallbackConfig {
    /// Per-attempt request timeout.
    pub timeout: Duration,
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each retry.
    pub initial_backoff: Duration,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
        }
    }
}

/// Why one delivery attempt failed. Never leaves this module.
#[derive(Debug, Error)]
enum CallbackDeliveryError {
    #[error("callback transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("callback endpoint answered HTTP {0}")]
    Status(StatusCode),
}

impl CallbackDeliveryError {
    fn is_retryable(&self) -> bool {
        match self {
            CallbackDeliveryError::Transport(e) => !e.is_builder(),
            CallbackDeliveryError::Status(status) => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
        }
    }
}

/// POSTs [`CallbackPayload`]s as JSON with bounded retries.
#[derive(Debug, Clone)]
pub struct HttpCallbackNotifier {
    client: Client,
    config: CallbackConfig,
}

impl HttpCallbackNotifier {
    pub fn new(config: CallbackConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("melodia/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    async fn attempt(&self, url: &str, payload: &CallbackPayload) -> Result<StatusCode, CallbackDeliveryError> {
        let response = self.client.post(url).json(payload).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(status)
        } else {
            Err(CallbackDeliveryError::Status(status))
        }
    }
}

#[async_trait]
impl CallbackNotifier for HttpCallbackNotifier {
    async fn deliver(&self, url: &str, payload: &CallbackPayload) {
        let max_attempts = self.config.max_attempts.max(1);
        let mut backoff = self.config.initial_backoff;

        for attempt in 1..=max_attempts {
            match self.attempt(url, payload).await {
                Ok(status) => {
                    info!(
                        task_id = %payload.task_id,
                        callback_url = url,
                        status = status.as_u16(),
                        attempt,
                        "callback delivered"
                    );
                    return;
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        task_id = %payload.task_id,
                        callback_url = url,
                        attempt,
                        error = %e,
                        "callback failed; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = backoff.saturating_mul(2);
                }
                Err(e) => {
                    warn!(
                        task_id = %payload.task_id,
                        callback_url = url,
                        attempt,
                        error = %e,
                        "callback delivery abandoned"
                    );
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::types::{TaskStatus, TaskType};
    use axum::extract::State;
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::Utc;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn payload() -> CallbackPayload {
        CallbackPayload {
            task_id: "t-1".into(),
            task_type: TaskType::LyricsGeneration,
            status: TaskStatus::Failed,
            result: None,
            error: Some("boom".into()),
            completed_at: Utc::now(),
        }
    }

    fn notifier() -> HttpCallbackNotifier {
        HttpCallbackNotifier::new(CallbackConfig {
            timeout: Duration::from_secs(2),
            max_attempts: 3,
            initial_backoff: Duration::from_millis(10),
        })
        .unwrap()
    }

    /// Endpoint answering with `statuses` in order, then 200.
    async fn endpoint(statuses: Vec<u16>) -> (String, Arc<AtomicU32>) {
        let hits = Arc::new(AtomicU32::new(0));
        let state = (Arc::clone(&hits), Arc::new(statuses));
        let router = Router::new()
            .route(
                "/hook",
                post(
                    |State((hits, statuses)): State<(Arc<AtomicU32>, Arc<Vec<u16>>)>,
                     Json(body): Json<serde_json::Value>| async move {
                        assert_eq!(body["taskId"], "t-1");
                        assert_eq!(body["type"], "lyrics_generation");
                        assert_eq!(body["error"], "boom");
                        let n = hits.fetch_add(1, Ordering::SeqCst) as usize;
                        let code = statuses.get(n).copied().unwrap_or(200);
                        StatusCode::from_u16(code).unwrap()
                    },
                ),
            )
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        (url, hits)
    }

    #[tokio::test]
    async fn server_errors_are_retried() {
        let (url, hits) = endpoint(vec![500, 503]).await;
        notifier().deliver(&url, &payload()).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let (url, hits) = endpoint(vec![404]).await;
        notifier().deliver(&url, &payload()).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_stop_at_the_attempt_budget() {
        let (url, hits) = endpoint(vec![500, 500, 500, 500]).await;
        notifier().deliver(&url, &payload()).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_swallowed() {
        notifier()
            .deliver("http://127.0.0.1:9/hook", &payload())
            .await;
    }
}
