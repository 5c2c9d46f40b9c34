use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::runtime::backend::protocol::{GenerationStatus, LyricsStatus, ProviderError};
use crate::runtime::status::{PollOutcome, PollTarget, ProviderStatus};
use crate::runtime::storage::TaskWriter;
use crate::runtime::types::RuntimeError;

/// Progress when polling starts.
pub const POLL_PROGRESS_BASE: u8 = 30;
/// Progress gained over a full polling budget.
pub const POLL_PROGRESS_SPAN: u8 = 40;

/// Attempt budget and spacing for one poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub const fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }
}

/// `base + floor(attempt / max_attempts * span)`.
pub fn poll_progress(base: u8, span: u8, attempt: u32, max_attempts: u32) -> u8 {
    if max_attempts == 0 {
        return base;
    }
    let attempt = u64::from(attempt.min(max_attempts));
    let gained = attempt * u64::from(span) / u64::from(max_attempts);
    base.saturating_add(gained as u8)
}

/// A provider status answer the poll loop can classify.
pub trait PollResponse {
    fn provider_status(&self) -> ProviderStatus;
    fn raw_status(&self) -> &str;
    fn error_message(&self) -> Option<&str>;
}

impl PollResponse for GenerationStatus {
    fn provider_status(&self) -> ProviderStatus {
        self.status
    }

    fn raw_status(&self) -> &str {
        &self.raw_status
    }

    fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

impl PollResponse for LyricsStatus {
    fn provider_status(&self) -> ProviderStatus {
        self.status
    }

    fn raw_status(&self) -> &str {
        &self.raw_status
    }

    fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }
}

/// Poll the provider until it reports a terminal status for `target`.
///
/// Failed queries are logged and count as a spent attempt. Progress is bumped
/// after every attempt. The loop sleeps `policy.interval` between attempts but
/// not after the last one.
pub async fn poll_until_terminal<R, F, Fut>(
    policy: PollPolicy,
    target: PollTarget,
    external_task_id: &str,
    writer: &TaskWriter,
    mut fetch: F,
) -> Result<R, RuntimeError>
where
    R: PollResponse,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<R, ProviderError>>,
{
    for attempt in 1..=policy.max_attempts {
        match fetch().await {
            Ok(response) => match target.classify(response.provider_status()) {
                PollOutcome::Finished => {
                    debug!(
                        task_id = %writer.id(),
                        external_task_id,
                        attempt,
                        status = response.raw_status(),
                        "provider task finished"
                    );
                    return Ok(response);
                }
                PollOutcome::Failed => {
                    let message = response
                        .error_message()
                        .map(str::to_owned)
                        .unwrap_or_else(|| format!("provider status {}", response.raw_status()));
                    return Err(RuntimeError::ProviderTaskFailed {
                        external_task_id: external_task_id.to_owned(),
                        message,
                    });
                }
                PollOutcome::Pending => {
                    debug!(
                        task_id = %writer.id(),
                        external_task_id,
                        attempt,
                        status = response.raw_status(),
                        "provider task still running"
                    );
                }
            },
            Err(e) => {
                warn!(
                    task_id = %writer.id(),
                    external_task_id,
                    attempt,
                    error = %e,
                    "status query failed; will retry"
                );
            }
        }

        writer
            .advance(poll_progress(
                POLL_PROGRESS_BASE,
                POLL_PROGRESS_SPAN,
                attempt,
                policy.max_attempts,
            ))
            .await;

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    Err(RuntimeError::PollTimeout {
        external_task_id: external_task_id.to_owned(),
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_spans_thirty_to_seventy() {
        assert_eq!(poll_progress(30, 40, 0, 120), 30);
        assert_eq!(poll_progress(30, 40, 60, 120), 50);
        assert_eq!(poll_progress(30, 40, 119, 120), 69);
        assert_eq!(poll_progress(30, 40, 120, 120), 70);
        assert_eq!(poll_progress(30, 40, 500, 120), 70);
        assert_eq!(poll_progress(30, 40, 3, 0), 30);
    }
}
