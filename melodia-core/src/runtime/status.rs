//! Provider status vocabulary.
//!
//! The provider reports progress as open-ended strings. They are folded into
//! [`ProviderStatus`] in exactly one place so the rest of the runtime only
//! ever matches on a closed enum.

use serde::{Deserialize, Serialize};

/// Internal view of a provider-side generation status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Pending,
    /// Lyrics / text stage done.
    TextReady,
    /// At least one clip is playable.
    FirstClipReady,
    Success,
    Failed,
}

impl ProviderStatus {
    /// Map a provider status string. Unknown values fall back to `Pending`
    /// so polling keeps going until the attempt budget runs out.
    pub fn from_provider(raw: &str) -> Self {
        match raw.trim() {
            "PENDING" => ProviderStatus::Pending,
            "TEXT_SUCCESS" => ProviderStatus::TextReady,
            "FIRST_SUCCESS" => ProviderStatus::FirstClipReady,
            "SUCCESS" => ProviderStatus::Success,
            "CREATE_TASK_FAILED"
            | "GENERATE_AUDIO_FAILED"
            | "CALLBACK_EXCEPTION"
            | "SENSITIVE_WORD_ERROR" => ProviderStatus::Failed,
            other if other.contains("FAILED") => ProviderStatus::Failed,
            _ => ProviderStatus::Pending,
        }
    }
}

/// What a poll loop is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollTarget {
    Media,
    Lyrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Pending,
    Finished,
    Failed,
}

impl PollTarget {
    pub fn classify(self, status: ProviderStatus) -> PollOutcome {
        match (self, status) {
            (_, ProviderStatus::Failed) => PollOutcome::Failed,
            (_, ProviderStatus::Success) => PollOutcome::Finished,
            (PollTarget::Lyrics, ProviderStatus::TextReady) => PollOutcome::Finished,
            _ => PollOutcome::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_provider_strings() {
        assert_eq!(ProviderStatus::from_provider("PENDING"), ProviderStatus::Pending);
        assert_eq!(ProviderStatus::from_provider("TEXT_SUCCESS"), ProviderStatus::TextReady);
        assert_eq!(
            ProviderStatus::from_provider("FIRST_SUCCESS"),
            ProviderStatus::FirstClipReady
        );
        assert_eq!(ProviderStatus::from_provider("SUCCESS"), ProviderStatus::Success);
        for failed in [
            "CREATE_TASK_FAILED",
            "GENERATE_AUDIO_FAILED",
            "CALLBACK_EXCEPTION",
            "SENSITIVE_WORD_ERROR",
            "GENERATE_LYRICS_FAILED",
        ] {
            assert_eq!(ProviderStatus::from_provider(failed), ProviderStatus::Failed, "{failed}");
        }
    }

    #[test]
    fn unknown_strings_fall_back_to_pending() {
        assert_eq!(ProviderStatus::from_provider(""), ProviderStatus::Pending);
        assert_eq!(ProviderStatus::from_provider("QUEUED"), ProviderStatus::Pending);
        assert_eq!(ProviderStatus::from_provider("success"), ProviderStatus::Pending);
    }

    #[test]
    fn lyrics_finish_on_text_but_media_waits_for_success() {
        assert_eq!(
            PollTarget::Lyrics.classify(ProviderStatus::TextReady),
            PollOutcome::Finished
        );
        assert_eq!(
            PollTarget::Media.classify(ProviderStatus::TextReady),
            PollOutcome::Pending
        );
        assert_eq!(
            PollTarget::Media.classify(ProviderStatus::FirstClipReady),
            PollOutcome::Pending
        );
        assert_eq!(PollTarget::Media.classify(ProviderStatus::Success), PollOutcome::Finished);
        assert_eq!(PollTarget::Lyrics.classify(ProviderStatus::Failed), PollOutcome::Failed);
    }
}
