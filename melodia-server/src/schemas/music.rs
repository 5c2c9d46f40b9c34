//! Submission bodies.
//!
//! Each request serializes (camelCase, without `callbackUrl`) into the input
//! the provider receives. Required fields default to empty so a missing field
//! fails validation with a 400 like an empty one does.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

/// Accept only absolute `http`/`https` URLs.
pub fn http_url(value: &str) -> Result<(), ValidationError> {
    let uri: http::Uri = value
        .parse()
        .map_err(|_| ValidationError::new("url").with_message("not a valid URL".into()))?;
    match (uri.scheme_str(), uri.authority()) {
        (Some("http" | "https"), Some(_)) => Ok(()),
        _ => Err(ValidationError::new("url").with_message("must be an http or https URL".into())),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateMusicRequest {
    #[serde(default)]
    pub custom_mode: bool,
    #[serde(default)]
    pub instrumental: bool,
    /// Provider model, e.g. `V4_5`.
    #[serde(default)]
    #[validate(length(min = 1, message = "model is required"))]
    pub model: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "prompt is required"))]
    pub prompt: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_tags: Option<String>,
    /// Receives the task-completion notification.
    #[serde(default, skip_serializing)]
    #[validate(custom(function = "http_url"))]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateLyricsRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "prompt is required"))]
    pub prompt: String,
    #[serde(default, skip_serializing)]
    #[validate(custom(function = "http_url"))]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddVocalsRequest {
    /// Publicly reachable instrumental track.
    #[serde(default)]
    #[validate(length(min = 1, message = "uploadUrl is required"))]
    pub upload_url: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "prompt is required"))]
    pub prompt: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "style is required"))]
    pub style: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_tags: Option<String>,
    /// `m` or `f`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vocal_gender: Option<String>,
    #[serde(default, skip_serializing)]
    #[validate(custom(function = "http_url"))]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddInstrumentalRequest {
    /// Publicly reachable vocal track.
    #[serde(default)]
    #[validate(length(min = 1, message = "uploadUrl is required"))]
    pub upload_url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    #[validate(length(min = 1, message = "tags is required"))]
    pub tags: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_tags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing)]
    #[validate(custom(function = "http_url"))]
    pub callback_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtendMusicRequest {
    /// Provider id of the clip to continue.
    #[serde(default)]
    #[validate(length(min = 1, message = "audioId is required"))]
    pub audio_id: String,
    #[serde(default)]
    pub prompt: String,
    /// Offset in seconds where the continuation starts.
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub continue_at: f64,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing)]
    #[validate(custom(function = "http_url"))]
    pub callback_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_required_fields_fail_validation() {
        let req: GenerateMusicRequest = serde_json::from_value(json!({ "prompt": "x" })).unwrap();
        let errors = req.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("model"));
        assert!(!errors.field_errors().contains_key("prompt"));
    }

    #[test]
    fn callback_url_must_be_http() {
        let req: GenerateLyricsRequest = serde_json::from_value(json!({
            "prompt": "rain",
            "callbackUrl": "ftp://example.com/hook"
        }))
        .unwrap();
        assert!(req.validate().is_err());

        let req: GenerateLyricsRequest = serde_json::from_value(json!({
            "prompt": "rain",
            "callbackUrl": "https://example.com/hook"
        }))
        .unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn relative_urls_are_rejected() {
        assert!(http_url("/hook").is_err());
        assert!(http_url("not a url").is_err());
        assert!(http_url("http://127.0.0.1:8080/hook").is_ok());
    }

    #[test]
    fn provider_input_omits_callback_url() {
        let req: AddVocalsRequest = serde_json::from_value(json!({
            "uploadUrl": "https://cdn.example.com/a.mp3",
            "prompt": "soft",
            "style": "jazz",
            "callbackUrl": "https://example.com/hook"
        }))
        .unwrap();
        let input = serde_json::to_value(&req).unwrap();
        assert_eq!(input["uploadUrl"], "https://cdn.example.com/a.mp3");
        assert!(input.get("callbackUrl").is_none());
        assert!(input.get("vocalGender").is_none());
    }
}
