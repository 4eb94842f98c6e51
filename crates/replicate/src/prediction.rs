//! Replicate prediction resource and its normalization.
//!
//! A prediction is returned by the creation, status and cancel calls
//! alike. Only the fields the client acts on are typed; `output` and
//! `error` stay as raw JSON because their shape varies by model.

use muse_core::job::{JobState, RemoteStatus};
use serde::Deserialize;

/// A prediction as returned by `POST /models/{owner}/{name}/predictions`
/// and `GET /predictions/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: PredictionStatus,
    #[serde(default)]
    pub urls: PredictionUrls,
    /// A single URL, a list of URLs, or null until the prediction succeeds.
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    /// Usually a string; some models report an object.
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub logs: Option<String>,
}

/// Links returned alongside a prediction.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredictionUrls {
    pub get: Option<String>,
    pub cancel: Option<String>,
}

/// Status values reported by Replicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
    /// Any status string this client does not know yet.
    #[serde(other)]
    Unknown,
}

impl PredictionStatus {
    /// Map onto the provider-neutral state. Unknown statuses are treated
    /// as still running so the deadline decides.
    pub fn job_state(self) -> JobState {
        match self {
            Self::Starting => JobState::Submitted,
            Self::Processing | Self::Unknown => JobState::Running,
            Self::Succeeded => JobState::Succeeded,
            Self::Failed => JobState::Failed,
            Self::Canceled => JobState::Canceled,
        }
    }
}

impl Prediction {
    /// Provider-neutral view of this response.
    pub fn remote_status(&self) -> RemoteStatus {
        RemoteStatus {
            state: self.status.job_state(),
            artifacts: normalize_output(self.output.as_ref()),
            error: error_text(self.error.as_ref()),
        }
    }
}

/// Flatten `output` into an ordered list of artifact URLs.
///
/// A bare string becomes a one-element list; a list keeps its string
/// entries in order. Anything else yields nothing.
pub fn normalize_output(output: Option<&serde_json::Value>) -> Vec<String> {
    match output {
        Some(serde_json::Value::String(url)) if !url.is_empty() => vec![url.clone()],
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

/// Provider error text: strings verbatim, other JSON rendered compactly.
pub fn error_text(error: Option<&serde_json::Value>) -> Option<String> {
    match error? {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn single_and_list_output_normalize_identically() {
        let single = json!("https://x/a.png");
        let list = json!(["https://x/a.png"]);
        assert_eq!(normalize_output(Some(&single)), vec!["https://x/a.png"]);
        assert_eq!(normalize_output(Some(&list)), vec!["https://x/a.png"]);
    }

    #[test]
    fn list_output_keeps_order_and_drops_non_strings() {
        let list = json!(["https://x/1.png", null, 7, "https://x/2.png"]);
        assert_eq!(
            normalize_output(Some(&list)),
            vec!["https://x/1.png", "https://x/2.png"]
        );
    }

    #[test]
    fn missing_or_odd_output_is_empty() {
        assert!(normalize_output(None).is_empty());
        assert!(normalize_output(Some(&json!(null))).is_empty());
        assert!(normalize_output(Some(&json!({"url": "x"}))).is_empty());
        assert!(normalize_output(Some(&json!(""))).is_empty());
    }

    #[test]
    fn error_text_variants() {
        assert_eq!(error_text(Some(&json!("bad input"))).as_deref(), Some("bad input"));
        assert_eq!(error_text(Some(&json!(null))), None);
        assert_eq!(error_text(None), None);
        assert_eq!(
            error_text(Some(&json!({"detail": "nsfw"}))).as_deref(),
            Some(r#"{"detail":"nsfw"}"#)
        );
    }

    #[test]
    fn deserializes_creation_response() {
        let body = json!({
            "id": "p1",
            "model": "qwen/qwen-image-edit-plus",
            "status": "starting",
            "urls": {
                "get": "https://api.replicate.com/v1/predictions/p1",
                "cancel": "https://api.replicate.com/v1/predictions/p1/cancel"
            },
            "output": null,
            "error": null
        });
        let prediction: Prediction = serde_json::from_value(body).unwrap();
        assert_eq!(prediction.status, PredictionStatus::Starting);
        assert_eq!(
            prediction.urls.get.as_deref(),
            Some("https://api.replicate.com/v1/predictions/p1")
        );
        let status = prediction.remote_status();
        assert_eq!(status.state, JobState::Submitted);
        assert!(status.artifacts.is_empty());
        assert!(status.error.is_none());
    }

    #[test]
    fn unknown_status_maps_to_running() {
        let prediction: Prediction =
            serde_json::from_value(json!({"id": "p1", "status": "queued_on_gpu"})).unwrap();
        assert_eq!(prediction.status, PredictionStatus::Unknown);
        assert_eq!(prediction.remote_status().state, JobState::Running);
    }
}
