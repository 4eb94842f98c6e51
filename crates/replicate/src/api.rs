//! REST API client for the Replicate prediction endpoints.
//!
//! Wraps the Replicate HTTP API (prediction creation, status, cancel)
//! and artifact downloads using [`reqwest`].

use muse_core::job::JobError;
use serde::de::DeserializeOwned;

use crate::config::ReplicateConfig;
use crate::prediction::Prediction;

/// HTTP client for the Replicate API.
pub struct ReplicateApi {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
    prefer_wait: bool,
}

/// Errors from the Replicate REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ReplicateApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Replicate returned a non-2xx status code.
    #[error("Replicate API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response whose body is not the expected JSON.
    #[error("Malformed response: {0}")]
    Decode(String),
}

impl ReplicateApiError {
    /// Whether the service answered and refused the call, as opposed to
    /// the call never completing.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::ApiError { .. })
    }

    /// Classify as a job error: refusals become `Rejected`, everything
    /// else `Transport`.
    pub fn into_job_error(self) -> JobError {
        match self {
            Self::ApiError { status, .. } => JobError::Rejected {
                status: Some(status),
                message: self.to_string(),
            },
            other => JobError::Transport {
                message: other.to_string(),
            },
        }
    }
}

impl ReplicateApi {
    /// Create an API client from configuration, building a
    /// [`reqwest::Client`] with the configured timeouts.
    pub fn new(config: &ReplicateConfig) -> Result<Self, ReplicateApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("muse/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (useful for sharing a connection pool).
    pub fn with_client(client: reqwest::Client, config: &ReplicateConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            prefer_wait: config.prefer_wait,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Status URL for a prediction id, used when a response omits `urls.get`.
    pub fn prediction_url(&self, id: &str) -> String {
        format!("{}/predictions/{}", self.base_url, id)
    }

    /// Cancel URL for a prediction id, used when a response omits `urls.cancel`.
    pub fn cancel_url(&self, id: &str) -> String {
        format!("{}/predictions/{}/cancel", self.base_url, id)
    }

    /// Create a prediction against an official model.
    ///
    /// Sends `POST /models/{owner}/{name}/predictions` with
    /// `{"input": input}`. Both 200 (finished under `Prefer: wait`) and
    /// 201 (queued) are success.
    pub async fn create_prediction(
        &self,
        model: &str,
        input: &serde_json::Value,
    ) -> Result<Prediction, ReplicateApiError> {
        let body = serde_json::json!({ "input": input });

        let mut request = self
            .client
            .post(format!("{}/models/{}/predictions", self.base_url, model))
            .bearer_auth(&self.api_token)
            .json(&body);
        if self.prefer_wait {
            request = request.header("Prefer", "wait");
        }

        Self::parse_response(request.send().await?).await
    }

    /// Retrieve the current state of a prediction from its status URL.
    pub async fn get_prediction(&self, url: &str) -> Result<Prediction, ReplicateApiError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Ask Replicate to stop a queued or running prediction.
    pub async fn cancel_prediction(&self, url: &str) -> Result<Prediction, ReplicateApiError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Download a produced artifact. Artifact hosts are public delivery
    /// URLs, so no bearer token is attached.
    pub async fn download(&self, url: &str) -> Result<Vec<u8>, ReplicateApiError> {
        let response = self.client.get(url).send().await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ReplicateApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ReplicateApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ReplicateApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ReplicateApiError> {
        let response = Self::ensure_success(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ReplicateApiError::Decode(e.to_string()))
    }
}
