//! The seam between the polling client and the wire.
//!
//! [`AsyncJobClient`](crate::client::AsyncJobClient) only talks to a
//! [`PredictionTransport`]. [`ReplicateApi`] is the production
//! implementation; tests substitute scripted transports.

use async_trait::async_trait;

use crate::api::{ReplicateApi, ReplicateApiError};
use crate::prediction::Prediction;

/// Remote prediction operations needed to drive a job.
#[async_trait]
pub trait PredictionTransport: Send + Sync {
    /// Create a prediction for `model` (`owner/name`) with the given input.
    async fn create(
        &self,
        model: &str,
        input: &serde_json::Value,
    ) -> Result<Prediction, ReplicateApiError>;

    /// Fetch the current state of a prediction from its status locator.
    async fn fetch(&self, locator: &str) -> Result<Prediction, ReplicateApiError>;

    /// Request cancellation through a cancel locator.
    async fn cancel(&self, locator: &str) -> Result<Prediction, ReplicateApiError>;

    /// Download one produced artifact.
    async fn fetch_artifact(&self, url: &str) -> Result<Vec<u8>, ReplicateApiError>;

    /// Status locator for a prediction id when the provider omits one.
    fn status_locator(&self, id: &str) -> String;

    /// Cancel locator for a prediction id when the provider omits one.
    fn cancel_locator(&self, id: &str) -> String;
}

#[async_trait]
impl PredictionTransport for ReplicateApi {
    async fn create(
        &self,
        model: &str,
        input: &serde_json::Value,
    ) -> Result<Prediction, ReplicateApiError> {
        self.create_prediction(model, input).await
    }

    async fn fetch(&self, locator: &str) -> Result<Prediction, ReplicateApiError> {
        self.get_prediction(locator).await
    }

    async fn cancel(&self, locator: &str) -> Result<Prediction, ReplicateApiError> {
        self.cancel_prediction(locator).await
    }

    async fn fetch_artifact(&self, url: &str) -> Result<Vec<u8>, ReplicateApiError> {
        self.download(url).await
    }

    fn status_locator(&self, id: &str) -> String {
        self.prediction_url(id)
    }

    fn cancel_locator(&self, id: &str) -> String {
        self.cancel_url(id)
    }
}
