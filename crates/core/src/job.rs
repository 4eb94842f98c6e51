//! Job data model: requests, handles, states and terminal outcomes.
//!
//! A job is one remote inference invocation. The caller builds a
//! [`JobRequest`], submission turns it into a [`JobHandle`], and the
//! polling loop ends with exactly one [`JobOutcome`]. Outcome
//! constructors enforce the artifact/error invariants so that no other
//! layer has to.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};
use tokio::time::Instant;

use crate::error::CoreError;
use crate::media::{decode_data_uri, detect_media_type, encode_data_uri};

/// Maximum number of image slots a single edit accepts.
pub const MAX_IMAGE_SLOTS: usize = 3;

/// Provider parameter names for each image slot, in slot order.
pub const IMAGE_SLOT_KEYS: [&str; MAX_IMAGE_SLOTS] = ["image", "image_2", "image_3"];

/// Parameters derived from the request itself rather than set by callers.
const RESERVED_PARAMS: &[&str] = &["prompt", "go_fast"];

// ---------------------------------------------------------------------------
// JobState
// ---------------------------------------------------------------------------

/// Lifecycle state of a job.
///
/// `Submitted` and `Running` are the only non-terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Submitted,
    Running,
    Succeeded,
    Failed,
    Canceled,
    TimedOut,
}

impl JobState {
    /// Whether no further transition can happen from this state.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Submitted | Self::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
            Self::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Execution mode
// ---------------------------------------------------------------------------

/// Speed/fidelity trade-off preset for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Lightning mode: 8 inference steps.
    #[default]
    Fast,
    /// Standard mode: 40 inference steps.
    HighFidelity,
}

impl ExecutionMode {
    pub fn from_go_fast(go_fast: bool) -> Self {
        if go_fast {
            Self::Fast
        } else {
            Self::HighFidelity
        }
    }

    /// Human-readable label used in progress and summary output.
    pub fn label(self) -> &'static str {
        match self {
            Self::Fast => "Lightning (8 steps)",
            Self::HighFidelity => "High-fidelity (40 steps)",
        }
    }
}

// ---------------------------------------------------------------------------
// Request payload
// ---------------------------------------------------------------------------

/// A scalar request parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// One input image, either carried inline or fetched by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageRef {
    Inline {
        bytes: Vec<u8>,
        /// Sniffed from the header bytes at construction.
        media_type: &'static str,
    },
    Url(String),
}

impl ImageRef {
    /// Wrap raw image bytes, detecting the media type from the header.
    pub fn inline(bytes: Vec<u8>) -> Self {
        let media_type = detect_media_type(&bytes);
        Self::Inline { bytes, media_type }
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    /// Parse an image reference from a `data:` URI or an `http(s)` URL.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        if value.starts_with("data:") {
            Ok(Self::inline(decode_data_uri(value)?))
        } else if value.starts_with("http://") || value.starts_with("https://") {
            Ok(Self::url(value))
        } else {
            Err(CoreError::Validation(format!(
                "Image reference must be a data URI or http(s) URL, got: '{}'",
                value.chars().take(32).collect::<String>()
            )))
        }
    }

    /// Detected media type for inline images, `None` for URLs.
    pub fn media_type(&self) -> Option<&'static str> {
        match self {
            Self::Inline { media_type, .. } => Some(*media_type),
            Self::Url(_) => None,
        }
    }

    /// Value sent over the wire: a data URI or the URL unchanged.
    pub fn to_wire(&self) -> String {
        match self {
            Self::Inline { bytes, media_type } => encode_data_uri(media_type, bytes),
            Self::Url(url) => url.clone(),
        }
    }
}

/// Immutable description of one unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    model: String,
    prompt: String,
    mode: ExecutionMode,
    params: BTreeMap<String, ParamValue>,
    images: Vec<ImageRef>,
}

impl JobRequest {
    /// Start a request for `model` (`owner/name`) with an edit prompt.
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            mode: ExecutionMode::default(),
            params: BTreeMap::new(),
            images: Vec::new(),
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set an extra provider parameter. Later calls overwrite earlier ones.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Append an image to the next free slot.
    pub fn with_image(mut self, image: ImageRef) -> Self {
        self.images.push(image);
        self
    }

    pub fn with_images(mut self, images: impl IntoIterator<Item = ImageRef>) -> Self {
        self.images.extend(images);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn params(&self) -> &BTreeMap<String, ParamValue> {
        &self.params
    }

    /// Images in slot order (primary subject first).
    pub fn images(&self) -> &[ImageRef] {
        &self.images
    }

    /// Check the request is submittable.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.model.split('/').filter(|s| !s.is_empty()).count() != 2 {
            return Err(CoreError::Validation(format!(
                "Model must be 'owner/name', got: '{}'",
                self.model
            )));
        }
        if self.prompt.trim().is_empty() {
            return Err(CoreError::Validation("Prompt must not be empty".to_string()));
        }
        if self.images.is_empty() {
            return Err(CoreError::Validation(
                "At least one input image is required".to_string(),
            ));
        }
        if self.images.len() > MAX_IMAGE_SLOTS {
            return Err(CoreError::Validation(format!(
                "At most {MAX_IMAGE_SLOTS} images are supported, got {}",
                self.images.len()
            )));
        }
        if let Some(key) = self
            .params
            .keys()
            .find(|k| RESERVED_PARAMS.contains(&k.as_str()) || IMAGE_SLOT_KEYS.contains(&k.as_str()))
        {
            return Err(CoreError::Validation(format!(
                "Parameter '{key}' is reserved"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Provider-neutral view of one status response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStatus {
    pub state: JobState,
    /// Output URLs in provider order. Only meaningful once succeeded.
    pub artifacts: Vec<String>,
    /// Provider error text, verbatim.
    pub error: Option<String>,
}

impl RemoteStatus {
    pub fn pending(state: JobState) -> Self {
        Self {
            state,
            artifacts: Vec::new(),
            error: None,
        }
    }
}

/// Identifies one submitted job and where to poll it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    id: String,
    locator: String,
    cancel_locator: Option<String>,
    last_status: RemoteStatus,
    submitted_at: Instant,
}

impl JobHandle {
    /// Build a handle from a creation response, stamped as submitted now.
    ///
    /// Fails when the provider returned an empty id or locator.
    pub fn new(
        id: impl Into<String>,
        locator: impl Into<String>,
        cancel_locator: Option<String>,
        last_status: RemoteStatus,
    ) -> Result<Self, CoreError> {
        let id = id.into();
        let locator = locator.into();
        if id.trim().is_empty() {
            return Err(CoreError::Malformed {
                what: "job handle",
                reason: "empty job id".to_string(),
            });
        }
        if locator.trim().is_empty() {
            return Err(CoreError::Malformed {
                what: "job handle",
                reason: "empty status locator".to_string(),
            });
        }
        Ok(Self {
            id,
            locator,
            cancel_locator,
            last_status,
            submitted_at: Instant::now(),
        })
    }

    /// Backdate the submission time, typically to just before the
    /// creation request went out.
    pub fn with_submitted_at(mut self, submitted_at: Instant) -> Self {
        self.submitted_at = submitted_at;
        self
    }

    /// Deadlines and elapsed times are measured from here.
    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// URL polled for status.
    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn cancel_locator(&self) -> Option<&str> {
        self.cancel_locator.as_deref()
    }

    /// Status observed when the handle was created.
    pub fn last_status(&self) -> &RemoteStatus {
        &self.last_status
    }
}

// ---------------------------------------------------------------------------
// Errors carried in outcomes
// ---------------------------------------------------------------------------

/// Category of a job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    Transport,
    Rejected,
    RemoteFailure,
    Canceled,
    TimedOut,
}

/// Why a job did not succeed.
///
/// This is data inside a [`JobOutcome`], not an error path: every job
/// ends with an outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobError {
    /// Network or protocol failure talking to the provider.
    #[error("Network error: {message}")]
    Transport { message: String },

    /// The provider (or local validation) refused the submission.
    #[error("Request rejected: {message}")]
    Rejected {
        /// HTTP status, absent for local validation failures.
        status: Option<u16>,
        message: String,
    },

    /// The provider reported the job as failed.
    #[error("Generation failed: {message}")]
    RemoteFailure { message: String },

    /// The provider reported the job as canceled.
    #[error("Generation was canceled: {message}")]
    Canceled { message: String },

    /// The local deadline elapsed first. The remote job may still run.
    #[error("Timed out after {}, prediction ID: {job_id}", format_wait(*waited_ms))]
    TimedOut { job_id: String, waited_ms: u64 },
}

impl JobError {
    pub fn kind(&self) -> JobErrorKind {
        match self {
            Self::Transport { .. } => JobErrorKind::Transport,
            Self::Rejected { .. } => JobErrorKind::Rejected,
            Self::RemoteFailure { .. } => JobErrorKind::RemoteFailure,
            Self::Canceled { .. } => JobErrorKind::Canceled,
            Self::TimedOut { .. } => JobErrorKind::TimedOut,
        }
    }

    /// The underlying message without the kind prefix.
    pub fn message(&self) -> String {
        match self {
            Self::Transport { message }
            | Self::Rejected { message, .. }
            | Self::RemoteFailure { message }
            | Self::Canceled { message } => message.clone(),
            Self::TimedOut { job_id, waited_ms } => {
                format!("deadline of {} exceeded for prediction {job_id}", format_wait(*waited_ms))
            }
        }
    }

    fn terminal_state(&self) -> JobState {
        match self {
            Self::Canceled { .. } => JobState::Canceled,
            Self::TimedOut { .. } => JobState::TimedOut,
            _ => JobState::Failed,
        }
    }
}

/// `1500` -> `1.5s`, `5000` -> `5s`.
fn format_wait(ms: u64) -> String {
    format!("{}s", ms as f64 / 1000.0)
}

impl From<CoreError> for JobError {
    fn from(e: CoreError) -> Self {
        Self::Rejected {
            status: None,
            message: e.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Terminal result of one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutcome {
    state: JobState,
    artifacts: Vec<String>,
    error: Option<JobError>,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    elapsed: Duration,
    job_id: Option<String>,
}

impl JobOutcome {
    /// A successful outcome. An empty artifact list is downgraded to a
    /// remote failure, since success without output is unusable.
    pub fn succeeded(job_id: impl Into<String>, artifacts: Vec<String>, elapsed: Duration) -> Self {
        if artifacts.is_empty() {
            return Self::failed(
                Some(job_id.into()),
                JobError::RemoteFailure {
                    message: "prediction succeeded without output".to_string(),
                },
                elapsed,
            );
        }
        Self {
            state: JobState::Succeeded,
            artifacts,
            error: None,
            elapsed,
            job_id: Some(job_id.into()),
        }
    }

    /// A non-successful outcome; the state follows from the error kind.
    pub fn failed(job_id: Option<String>, error: JobError, elapsed: Duration) -> Self {
        Self {
            state: error.terminal_state(),
            artifacts: Vec::new(),
            error: Some(error),
            elapsed,
            job_id,
        }
    }

    /// The local deadline elapsed before the job finished.
    pub fn timed_out(job_id: impl Into<String>, deadline: Duration, elapsed: Duration) -> Self {
        let job_id = job_id.into();
        Self::failed(
            Some(job_id.clone()),
            JobError::TimedOut {
                job_id,
                waited_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
            },
            elapsed,
        )
    }

    /// Build the outcome for a remote status, or `None` while the job
    /// is still pending.
    pub fn from_remote(job_id: &str, status: &RemoteStatus, elapsed: Duration) -> Option<Self> {
        let provider_error = || status.error.clone();
        match status.state {
            JobState::Submitted | JobState::Running => None,
            JobState::Succeeded => Some(Self::succeeded(job_id, status.artifacts.clone(), elapsed)),
            JobState::Failed => Some(Self::failed(
                Some(job_id.to_string()),
                JobError::RemoteFailure {
                    message: provider_error().unwrap_or_else(|| "Unknown error".to_string()),
                },
                elapsed,
            )),
            JobState::Canceled => Some(Self::failed(
                Some(job_id.to_string()),
                JobError::Canceled {
                    message: provider_error()
                        .unwrap_or_else(|| "prediction was canceled".to_string()),
                },
                elapsed,
            )),
            JobState::TimedOut => Some(Self::timed_out(job_id, elapsed, elapsed)),
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn is_success(&self) -> bool {
        self.state == JobState::Succeeded
    }

    /// Output URLs in provider order; empty unless succeeded.
    pub fn artifacts(&self) -> &[String] {
        &self.artifacts
    }

    pub fn first_artifact(&self) -> Option<&str> {
        self.artifacts.first().map(String::as_str)
    }

    pub fn error(&self) -> Option<&JobError> {
        self.error.as_ref()
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Provider job id, absent when submission itself failed.
    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    /// Short human-facing reason, `None` on success.
    pub fn failure_reason(&self) -> Option<String> {
        self.error.as_ref().map(ToString::to_string)
    }
}

fn serialize_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64((d.as_secs_f64() * 100.0).round() / 100.0)
}
