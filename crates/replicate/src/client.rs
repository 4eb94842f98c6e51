//! Submit-and-poll driver for remote prediction jobs.
//!
//! [`AsyncJobClient`] submits one prediction, then polls its status
//! locator until the provider reports a terminal state or the local
//! deadline passes. Every path ends in a [`JobOutcome`]; failures are
//! data, not `Err`s.
//!
//! The client holds no mutable state. Each call owns its handle, timer
//! and progress throttle, so independent jobs can run concurrently on
//! one shared client.

use std::time::Duration;

use muse_core::job::{JobError, JobHandle, JobOutcome, JobRequest};
use tokio::time::Instant;

use crate::api::{ReplicateApi, ReplicateApiError};
use crate::config::{PollConfig, ReplicateConfig};
use crate::payload::build_input;
use crate::progress::{ProgressFn, ProgressThrottle};
use crate::transport::PredictionTransport;

/// Drives prediction jobs from submission to a terminal outcome.
pub struct AsyncJobClient<T = ReplicateApi> {
    transport: T,
    poll: PollConfig,
}

impl AsyncJobClient<ReplicateApi> {
    /// Build a client talking to the real Replicate API.
    pub fn from_config(config: &ReplicateConfig, poll: PollConfig) -> Result<Self, ReplicateApiError> {
        Ok(Self::new(ReplicateApi::new(config)?, poll))
    }
}

impl<T: PredictionTransport> AsyncJobClient<T> {
    pub fn new(transport: T, poll: PollConfig) -> Self {
        Self { transport, poll }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn poll_config(&self) -> &PollConfig {
        &self.poll
    }

    /// Submit a request and return a handle for polling.
    ///
    /// Local validation failures and non-2xx responses fail with
    /// [`JobError::Rejected`]; network and decode failures with
    /// [`JobError::Transport`]. Nothing is retried, since a resubmission
    /// could start a second billable prediction.
    pub async fn submit(&self, request: &JobRequest) -> Result<JobHandle, JobError> {
        request.validate()?;
        let input = build_input(request);

        tracing::info!(
            model = request.model(),
            images = request.images().len(),
            mode = request.mode().label(),
            "Submitting prediction",
        );

        let submitted_at = Instant::now();
        let prediction = self
            .transport
            .create(request.model(), &input)
            .await
            .map_err(|e| {
                tracing::warn!(model = request.model(), error = %e, "Prediction submission failed");
                e.into_job_error()
            })?;

        let locator = prediction
            .urls
            .get
            .clone()
            .unwrap_or_else(|| self.transport.status_locator(&prediction.id));
        let cancel_locator = prediction
            .urls
            .cancel
            .clone()
            .unwrap_or_else(|| self.transport.cancel_locator(&prediction.id));

        let handle = JobHandle::new(
            prediction.id.clone(),
            locator,
            Some(cancel_locator),
            prediction.remote_status(),
        )
        .map_err(|e| JobError::Transport {
            message: e.to_string(),
        })?
        .with_submitted_at(submitted_at);

        tracing::info!(
            job_id = %handle.id(),
            state = %handle.last_status().state,
            "Prediction submitted",
        );

        Ok(handle)
    }

    /// Poll a submitted job until it reaches a terminal state or
    /// `deadline` passes, measured from the handle's submission time.
    ///
    /// The handle's last known status is checked first, so a handle that
    /// is already terminal returns immediately without a network call.
    /// Sleeps and status polls are cut short at the deadline; a poll that
    /// fails or runs out of time is logged and retried on the next tick.
    /// On timeout the remote job is left running and the outcome keeps
    /// its id.
    pub async fn await_completion(
        &self,
        handle: &JobHandle,
        deadline: Duration,
        poll_interval: Duration,
        mut on_progress: Option<ProgressFn<'_>>,
    ) -> JobOutcome {
        let started = handle.submitted_at();
        let mut throttle = ProgressThrottle::new(self.poll.progress_interval);
        let mut status = handle.last_status().clone();
        let mut polls = 0u32;

        loop {
            let elapsed = started.elapsed();

            if let Some(outcome) = JobOutcome::from_remote(handle.id(), &status, elapsed) {
                log_outcome(&outcome, polls);
                return outcome;
            }

            if elapsed >= deadline {
                tracing::warn!(
                    job_id = %handle.id(),
                    elapsed_secs = elapsed.as_secs_f64(),
                    "Deadline exceeded; remote prediction left running",
                );
                return JobOutcome::timed_out(handle.id(), deadline, elapsed);
            }

            tokio::time::sleep(poll_interval.min(deadline - elapsed)).await;
            polls += 1;

            let remaining = deadline.saturating_sub(started.elapsed());
            match tokio::time::timeout(remaining, self.transport.fetch(handle.locator())).await {
                Ok(Ok(prediction)) => {
                    status = prediction.remote_status();
                    tracing::debug!(job_id = %handle.id(), state = %status.state, polls, "Polled prediction");
                }
                Ok(Err(e)) => {
                    tracing::warn!(job_id = %handle.id(), error = %e, polls, "Status poll failed, retrying");
                }
                Err(_) => {
                    tracing::warn!(job_id = %handle.id(), polls, "Status poll still pending at deadline");
                }
            }

            if !status.state.is_terminal() {
                if let Some(report) = on_progress.as_deref_mut() {
                    let elapsed = started.elapsed();
                    if throttle.should_report(elapsed) {
                        report(elapsed);
                    }
                }
            }
        }
    }

    /// Submit then poll. A failed submission yields a failed outcome
    /// with no job id.
    pub async fn run(
        &self,
        request: &JobRequest,
        deadline: Duration,
        poll_interval: Duration,
        on_progress: Option<ProgressFn<'_>>,
    ) -> JobOutcome {
        let started = Instant::now();
        match self.submit(request).await {
            Ok(handle) => {
                self.await_completion(&handle, deadline, poll_interval, on_progress)
                    .await
            }
            Err(error) => JobOutcome::failed(None, error, started.elapsed()),
        }
    }

    /// [`run`](Self::run) with the deadline and interval from [`PollConfig`].
    pub async fn run_default(
        &self,
        request: &JobRequest,
        on_progress: Option<ProgressFn<'_>>,
    ) -> JobOutcome {
        self.run(request, self.poll.deadline, self.poll.poll_interval, on_progress)
            .await
    }

    /// Ask the provider to stop a job. Never called implicitly; timeouts
    /// leave the remote job running unless the caller opts in here.
    pub async fn cancel(&self, handle: &JobHandle) -> Result<(), JobError> {
        let locator = handle
            .cancel_locator()
            .map(str::to_string)
            .unwrap_or_else(|| self.transport.cancel_locator(handle.id()));

        tracing::info!(job_id = %handle.id(), "Requesting prediction cancel");

        self.transport
            .cancel(&locator)
            .await
            .map(|_| ())
            .map_err(ReplicateApiError::into_job_error)
    }

    /// Download one artifact produced by a succeeded job.
    pub async fn fetch_artifact(&self, url: &str) -> Result<Vec<u8>, ReplicateApiError> {
        self.transport.fetch_artifact(url).await
    }
}

fn log_outcome(outcome: &JobOutcome, polls: u32) {
    let job_id = outcome.job_id().unwrap_or("-");
    match outcome.failure_reason() {
        None => tracing::info!(
            job_id,
            artifacts = outcome.artifacts().len(),
            elapsed_secs = outcome.elapsed().as_secs_f64(),
            polls,
            "Prediction succeeded",
        ),
        Some(reason) => tracing::warn!(
            job_id,
            state = %outcome.state(),
            reason = %reason,
            polls,
            "Prediction did not succeed",
        ),
    }
}
