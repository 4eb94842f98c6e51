//! Runs catalog scenarios through the job client and saves artifacts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use muse_core::catalog::TestCase;
use muse_core::job::{ImageRef, JobError, JobOutcome};
use muse_replicate::transport::PredictionTransport;
use muse_replicate::AsyncJobClient;

use crate::error::HarnessError;
use crate::report::CaseResult;
use crate::settings::EditSettings;
use crate::sink::ResultSink;

pub struct ScenarioRunner<T> {
    client: AsyncJobClient<T>,
    settings: EditSettings,
    image_dir: PathBuf,
    output_dir: PathBuf,
    seed: Option<i64>,
}

impl<T: PredictionTransport> ScenarioRunner<T> {
    pub fn new(
        client: AsyncJobClient<T>,
        settings: EditSettings,
        image_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            client,
            settings,
            image_dir: image_dir.into(),
            output_dir: output_dir.into(),
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: Option<i64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn client(&self) -> &AsyncJobClient<T> {
        &self.client
    }

    /// Run each scenario `runs` times, in order, feeding each result to
    /// all sinks as it completes. Sinks are not finished here.
    pub async fn run_all(
        &self,
        cases: &[&TestCase],
        sinks: &mut [Box<dyn ResultSink + Send>],
    ) -> Result<Vec<CaseResult>, HarnessError> {
        let jobs: Vec<(&TestCase, u32)> = cases
            .iter()
            .flat_map(|&case| (1..=case.runs).map(move |n| (case, n)))
            .collect();

        tracing::info!(scenarios = jobs.len(), "Starting catalog run");

        let mut results = Vec::with_capacity(jobs.len());
        for (i, (case, run_number)) in jobs.iter().enumerate() {
            if i > 0 && !self.settings.case_pause.is_zero() {
                tokio::time::sleep(self.settings.case_pause).await;
            }

            let result = self.run_case(case, *run_number).await;
            for sink in sinks.iter_mut() {
                sink.record(&result)?;
            }
            results.push(result);
        }

        Ok(results)
    }

    /// Run one scenario. Never fails: missing inputs and job failures are
    /// recorded in the result.
    pub async fn run_case(&self, case: &TestCase, run_number: u32) -> CaseResult {
        let test_id = case.run_id(run_number);
        tracing::info!(
            test_id = %test_id,
            category = %case.category,
            difficulty = case.difficulty.as_str(),
            "Running scenario",
        );

        let missing: Vec<&str> = case
            .images_needed
            .iter()
            .filter(|name| !self.image_dir.join(name).is_file())
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            tracing::warn!(
                test_id = %test_id,
                image_dir = %self.image_dir.display(),
                missing = ?missing,
                "Missing images",
            );
            let error = local_failure(format!("Missing images: {}", missing.join(", ")));
            return CaseResult::new(case, test_id, Vec::new(), error);
        }

        let images = match self.load_images(&case.images_needed).await {
            Ok(images) => images,
            Err(e) => {
                tracing::warn!(test_id = %test_id, error = %e, "Could not read input images");
                return CaseResult::new(case, test_id, Vec::new(), local_failure(e.to_string()));
            }
        };

        let request = self.settings.request(&case.prompt, images, self.seed);
        let progress_id = test_id.clone();
        let mut on_progress = move |elapsed: Duration| {
            tracing::info!(test_id = %progress_id, elapsed_secs = elapsed.as_secs(), "Processing...");
        };
        let outcome = self.client.run_default(&request, Some(&mut on_progress)).await;

        let mut result = CaseResult::new(case, test_id, case.images_needed.clone(), outcome);
        match result.outcome.first_artifact() {
            Some(url) => {
                let file_name = format!(
                    "{}_{}.{}",
                    result.test_id,
                    Local::now().format("%H%M%S"),
                    self.settings.output_format
                );
                let path = self
                    .output_dir
                    .join(category_dir(&case.category))
                    .join(file_name);
                match save_artifact(&self.client, url, &path).await {
                    Ok(()) => {
                        tracing::info!(test_id = %result.test_id, path = %path.display(), "Saved result");
                        result.output_file = Some(path);
                    }
                    Err(e) => {
                        tracing::warn!(test_id = %result.test_id, error = %e, "Could not download result");
                    }
                }
            }
            None => {
                tracing::warn!(
                    test_id = %result.test_id,
                    reason = result.outcome.failure_reason().as_deref().unwrap_or("unknown"),
                    "Scenario failed",
                );
            }
        }

        result
    }

    async fn load_images(&self, names: &[String]) -> Result<Vec<ImageRef>, HarnessError> {
        let mut images = Vec::with_capacity(names.len());
        for name in names {
            let path = self.image_dir.join(name);
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| HarnessError::io(&path, e))?;
            images.push(ImageRef::inline(bytes));
        }
        Ok(images)
    }
}

/// Download `url` and write it to `path`, creating parent directories.
pub async fn save_artifact<T: PredictionTransport>(
    client: &AsyncJobClient<T>,
    url: &str,
    path: &Path,
) -> Result<(), HarnessError> {
    let bytes = client.fetch_artifact(url).await?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| HarnessError::io(parent, e))?;
    }
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| HarnessError::io(path, e))
}

/// Directory name for a category: spaces become underscores.
pub fn category_dir(category: &str) -> String {
    category.replace(' ', "_")
}

fn local_failure(message: String) -> JobOutcome {
    JobOutcome::failed(
        None,
        JobError::Rejected {
            status: None,
            message,
        },
        Duration::ZERO,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_dir_replaces_spaces() {
        assert_eq!(category_dir("Photorealistic Integration"), "Photorealistic_Integration");
        assert_eq!(category_dir("Multi-Element"), "Multi-Element");
    }
}
