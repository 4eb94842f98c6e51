//! Destinations for scenario results.
//!
//! A [`ResultSink`] sees every [`CaseResult`] as it is produced and is
//! told once when the run is over. Both file sinks buffer in memory and
//! write on [`finish`](ResultSink::finish).

use std::path::{Path, PathBuf};

use chrono::Utc;
use muse_core::catalog::Catalog;
use serde::Serialize;

use crate::error::HarnessError;
use crate::report::{render_evaluation_sheet, CaseResult};

pub trait ResultSink {
    fn record(&mut self, result: &CaseResult) -> Result<(), HarnessError>;

    fn finish(&mut self) -> Result<(), HarnessError>;
}

/// Writes `test_results.json`-style summaries.
pub struct JsonResultsSink {
    path: PathBuf,
    model: String,
    results: Vec<CaseResult>,
}

#[derive(Serialize)]
struct ResultsFile<'a> {
    generated_at: String,
    model: &'a str,
    total_tests: usize,
    successful: usize,
    failed: usize,
    results: &'a [CaseResult],
}

impl JsonResultsSink {
    pub fn new(path: impl Into<PathBuf>, model: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            model: model.into(),
            results: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for JsonResultsSink {
    fn record(&mut self, result: &CaseResult) -> Result<(), HarnessError> {
        self.results.push(result.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), HarnessError> {
        let successful = self.results.iter().filter(|r| r.success).count();
        let file = ResultsFile {
            generated_at: Utc::now().to_rfc3339(),
            model: &self.model,
            total_tests: self.results.len(),
            successful,
            failed: self.results.len() - successful,
            results: &self.results,
        };
        let json = serde_json::to_string_pretty(&file)?;
        write_file(&self.path, json)?;
        tracing::info!(path = %self.path.display(), results = self.results.len(), "Results saved");
        Ok(())
    }
}

/// Writes a Markdown sheet for scoring results by hand.
pub struct EvaluationSheetSink {
    path: PathBuf,
    model: String,
    catalog: Catalog,
    results: Vec<CaseResult>,
}

impl EvaluationSheetSink {
    pub fn new(path: impl Into<PathBuf>, model: impl Into<String>, catalog: Catalog) -> Self {
        Self {
            path: path.into(),
            model: model.into(),
            catalog,
            results: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for EvaluationSheetSink {
    fn record(&mut self, result: &CaseResult) -> Result<(), HarnessError> {
        self.results.push(result.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), HarnessError> {
        let sheet = render_evaluation_sheet(&self.results, &self.catalog, &self.model, Utc::now());
        write_file(&self.path, sheet)?;
        tracing::info!(path = %self.path.display(), "Evaluation sheet saved");
        Ok(())
    }
}

pub(crate) fn write_file(path: &Path, contents: String) -> Result<(), HarnessError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| HarnessError::io(parent, e))?;
    }
    std::fs::write(path, contents).map_err(|e| HarnessError::io(path, e))
}
