//! Scenario catalog for capability test runs.
//!
//! A catalog is a data-only JSON array of scenarios, each naming the
//! input images it needs, the edit prompt, and the rubric a human uses
//! to score the result. The catalog is loaded by the caller; the job
//! client never sees it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// How hard a scenario is expected to be for the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
    VeryHard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
            Self::VeryHard => "very_hard",
        }
    }
}

/// One named scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub category: String,
    pub name: String,
    pub difficulty: Difficulty,
    /// Input file names in slot order, resolved against the image directory.
    pub images_needed: Vec<String>,
    pub prompt: String,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub failure_indicators: Vec<String>,
    /// How many times to repeat the scenario (consistency checks).
    #[serde(default = "default_runs")]
    pub runs: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_runs() -> u32 {
    1
}

impl TestCase {
    /// Result id for a given run: the plain id for run 1, `<id>_runN` after.
    pub fn run_id(&self, run_number: u32) -> String {
        if run_number > 1 {
            format!("{}_run{run_number}", self.id)
        } else {
            self.id.clone()
        }
    }
}

/// Strip a `_runN` suffix produced by [`TestCase::run_id`].
pub fn base_case_id(run_id: &str) -> &str {
    match run_id.rsplit_once("_run") {
        Some((base, n)) if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => base,
        _ => run_id,
    }
}

/// An ordered collection of scenarios.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    cases: Vec<TestCase>,
}

impl Catalog {
    pub fn new(cases: Vec<TestCase>) -> Result<Self, CoreError> {
        let catalog = Self { cases };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Parse a catalog from a JSON array of scenarios.
    pub fn from_json_str(json: &str) -> Result<Self, CoreError> {
        let cases: Vec<TestCase> = serde_json::from_str(json).map_err(|e| CoreError::Malformed {
            what: "catalog",
            reason: e.to_string(),
        })?;
        Self::new(cases)
    }

    /// Read and parse a catalog file.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let json = std::fs::read_to_string(path).map_err(|e| CoreError::Malformed {
            what: "catalog",
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::from_json_str(&json)
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Look up a scenario by id, accepting `_runN` suffixed result ids.
    pub fn find(&self, id: &str) -> Result<&TestCase, CoreError> {
        let base = base_case_id(id);
        self.cases
            .iter()
            .find(|c| c.id == base)
            .ok_or_else(|| CoreError::NotFound {
                entity: "test case",
                id: id.to_string(),
            })
    }

    /// Scenarios in catalog order, restricted to `categories` when non-empty.
    pub fn select<'a, 'b>(&'a self, categories: &'b [String]) -> impl Iterator<Item = &'a TestCase> + 'b
    where
        'a: 'b,
    {
        self.cases
            .iter()
            .filter(move |c| categories.is_empty() || categories.iter().any(|cat| cat == &c.category))
    }

    /// Distinct categories in first-seen order.
    pub fn categories(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for case in &self.cases {
            if !seen.contains(&case.category.as_str()) {
                seen.push(&case.category);
            }
        }
        seen
    }

    fn validate(&self) -> Result<(), CoreError> {
        for (i, case) in self.cases.iter().enumerate() {
            if case.id.trim().is_empty() {
                return Err(CoreError::Validation(format!("Scenario #{i} has an empty id")));
            }
            if self.cases[..i].iter().any(|c| c.id == case.id) {
                return Err(CoreError::Validation(format!(
                    "Duplicate scenario id '{}'",
                    case.id
                )));
            }
            if case.prompt.trim().is_empty() {
                return Err(CoreError::Validation(format!(
                    "Scenario '{}' has an empty prompt",
                    case.id
                )));
            }
            if case.images_needed.is_empty() || case.images_needed.len() > crate::job::MAX_IMAGE_SLOTS {
                return Err(CoreError::Validation(format!(
                    "Scenario '{}' needs 1 to {} images, lists {}",
                    case.id,
                    crate::job::MAX_IMAGE_SLOTS,
                    case.images_needed.len()
                )));
            }
            if case.runs == 0 {
                return Err(CoreError::Validation(format!(
                    "Scenario '{}' must run at least once",
                    case.id
                )));
            }
        }
        Ok(())
    }
}
