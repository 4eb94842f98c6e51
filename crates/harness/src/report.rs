//! Scenario results and the human-facing reports built from them.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use muse_core::catalog::{base_case_id, Catalog, Difficulty, TestCase};
use muse_core::job::JobOutcome;
use serde::Serialize;

/// Questions printed after a single ad-hoc edit.
pub const EDIT_CHECKLIST: &[&str] = &[
    "Does it match your intent?",
    "Are preserved elements actually preserved?",
    "Is the scale/proportion reasonable?",
    "Are materials/textures realistic?",
    "Any artifacts or obvious AI tells?",
];

const SCORING_GUIDE: &[&str] = &[
    "- **5**: Excellent - Meets all criteria, production quality",
    "- **4**: Good - Minor issues, usable for concept work",
    "- **3**: Acceptable - Noticeable issues but intent clear",
    "- **2**: Poor - Major issues, needs regeneration",
    "- **1**: Failed - Unusable result",
];

/// One scenario run: the job outcome plus the scenario it came from.
#[derive(Debug, Clone, Serialize)]
pub struct CaseResult {
    pub test_id: String,
    pub category: String,
    pub name: String,
    pub difficulty: Difficulty,
    pub prompt: String,
    /// Input file names actually sent, in slot order.
    pub images_used: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    pub outcome: JobOutcome,
    /// Where the first artifact was saved, if the download worked.
    pub output_file: Option<PathBuf>,
}

impl CaseResult {
    pub fn new(case: &TestCase, test_id: String, images_used: Vec<String>, outcome: JobOutcome) -> Self {
        Self {
            test_id,
            category: case.category.clone(),
            name: case.name.clone(),
            difficulty: case.difficulty,
            prompt: case.prompt.clone(),
            images_used,
            timestamp: Utc::now(),
            success: outcome.is_success(),
            outcome,
            output_file: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Console summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySummary {
    pub category: String,
    pub passed: usize,
    pub failed: usize,
}

impl CategorySummary {
    pub fn total(&self) -> usize {
        self.passed + self.failed
    }
}

/// Pass/fail counts per category (in first-seen order) and overall.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub categories: Vec<CategorySummary>,
    pub passed: usize,
    pub total: usize,
    /// Mean elapsed time over successful runs only.
    pub average_success_secs: f64,
}

impl Summary {
    pub fn from_results(results: &[CaseResult]) -> Self {
        let mut categories: Vec<CategorySummary> = Vec::new();
        for r in results {
            let idx = match categories.iter().position(|c| c.category == r.category) {
                Some(idx) => idx,
                None => {
                    categories.push(CategorySummary {
                        category: r.category.clone(),
                        passed: 0,
                        failed: 0,
                    });
                    categories.len() - 1
                }
            };
            if r.success {
                categories[idx].passed += 1;
            } else {
                categories[idx].failed += 1;
            }
        }

        let passed = results.iter().filter(|r| r.success).count();
        let success_secs: f64 = results
            .iter()
            .filter(|r| r.success)
            .map(|r| r.outcome.elapsed().as_secs_f64())
            .sum();

        Self {
            categories,
            passed,
            total: results.len(),
            average_success_secs: success_secs / passed.max(1) as f64,
        }
    }
}

fn rate(passed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        passed as f64 / total as f64 * 100.0
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "-".repeat(56);
        writeln!(f, "{:<30} {:<8} {:<8} {:<10}", "Category", "Pass", "Fail", "Rate")?;
        writeln!(f, "{rule}")?;
        for c in &self.categories {
            writeln!(
                f,
                "{:<30} {:<8} {:<8} {:.0}%",
                c.category,
                c.passed,
                c.failed,
                rate(c.passed, c.total())
            )?;
        }
        writeln!(f, "{rule}")?;
        writeln!(
            f,
            "{:<30} {:<8} {:<8} {:.0}%",
            "TOTAL",
            self.passed,
            self.total - self.passed,
            rate(self.passed, self.total)
        )?;
        write!(f, "\nAverage generation time: {:.1}s", self.average_success_secs)
    }
}

// ---------------------------------------------------------------------------
// Evaluation sheet
// ---------------------------------------------------------------------------

/// One scenario section of the evaluation sheet.
struct SheetEntry<'a> {
    test_id: &'a str,
    category: &'a str,
    name: &'a str,
    difficulty: Difficulty,
    prompt: &'a str,
    status: &'static str,
    error: Option<String>,
    output_file: Option<&'a Path>,
}

/// Markdown sheet for scoring results by hand. Criteria come from the
/// catalog entry each result was run from.
pub fn render_evaluation_sheet(
    results: &[CaseResult],
    catalog: &Catalog,
    model: &str,
    generated_at: DateTime<Utc>,
) -> String {
    let entries = results.iter().map(|r| SheetEntry {
        test_id: &r.test_id,
        category: &r.category,
        name: &r.name,
        difficulty: r.difficulty,
        prompt: &r.prompt,
        status: if r.success { "Generated" } else { "Failed" },
        error: r.outcome.failure_reason(),
        output_file: r.output_file.as_deref(),
    });
    render_sheet(entries, catalog, model, generated_at)
}

/// The same sheet with one unscored section per catalog scenario, for
/// scoring outputs produced elsewhere.
pub fn render_blank_evaluation_sheet(
    catalog: &Catalog,
    model: &str,
    generated_at: DateTime<Utc>,
) -> String {
    let entries = catalog.cases().iter().map(|case| SheetEntry {
        test_id: &case.id,
        category: &case.category,
        name: &case.name,
        difficulty: case.difficulty,
        prompt: &case.prompt,
        status: "Not run",
        error: None,
        output_file: None,
    });
    render_sheet(entries, catalog, model, generated_at)
}

fn render_sheet<'a>(
    entries: impl Iterator<Item = SheetEntry<'a>>,
    catalog: &Catalog,
    model: &str,
    generated_at: DateTime<Utc>,
) -> String {
    let mut lines: Vec<String> = vec![
        "# MUSE Model Evaluation Sheet".into(),
        format!("\nGenerated: {}", generated_at.to_rfc3339()),
        format!("\nModel: {model}"),
        "\n---\n".into(),
        "## Scoring Guide".into(),
    ];
    lines.extend(SCORING_GUIDE.iter().map(|s| s.to_string()));
    lines.push("\n---\n".into());

    let mut current_category: Option<&str> = None;
    for e in entries {
        if current_category != Some(e.category) {
            current_category = Some(e.category);
            lines.push(format!("\n## {}\n", e.category));
        }

        lines.push(format!("### {}", e.name));
        lines.push(format!("**Test ID:** {}", e.test_id));
        lines.push(format!("**Difficulty:** {}", e.difficulty.as_str()));
        lines.push(format!("**Status:** {}", e.status));
        if let Some(reason) = e.error {
            lines.push(format!("**Error:** {reason}"));
        }
        if let Some(file) = e.output_file {
            lines.push(format!("**Output:** `{}`", file.display()));
        }
        lines.push(format!("\n**Prompt:**\n> {}\n", e.prompt));

        if let Ok(case) = catalog.find(base_case_id(e.test_id)) {
            lines.push("**Success Criteria:**".into());
            lines.extend(case.success_criteria.iter().map(|c| format!("- [ ] {c}")));
            lines.push("\n**Failure Indicators:**".into());
            lines.extend(case.failure_indicators.iter().map(|c| format!("- [ ] {c}")));
        }

        lines.push("\n**Score:** ___/5".into());
        lines.push("\n**Notes:**\n```\n\n```".into());
        lines.push("\n---\n".into());
    }

    lines.join("\n")
}
