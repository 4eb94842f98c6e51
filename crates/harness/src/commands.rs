//! Subcommand implementations. Console output here is the user-facing
//! report; diagnostics go through `tracing`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, Utc};
use muse_core::catalog::{Catalog, TestCase};
use muse_core::error::CoreError;
use muse_core::job::{ImageRef, JobOutcome, JobState, MAX_IMAGE_SLOTS};
use muse_core::transcript::{extract_images, parse_transcript};
use muse_replicate::transport::PredictionTransport;
use muse_replicate::AsyncJobClient;
use tokio::time::Instant;

use crate::cli::EditArgs;
use crate::error::HarnessError;
use crate::report::{render_blank_evaluation_sheet, CaseResult, Summary, EDIT_CHECKLIST};
use crate::runner::{save_artifact, ScenarioRunner};
use crate::settings::EditSettings;
use crate::sink::{write_file, EvaluationSheetSink, JsonResultsSink, ResultSink};

const BANNER_WIDTH: usize = 60;

fn banner() -> String {
    "=".repeat(BANNER_WIDTH)
}

// ---------------------------------------------------------------------------
// edit
// ---------------------------------------------------------------------------

/// What a single edit produced.
#[derive(Debug)]
pub struct EditReport {
    pub outcome: JobOutcome,
    pub saved: Option<PathBuf>,
    /// Whether a cancel was sent after a timeout.
    pub canceled: bool,
}

/// Resolve the edit's input images from files or a chat transcript.
pub async fn load_edit_images(args: &EditArgs) -> Result<Vec<ImageRef>, HarnessError> {
    if let Some(path) = &args.transcript {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| HarnessError::io(path, e))?;
        let messages = parse_transcript(&json)?;
        let images = extract_images(&messages, MAX_IMAGE_SLOTS);
        if images.is_empty() {
            return Err(CoreError::Validation(
                "No images found in the last user message".to_string(),
            )
            .into());
        }
        return Ok(images);
    }

    let mut images = Vec::with_capacity(args.images.len());
    for path in &args.images {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| HarnessError::io(path, e))?;
        images.push(ImageRef::inline(bytes));
    }
    Ok(images)
}

/// Submit one edit, wait for it, and download the first artifact into
/// `args.out`.
pub async fn run_edit<T: PredictionTransport>(
    client: &AsyncJobClient<T>,
    settings: &EditSettings,
    args: &EditArgs,
    images: Vec<ImageRef>,
) -> Result<EditReport, HarnessError> {
    let request = settings.request(&args.prompt, images, args.seed);

    println!("{}", banner());
    println!("Prompt: {}", preview(&args.prompt, 80));
    println!("Images: {}", request.images().len());
    println!("Mode:   {}", request.mode().label());
    println!("{}\n", banner());
    println!("Submitting to {}...", request.model());

    let started = Instant::now();
    let handle = match client.submit(&request).await {
        Ok(handle) => handle,
        Err(error) => {
            return Ok(EditReport {
                outcome: JobOutcome::failed(None, error, started.elapsed()),
                saved: None,
                canceled: false,
            })
        }
    };

    println!("Waiting for result (ID: {})...", handle.id());
    let mut on_progress = |elapsed: Duration| println!("Processing... ({}s)", elapsed.as_secs());
    let poll = client.poll_config();
    let outcome = client
        .await_completion(&handle, poll.deadline, poll.poll_interval, Some(&mut on_progress))
        .await;

    let mut canceled = false;
    if outcome.state() == JobState::TimedOut && args.cancel_on_timeout {
        match client.cancel(&handle).await {
            Ok(()) => canceled = true,
            Err(e) => tracing::warn!(job_id = %handle.id(), error = %e, "Cancel request failed"),
        }
    }

    let mut saved = None;
    if let Some(url) = outcome.first_artifact() {
        let path = args.out.join(format!(
            "result_{}.{}",
            Local::now().format("%Y%m%d_%H%M%S"),
            settings.output_format
        ));
        match save_artifact(client, url, &path).await {
            Ok(()) => saved = Some(path),
            Err(e) => tracing::warn!(url, error = %e, "Could not download result"),
        }
    }

    Ok(EditReport {
        outcome,
        saved,
        canceled,
    })
}

/// Print the result of [`run_edit`]. Returns whether the edit succeeded.
pub fn print_edit_report(report: &EditReport) -> bool {
    let outcome = &report.outcome;
    if let Some(reason) = outcome.failure_reason() {
        println!("\nError: {reason}");
        if report.canceled {
            println!("Remote prediction canceled.");
        }
        return false;
    }

    println!("\nDone in {:.1}s", outcome.elapsed().as_secs_f64());
    for url in outcome.artifacts() {
        println!("URL: {url}");
    }
    if let Some(path) = &report.saved {
        println!("Saved: {}", path.display());
    }

    println!("\n{}", banner());
    println!("EVALUATE:");
    for question in EDIT_CHECKLIST {
        println!("  - {question}");
    }
    println!("{}", banner());
    true
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

/// Scenarios named by `ids`, in the order given, or every scenario in
/// `categories` (all of them when empty) when no ids are given.
pub fn select_cases<'a>(
    catalog: &'a Catalog,
    categories: &[String],
    ids: &[String],
) -> Result<Vec<&'a TestCase>, HarnessError> {
    if ids.is_empty() {
        return Ok(catalog.select(categories).collect());
    }
    ids.iter()
        .map(|id| catalog.find(id).map_err(HarnessError::from))
        .collect()
}

/// Run the selected scenarios, then write `test_results.json` and
/// `evaluation_sheet.md` under `out`.
pub async fn run_catalog<T: PredictionTransport>(
    runner: &ScenarioRunner<T>,
    catalog: &Catalog,
    cases: &[&TestCase],
    out: &Path,
    model: &str,
) -> Result<Vec<CaseResult>, HarnessError> {
    if cases.is_empty() {
        tracing::warn!(
            available = ?catalog.categories(),
            "No scenarios match the requested selection",
        );
    }

    let mut sinks: Vec<Box<dyn ResultSink + Send>> = vec![
        Box::new(JsonResultsSink::new(out.join("test_results.json"), model)),
        Box::new(EvaluationSheetSink::new(
            out.join("evaluation_sheet.md"),
            model,
            catalog.clone(),
        )),
    ];

    let results = runner.run_all(cases, &mut sinks).await?;
    for sink in &mut sinks {
        sink.finish()?;
    }
    Ok(results)
}

pub fn print_summary(results: &[CaseResult], out: &Path) {
    println!("\n{}", banner());
    println!("TEST SUMMARY");
    println!("{}\n", banner());
    println!("{}", Summary::from_results(results));

    println!("\n{}", banner());
    println!("NEXT STEPS");
    println!("{}", banner());
    println!("1. Review generated images in {}/", out.display());
    println!("2. Fill out evaluation_sheet.md with scores");
    println!("3. Note patterns in what works vs. what doesn't");
}

// ---------------------------------------------------------------------------
// sheet
// ---------------------------------------------------------------------------

/// Write a blank `evaluation_sheet.md` for every scenario without
/// running anything. Returns the path written.
pub fn write_blank_sheet(catalog: &Catalog, out: &Path, model: &str) -> Result<PathBuf, HarnessError> {
    let path = out.join("evaluation_sheet.md");
    write_file(&path, render_blank_evaluation_sheet(catalog, model, Utc::now()))?;
    tracing::info!(path = %path.display(), scenarios = catalog.len(), "Blank evaluation sheet saved");
    Ok(path)
}

// ---------------------------------------------------------------------------
// catalog
// ---------------------------------------------------------------------------

/// One line per scenario: id, category, difficulty, images needed.
pub fn render_catalog(catalog: &Catalog) -> String {
    let mut out = format!(
        "{:<18} {:<28} {:<10} {}\n{}\n",
        "ID",
        "Category",
        "Difficulty",
        "Images",
        "-".repeat(80)
    );
    for case in catalog.cases() {
        let runs = if case.runs > 1 {
            format!(" (x{})", case.runs)
        } else {
            String::new()
        };
        out.push_str(&format!(
            "{:<18} {:<28} {:<10} {}{}\n",
            case.id,
            case.category,
            case.difficulty.as_str(),
            case.images_needed.join(", "),
            runs
        ));
    }
    out
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}
