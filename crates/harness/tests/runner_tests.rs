//! End-to-end harness tests: catalog runs and single edits against a
//! canned transport, writing into temporary directories.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use muse_core::catalog::Catalog;
use muse_core::job::{ImageRef, JobError, JobState};
use muse_harness::cli::EditArgs;
use muse_harness::commands::{load_edit_images, run_catalog, run_edit, select_cases, write_blank_sheet};
use muse_harness::runner::ScenarioRunner;
use muse_harness::settings::EditSettings;
use muse_replicate::api::ReplicateApiError;
use muse_replicate::config::PollConfig;
use muse_replicate::prediction::Prediction;
use muse_replicate::transport::PredictionTransport;
use muse_replicate::AsyncJobClient;
use serde_json::{json, Value};

const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const RESULT_BYTES: &[u8] = b"edited-image";

// ---------------------------------------------------------------------------
// Canned transport
// ---------------------------------------------------------------------------

/// Every creation succeeds immediately (`finishes = true`) or stays
/// `processing` forever.
struct CannedTransport {
    finishes: bool,
    creates: AtomicUsize,
    inputs: Mutex<Vec<Value>>,
    canceled: Mutex<Vec<String>>,
}

impl CannedTransport {
    fn succeeding() -> Self {
        Self::new(true)
    }

    fn hanging() -> Self {
        Self::new(false)
    }

    fn new(finishes: bool) -> Self {
        Self {
            finishes,
            creates: AtomicUsize::new(0),
            inputs: Mutex::new(Vec::new()),
            canceled: Mutex::new(Vec::new()),
        }
    }
}

fn prediction(id: &str, status: &str, output: Value) -> Prediction {
    serde_json::from_value(json!({
        "id": id,
        "status": status,
        "urls": {
            "get": format!("mock://predictions/{id}"),
            "cancel": format!("mock://predictions/{id}/cancel")
        },
        "output": output
    }))
    .unwrap()
}

#[async_trait]
impl PredictionTransport for CannedTransport {
    async fn create(&self, _model: &str, input: &Value) -> Result<Prediction, ReplicateApiError> {
        let n = self.creates.fetch_add(1, Ordering::SeqCst) + 1;
        self.inputs.lock().unwrap().push(input.clone());
        let id = format!("p{n}");
        Ok(if self.finishes {
            prediction(&id, "succeeded", json!([format!("https://delivery/{id}.png")]))
        } else {
            prediction(&id, "starting", Value::Null)
        })
    }

    async fn fetch(&self, locator: &str) -> Result<Prediction, ReplicateApiError> {
        let id = locator.rsplit('/').next().unwrap_or_default();
        Ok(prediction(id, "processing", Value::Null))
    }

    async fn cancel(&self, locator: &str) -> Result<Prediction, ReplicateApiError> {
        self.canceled.lock().unwrap().push(locator.to_string());
        Ok(prediction("any", "canceled", Value::Null))
    }

    async fn fetch_artifact(&self, _url: &str) -> Result<Vec<u8>, ReplicateApiError> {
        Ok(RESULT_BYTES.to_vec())
    }

    fn status_locator(&self, id: &str) -> String {
        format!("mock://predictions/{id}")
    }

    fn cancel_locator(&self, id: &str) -> String {
        format!("mock://predictions/{id}/cancel")
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

const CATALOG: &str = r#"[
  {
    "id": "scale_001",
    "category": "Precise Scale",
    "name": "Sofa sizing",
    "difficulty": "hard",
    "images_needed": ["living_room.jpg"],
    "prompt": "Replace the sofa with a large sectional",
    "success_criteria": ["Sofa proportionally sized"],
    "failure_indicators": ["Sofa obviously wrong scale"]
  },
  {
    "id": "product_001",
    "category": "Product Replication",
    "name": "Chair from reference",
    "difficulty": "very_hard",
    "images_needed": ["living_room.jpg", "chair_reference.jpg"],
    "prompt": "Add the chair from image 2 next to the sofa"
  },
  {
    "id": "consistency_001",
    "category": "Consistency",
    "name": "Repeatability",
    "difficulty": "hard",
    "images_needed": ["living_room.jpg"],
    "prompt": "Add a fiddle leaf fig in the corner",
    "runs": 3
  }
]"#;

fn settings() -> EditSettings {
    EditSettings {
        case_pause: Duration::ZERO,
        ..EditSettings::default()
    }
}

fn poll() -> PollConfig {
    PollConfig {
        deadline: Duration::from_secs(10),
        poll_interval: Duration::from_secs(1),
        progress_interval: Duration::from_secs(5),
    }
}

fn image_dir_with(names: &[&str]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for name in names {
        std::fs::write(dir.path().join(name), PNG).unwrap();
    }
    dir
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn edit_args(out: &Path) -> EditArgs {
    EditArgs {
        prompt: "Change the sofa to blue velvet".into(),
        images: vec![],
        transcript: None,
        high_fidelity: false,
        aspect_ratio: None,
        seed: None,
        out: out.to_path_buf(),
        cancel_on_timeout: false,
    }
}

// ---------------------------------------------------------------------------
// Catalog runs
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn missing_images_fail_without_submitting() {
    let images = image_dir_with(&["living_room.jpg"]);
    let out = tempfile::tempdir().unwrap();
    let catalog = Catalog::from_json_str(CATALOG).unwrap();
    let runner = ScenarioRunner::new(
        AsyncJobClient::new(CannedTransport::succeeding(), poll()),
        settings(),
        images.path(),
        out.path(),
    );

    let case = catalog.find("product_001").unwrap();
    let result = runner.run_case(case, 1).await;

    assert!(!result.success);
    assert!(result.images_used.is_empty());
    assert_matches!(
        result.outcome.error(),
        Some(JobError::Rejected { status: None, message }) if message == "Missing images: chair_reference.jpg"
    );
    assert_eq!(runner.client().transport().creates.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn successful_case_saves_artifact_under_category_dir() {
    let images = image_dir_with(&["living_room.jpg"]);
    let out = tempfile::tempdir().unwrap();
    let catalog = Catalog::from_json_str(CATALOG).unwrap();
    let runner = ScenarioRunner::new(
        AsyncJobClient::new(CannedTransport::succeeding(), poll()),
        settings(),
        images.path(),
        out.path(),
    )
    .with_seed(Some(11));

    let result = runner.run_case(catalog.find("scale_001").unwrap(), 1).await;

    assert!(result.success);
    assert_eq!(result.images_used, vec!["living_room.jpg"]);
    let saved = result.output_file.expect("artifact saved");
    assert_eq!(saved.parent().unwrap(), out.path().join("Precise_Scale"));
    let file_name = saved.file_name().unwrap().to_string_lossy().into_owned();
    assert!(file_name.starts_with("scale_001_") && file_name.ends_with(".png"));
    assert_eq!(std::fs::read(&saved).unwrap(), RESULT_BYTES);

    let inputs = runner.client().transport().inputs.lock().unwrap();
    assert_eq!(inputs[0]["seed"], 11);
    assert_eq!(inputs[0]["aspect_ratio"], "match_input_image");
    assert!(inputs[0]["image"][0]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));
}

#[tokio::test(start_paused = true)]
async fn catalog_run_repeats_cases_and_writes_reports() {
    let images = image_dir_with(&["living_room.jpg"]);
    let out = tempfile::tempdir().unwrap();
    let catalog = Catalog::from_json_str(CATALOG).unwrap();
    let runner = ScenarioRunner::new(
        AsyncJobClient::new(CannedTransport::succeeding(), poll()),
        settings(),
        images.path(),
        out.path(),
    );

    let cases = select_cases(&catalog, &[], &[]).unwrap();
    let results = run_catalog(&runner, &catalog, &cases, out.path(), "qwen/qwen-image-edit-plus")
        .await
        .unwrap();

    let ids: Vec<&str> = results.iter().map(|r| r.test_id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "scale_001",
            "product_001",
            "consistency_001",
            "consistency_001_run2",
            "consistency_001_run3"
        ]
    );
    assert_eq!(results.iter().filter(|r| r.success).count(), 4);

    let json: Value =
        serde_json::from_str(&std::fs::read_to_string(out.path().join("test_results.json")).unwrap())
            .unwrap();
    assert_eq!(json["model"], "qwen/qwen-image-edit-plus");
    assert_eq!(json["total_tests"], 5);
    assert_eq!(json["successful"], 4);
    assert_eq!(json["results"][1]["test_id"], "product_001");
    assert_eq!(json["results"][1]["success"], false);

    let sheet = std::fs::read_to_string(out.path().join("evaluation_sheet.md")).unwrap();
    assert!(sheet.contains("**Test ID:** consistency_001_run3"));
    assert!(sheet.contains("- [ ] Sofa proportionally sized"));

    assert_eq!(files_in(&out.path().join("Consistency")).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn category_filter_limits_run() {
    let images = image_dir_with(&["living_room.jpg"]);
    let out = tempfile::tempdir().unwrap();
    let catalog = Catalog::from_json_str(CATALOG).unwrap();
    let runner = ScenarioRunner::new(
        AsyncJobClient::new(CannedTransport::succeeding(), poll()),
        settings(),
        images.path(),
        out.path(),
    );

    let cases = select_cases(&catalog, &["Precise Scale".to_string()], &[]).unwrap();
    let results = run_catalog(&runner, &catalog, &cases, out.path(), "qwen/qwen-image-edit-plus")
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].category, "Precise Scale");
}

#[tokio::test(start_paused = true)]
async fn id_selection_runs_only_named_scenarios() {
    let images = image_dir_with(&["living_room.jpg"]);
    let out = tempfile::tempdir().unwrap();
    let catalog = Catalog::from_json_str(CATALOG).unwrap();
    let runner = ScenarioRunner::new(
        AsyncJobClient::new(CannedTransport::succeeding(), poll()),
        settings(),
        images.path(),
        out.path(),
    );

    let cases = select_cases(&catalog, &[], &["scale_001".to_string()]).unwrap();
    let results = run_catalog(&runner, &catalog, &cases, out.path(), "qwen/qwen-image-edit-plus")
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].test_id, "scale_001");
    assert_eq!(runner.client().transport().creates.load(Ordering::SeqCst), 1);
}

#[test]
fn unknown_scenario_id_is_an_error() {
    let catalog = Catalog::from_json_str(CATALOG).unwrap();
    let err = select_cases(&catalog, &[], &["nope_999".to_string()]).unwrap_err();
    assert!(err.to_string().contains("nope_999"));
}

#[test]
fn blank_sheet_is_written_without_running_jobs() {
    let out = tempfile::tempdir().unwrap();
    let catalog = Catalog::from_json_str(CATALOG).unwrap();

    let path = write_blank_sheet(&catalog, &out.path().join("sheets"), "qwen/qwen-image-edit-plus")
        .unwrap();

    assert_eq!(path, out.path().join("sheets").join("evaluation_sheet.md"));
    let sheet = std::fs::read_to_string(&path).unwrap();
    assert_eq!(sheet.matches("**Status:** Not run").count(), catalog.len());
    assert!(sheet.contains("**Test ID:** consistency_001"));
    assert!(sheet.contains("Model: qwen/qwen-image-edit-plus"));
}

// ---------------------------------------------------------------------------
// Single edits
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn edit_downloads_timestamped_result() {
    let out = tempfile::tempdir().unwrap();
    let client = AsyncJobClient::new(CannedTransport::succeeding(), poll());
    let args = edit_args(out.path());

    let report = run_edit(&client, &settings(), &args, vec![ImageRef::inline(PNG.to_vec())])
        .await
        .unwrap();

    assert!(report.outcome.is_success());
    assert!(!report.canceled);
    let saved = report.saved.expect("result saved");
    let name = saved.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("result_") && name.ends_with(".png"));
    assert_eq!(std::fs::read(saved).unwrap(), RESULT_BYTES);
}

#[tokio::test(start_paused = true)]
async fn edit_timeout_cancels_only_when_asked() {
    let out = tempfile::tempdir().unwrap();

    let client = AsyncJobClient::new(CannedTransport::hanging(), poll());
    let report = run_edit(&client, &settings(), &edit_args(out.path()), vec![ImageRef::url("https://x/a.png")])
        .await
        .unwrap();
    assert_eq!(report.outcome.state(), JobState::TimedOut);
    assert!(!report.canceled);
    assert!(client.transport().canceled.lock().unwrap().is_empty());

    let client = AsyncJobClient::new(CannedTransport::hanging(), poll());
    let mut args = edit_args(out.path());
    args.cancel_on_timeout = true;
    let report = run_edit(&client, &settings(), &args, vec![ImageRef::url("https://x/a.png")])
        .await
        .unwrap();
    assert_eq!(report.outcome.state(), JobState::TimedOut);
    assert!(report.canceled);
    assert_eq!(
        *client.transport().canceled.lock().unwrap(),
        vec!["mock://predictions/p1/cancel".to_string()]
    );
    assert!(files_in(out.path()).is_empty());
}

#[tokio::test]
async fn edit_images_come_from_last_user_message_of_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let transcript = dir.path().join("chat.json");
    std::fs::write(
        &transcript,
        json!({
            "messages": [
                {"role": "user", "content": [
                    {"type": "image_url", "image_url": {"url": "https://x/old.png"}}
                ]},
                {"role": "assistant", "content": "Sure"},
                {"role": "user", "content": [
                    {"type": "text", "text": "put this chair in the room"},
                    {"type": "image_url", "image_url": {"url": "https://x/room.png"}},
                    {"type": "image_url", "image_url": {"url": "https://x/chair.png"}}
                ]}
            ]
        })
        .to_string(),
    )
    .unwrap();

    let mut args = edit_args(dir.path());
    args.transcript = Some(transcript);
    let images = load_edit_images(&args).await.unwrap();

    assert_eq!(
        images,
        vec![ImageRef::url("https://x/room.png"), ImageRef::url("https://x/chair.png")]
    );
}

#[tokio::test]
async fn transcript_without_images_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let transcript = dir.path().join("chat.json");
    std::fs::write(&transcript, r#"[{"role": "user", "content": "hello"}]"#).unwrap();

    let mut args = edit_args(dir.path());
    args.transcript = Some(transcript);
    assert!(load_edit_images(&args).await.is_err());
}
