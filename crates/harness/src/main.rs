//! `muse` -- Qwen image-edit runner.
//!
//! Submits image-edit predictions to Replicate and polls them to
//! completion, either one at a time (`muse edit`) or across a scenario
//! catalog (`muse run`). `muse sheet` writes a blank evaluation sheet.
//!
//! # Environment variables
//!
//! | Variable                | Required | Default | Description                        |
//! |-------------------------|----------|---------|------------------------------------|
//! | `REPLICATE_API_TOKEN`   | yes      | --      | Bearer token for the Replicate API |
//! | `MUSE_MAX_WAIT_SECS`    | no       | `300`   | Per-job deadline                   |
//! | `MUSE_POLL_INTERVAL_MS` | no       | `1500`  | Pause between status polls         |
//! | `MUSE_MODEL`            | no       | `qwen/qwen-image-edit-plus` | Model to invoke |
//!
//! See `ReplicateConfig::from_env`, `PollConfig::from_env` and
//! `EditSettings::from_env` for the full list.

use clap::Parser;
use muse_core::catalog::Catalog;
use muse_core::job::ExecutionMode;
use muse_harness::cli::{Cli, Command, EditArgs, RunArgs};
use muse_harness::commands;
use muse_harness::runner::ScenarioRunner;
use muse_harness::settings::EditSettings;
use muse_replicate::config::{PollConfig, ReplicateConfig};
use muse_replicate::AsyncJobClient;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "muse=info,muse_harness=info,muse_replicate=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let ok = match cli.command {
        Command::Catalog { catalog } => {
            let catalog = load_catalog(&catalog);
            print!("{}", commands::render_catalog(&catalog));
            println!("\n{} scenarios in {} categories", catalog.len(), catalog.categories().len());
            true
        }
        Command::Sheet { catalog, out } => {
            let catalog = load_catalog(&catalog);
            let model = load_settings(false).model;
            match commands::write_blank_sheet(&catalog, &out, &model) {
                Ok(path) => {
                    println!("Evaluation sheet written to {}", path.display());
                    true
                }
                Err(e) => {
                    tracing::error!(error = %e, "Could not write evaluation sheet");
                    false
                }
            }
        }
        Command::Edit(args) => edit(args).await,
        Command::Run(args) => run(args).await,
    };

    if !ok {
        std::process::exit(1);
    }
}

async fn edit(args: EditArgs) -> bool {
    let mut settings = load_settings(args.high_fidelity);
    if let Some(aspect_ratio) = &args.aspect_ratio {
        settings = settings.with_aspect_ratio(aspect_ratio).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Invalid aspect ratio");
            std::process::exit(1);
        });
    }
    let client = build_client();

    let images = commands::load_edit_images(&args).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "Could not load input images");
        std::process::exit(1);
    });

    match commands::run_edit(&client, &settings, &args, images).await {
        Ok(report) => commands::print_edit_report(&report),
        Err(e) => {
            tracing::error!(error = %e, "Edit failed");
            false
        }
    }
}

async fn run(args: RunArgs) -> bool {
    let catalog = load_catalog(&args.catalog);
    let cases = commands::select_cases(&catalog, &args.categories, &args.ids).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid scenario selection");
        std::process::exit(1);
    });
    let settings = load_settings(args.high_fidelity);
    let model = settings.model.clone();

    tracing::info!(
        model = %model,
        scenarios = cases.len(),
        images = %args.images.display(),
        out = %args.out.display(),
        "Starting capability run",
    );

    let runner = ScenarioRunner::new(build_client(), settings, &args.images, &args.out)
        .with_seed(args.seed);

    match commands::run_catalog(&runner, &catalog, &cases, &args.out, &model).await {
        Ok(results) => {
            commands::print_summary(&results, &args.out);
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Capability run failed");
            false
        }
    }
}

fn build_client() -> AsyncJobClient {
    let config = ReplicateConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid Replicate configuration");
        std::process::exit(1);
    });
    let poll = PollConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid polling configuration");
        std::process::exit(1);
    });

    tracing::info!(
        base_url = %config.base_url,
        deadline_secs = poll.deadline.as_secs(),
        poll_interval_ms = poll.poll_interval.as_millis() as u64,
        "Replicate client configured",
    );

    AsyncJobClient::from_config(&config, poll).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build HTTP client");
        std::process::exit(1);
    })
}

fn load_settings(high_fidelity: bool) -> EditSettings {
    let mut settings = EditSettings::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid edit settings");
        std::process::exit(1);
    });
    if high_fidelity {
        settings.mode = ExecutionMode::HighFidelity;
    }
    settings
}

fn load_catalog(path: &std::path::Path) -> Catalog {
    Catalog::load(path).unwrap_or_else(|e| {
        tracing::error!(path = %path.display(), error = %e, "Failed to load catalog");
        std::process::exit(1);
    })
}
