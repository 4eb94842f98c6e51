//! Command-line interface for the `muse` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "muse")]
#[command(about = "Qwen image-edit jobs on Replicate: single edits and capability runs", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one edit and save the result
    Edit(EditArgs),

    /// Run scenarios from a catalog file
    Run(RunArgs),

    /// Write a blank evaluation sheet for a catalog without running it
    Sheet {
        /// Path to the catalog JSON file
        #[arg(long)]
        catalog: PathBuf,

        /// Directory for evaluation_sheet.md
        #[arg(long, default_value = "test_results")]
        out: PathBuf,
    },

    /// List the scenarios in a catalog file
    Catalog {
        /// Path to the catalog JSON file
        #[arg(long)]
        catalog: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct EditArgs {
    /// Edit instruction
    pub prompt: String,

    /// Input images in slot order (primary subject first, at most 3)
    #[arg(required_unless_present = "transcript")]
    pub images: Vec<PathBuf>,

    /// Take images from the last user message of a chat transcript
    #[arg(long, conflicts_with = "images")]
    pub transcript: Option<PathBuf>,

    /// Use 40 inference steps instead of 8
    #[arg(long)]
    pub high_fidelity: bool,

    /// Output aspect ratio (match_input_image, 1:1, 16:9, 9:16, 4:3, 3:4)
    #[arg(long)]
    pub aspect_ratio: Option<String>,

    /// Seed for reproducible output
    #[arg(long)]
    pub seed: Option<i64>,

    /// Directory for the downloaded result
    #[arg(long, default_value = ".")]
    pub out: PathBuf,

    /// Cancel the remote prediction if the deadline passes
    #[arg(long)]
    pub cancel_on_timeout: bool,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Path to the catalog JSON file
    #[arg(long)]
    pub catalog: PathBuf,

    /// Directory holding the images scenarios refer to
    #[arg(long, default_value = "test_images")]
    pub images: PathBuf,

    /// Directory for results, artifacts and the evaluation sheet
    #[arg(long, default_value = "test_results")]
    pub out: PathBuf,

    /// Only run these categories (repeatable)
    #[arg(long = "category")]
    pub categories: Vec<String>,

    /// Only run these scenario ids, in the order given (repeatable)
    #[arg(long = "id", conflicts_with = "categories")]
    pub ids: Vec<String>,

    /// Use 40 inference steps instead of 8
    #[arg(long)]
    pub high_fidelity: bool,

    /// Seed for reproducible output
    #[arg(long)]
    pub seed: Option<i64>,
}
