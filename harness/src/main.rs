//! Scoring harness for agent-coding experiments.
//!
//! Scores agent-produced patches against a pinned reference checkout:
//! applies each patch, runs the tiered acceptance suite, persists weighted
//! composite scores, and evaluates the cross-treatment variance gate.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use harness::cli;
use harness::core::score::ScoringMode;

#[derive(Parser)]
#[command(
    name = "harness",
    version,
    about = "Scoring harness for agent-coding experiments"
)]
struct Cli {
    /// Experiment configuration file.
    #[arg(long, default_value = "config/experiment.toml")]
    config: PathBuf,

    /// Directory holding patches and score records.
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Checkout of the pinned reference codebase.
    #[arg(long, default_value = "reference")]
    tree: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check the reference checkout: present, pinned, clean.
    Preflight,
    /// Classify a treatment's patches without mutating the tree.
    Verify { treatment_id: String },
    /// Apply patches, run the suite, and persist scores for a treatment.
    Collect {
        treatment_id: String,
        #[arg(long, default_value = "isolated")]
        mode: ScoringMode,
    },
    /// Show composite summaries for every persisted treatment.
    Report {
        #[arg(long, default_value = "isolated")]
        mode: ScoringMode,
    },
    /// Evaluate the next-wave variance gate.
    Decide {
        #[arg(long, default_value = "isolated")]
        mode: ScoringMode,
        /// Override the configured CV threshold.
        #[arg(long)]
        threshold: Option<f64>,
    },
}

fn main() -> Result<()> {
    harness::logging::init();
    let args = Cli::parse();
    match args.command {
        Command::Preflight => cli::preflight(&args.config, &args.tree),
        Command::Verify { treatment_id } => {
            cli::verify(&args.config, &args.data_dir, &args.tree, &treatment_id)
        }
        Command::Collect { treatment_id, mode } => cli::collect(
            &args.config,
            &args.data_dir,
            &args.tree,
            &treatment_id,
            mode,
        ),
        Command::Report { mode } => cli::report(&args.config, &args.data_dir, mode),
        Command::Decide { mode, threshold } => {
            cli::wave_decision(&args.config, &args.data_dir, mode, threshold)
        }
    }
}
