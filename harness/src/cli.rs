//! CLI command implementations.

use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::collect::collect_treatment;
use crate::core::gate::decide;
use crate::core::score::ScoringMode;
use crate::core::summary::summarize_all;
use crate::io::config::ExperimentConfig;
use crate::io::executor::{ExecutionLimits, PytestRunner};
use crate::io::layout::DataLayout;
use crate::io::patch::verify_treatment;
use crate::io::store::load_all;
use crate::io::tree::{self, RefTree};

/// Check the reference checkout against the configured pin.
pub fn preflight(config_path: &Path, tree_dir: &Path) -> Result<()> {
    let config = ExperimentConfig::load(config_path)?;
    let report = tree::preflight(tree_dir, &config.experiment.pin);
    if let Some(head) = &report.head {
        println!("preflight: head={head}");
    }
    if report.ok() {
        println!("preflight: ok pin={}", config.experiment.pin);
        return Ok(());
    }
    for issue in &report.issues {
        println!("preflight: issue {issue}");
    }
    bail!("preflight found {} issue(s)", report.issues.len());
}

/// Classify every feature patch for a treatment without mutating the tree.
pub fn verify(config_path: &Path, data_dir: &Path, tree_dir: &Path, treatment_id: &str) -> Result<()> {
    let config = ExperimentConfig::load(config_path)?;
    let layout = DataLayout::new(data_dir);
    let tree = RefTree::new(tree_dir);
    tree.verify_clean().context("reference tree precondition")?;

    let statuses = verify_treatment(&layout, &tree, treatment_id, &config.features)?;
    for (feature_id, status) in &statuses {
        println!("verify: treatment={treatment_id} feature={feature_id} status={status}");
    }
    Ok(())
}

/// Score one treatment: apply patches, run the suite, persist scores.
pub fn collect(
    config_path: &Path,
    data_dir: &Path,
    tree_dir: &Path,
    treatment_id: &str,
    mode: ScoringMode,
) -> Result<()> {
    let config = ExperimentConfig::load(config_path)?;
    let layout = DataLayout::new(data_dir);
    let tree = RefTree::new(tree_dir);
    tree.verify_pin(&config.experiment.pin)
        .context("reference tree pin")?;
    let runner = PytestRunner::new(
        config.runner.command.clone(),
        tree_dir,
        ExecutionLimits::new(config.runner.timeout_secs, config.runner.output_limit_bytes),
    );
    debug!(treatment_id, %mode, "collect configured");

    let outcome = collect_treatment(&config, &layout, &tree, &runner, treatment_id, mode)
        .context("collect treatment")?;

    let weights = config.tier_weights()?;
    for score in &outcome.set.scores {
        println!(
            "collect: treatment={} feature={} status={} composite={:.4}",
            treatment_id,
            score.feature_id,
            score.patch_status,
            score.composite(&weights)
        );
    }
    println!(
        "collect: treatment={} mode={} scores={}",
        treatment_id,
        mode,
        outcome.score_path.display()
    );
    Ok(())
}

/// Show composite summaries for every persisted treatment.
pub fn report(config_path: &Path, data_dir: &Path, mode: ScoringMode) -> Result<()> {
    let config = ExperimentConfig::load(config_path)?;
    let layout = DataLayout::new(data_dir);
    let weights = config.tier_weights()?;

    let sets = load_all(&layout, mode)?;
    if sets.is_empty() {
        println!("report: mode={mode} treatments=0");
        return Ok(());
    }
    let summaries = summarize_all(&sets, &weights);
    for (treatment_id, summary) in &summaries {
        println!(
            "report: treatment={} n_features={} mean={:.4} min={:.4} max={:.4}",
            treatment_id,
            summary.n_features,
            summary.mean_composite,
            summary.min_composite,
            summary.max_composite
        );
        for (feature_id, composite) in &summary.per_feature {
            println!("report:   feature={feature_id} composite={composite:.4}");
        }
    }
    Ok(())
}

/// Evaluate the wave gate across all persisted treatments.
pub fn wave_decision(
    config_path: &Path,
    data_dir: &Path,
    mode: ScoringMode,
    threshold_override: Option<f64>,
) -> Result<()> {
    let config = ExperimentConfig::load(config_path)?;
    let layout = DataLayout::new(data_dir);
    let weights = config.tier_weights()?;
    let cv_threshold = threshold_override.unwrap_or(config.experiment.cv_threshold);

    let sets = load_all(&layout, mode)?;
    let summaries = summarize_all(&sets, &weights);
    let means = summaries
        .iter()
        .map(|(treatment_id, summary)| (treatment_id.clone(), summary.mean_composite))
        .collect();

    let decision = decide(&means, cv_threshold);
    info!(recommend = decision.recommend(), "wave gate evaluated");
    println!("decide: mode={mode} recommend={}", decision.recommend());
    println!("decide: {}", decision.reasoning(cv_threshold));
    Ok(())
}
