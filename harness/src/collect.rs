//! One treatment's scoring run.
//!
//! The strict pipeline: verify clean → classify patch → apply → run tests →
//! parse report → aggregate → persist → revert. Revert is mandatory cleanup
//! on every exit path that mutated the tree, and a failed revert aborts the
//! whole run: the shared tree cannot be reused after it.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use crate::core::outcome::TestOutcome;
use crate::core::score::{PatchStatus, ScoringMode, TreatmentScoreSet, aggregate};
use crate::io::config::ExperimentConfig;
use crate::io::executor::TestRunner;
use crate::io::layout::DataLayout;
use crate::io::patch;
use crate::io::report::parse_report;
use crate::io::store::{self, CollectMeta, PatchRecord};
use crate::io::tree::RefTree;

/// Result of one collect run.
#[derive(Debug)]
pub struct CollectOutcome {
    pub set: TreatmentScoreSet,
    pub score_path: PathBuf,
    pub meta_path: PathBuf,
}

/// Score one treatment end-to-end and persist the result.
///
/// Per-feature failures (invalid patch, execution error) downgrade that
/// feature to an empty-tally record and the run continues; tree-integrity
/// failures and malformed reports abort before anything is persisted.
#[instrument(skip_all, fields(treatment_id, mode = %mode))]
pub fn collect_treatment(
    config: &ExperimentConfig,
    layout: &DataLayout,
    tree: &RefTree,
    runner: &dyn TestRunner,
    treatment_id: &str,
    mode: ScoringMode,
) -> Result<CollectOutcome> {
    info!("collect started");
    tree.verify_clean()
        .context("reference tree precondition")?;
    let tree_head = tree.head_sha().context("read tree HEAD")?;
    let started_at = Utc::now();

    let scratch = layout.report_scratch_dir();
    fs::create_dir_all(&scratch)
        .with_context(|| format!("create report scratch dir {}", scratch.display()))?;

    let mut errors: Vec<String> = Vec::new();
    let (records, outcomes) = match mode {
        ScoringMode::Isolated => {
            collect_isolated(config, layout, tree, runner, treatment_id, &mut errors)?
        }
        ScoringMode::Cumulative => {
            collect_cumulative(config, layout, tree, runner, treatment_id, &mut errors)?
        }
    };

    let statuses: BTreeMap<String, PatchStatus> = records
        .iter()
        .map(|(feature_id, record)| (feature_id.clone(), record.status))
        .collect();
    let scores = aggregate(treatment_id, &outcomes, &statuses);
    let set = TreatmentScoreSet {
        treatment_id: treatment_id.to_string(),
        mode,
        scores,
    };
    let score_path = store::save(layout, &set).context("persist scores")?;

    let finished_at = Utc::now();
    let duration = finished_at - started_at;
    let meta = CollectMeta {
        treatment_id: treatment_id.to_string(),
        mode,
        tree_head,
        started_at: started_at.to_rfc3339(),
        finished_at: finished_at.to_rfc3339(),
        duration_secs: duration.num_milliseconds() as f64 / 1000.0,
        patches: records,
        errors,
    };
    let meta_path = store::write_meta(layout, &meta).context("persist run metadata")?;

    info!(
        features = set.scores.len(),
        score_path = %score_path.display(),
        "collect complete"
    );
    Ok(CollectOutcome {
        set,
        score_path,
        meta_path,
    })
}

/// Isolated mode: each feature's patch is measured against a freshly
/// reverted tree.
fn collect_isolated(
    config: &ExperimentConfig,
    layout: &DataLayout,
    tree: &RefTree,
    runner: &dyn TestRunner,
    treatment_id: &str,
    errors: &mut Vec<String>,
) -> Result<(BTreeMap<String, PatchRecord>, Vec<TestOutcome>)> {
    let mut records = BTreeMap::new();
    let mut outcomes = Vec::new();

    for feature in &config.features {
        let patch_path = layout.patch_path(treatment_id, &feature.id);
        let status = patch::classify(&patch_path, tree)
            .with_context(|| format!("classify patch for {}", feature.id))?;
        let sha256 = if patch_path.exists() {
            Some(store::file_sha256(&patch_path)?)
        } else {
            None
        };
        records.insert(feature.id.clone(), PatchRecord { status, sha256 });

        if status != PatchStatus::Valid {
            debug!(feature = %feature.id, %status, "feature scored without a test run");
            continue;
        }

        if let Err(err) = tree.apply_patch(&patch_path) {
            // classify() dry-ran this same patch against the same state,
            // so this is unexpected; downgrade and move on.
            warn!(feature = %feature.id, %err, "apply failed after clean dry run");
            errors.push(format!("{}: apply: {err}", feature.id));
            if let Some(record) = records.get_mut(&feature.id) {
                record.status = PatchStatus::Invalid;
            }
            continue;
        }

        let selector = config.feature_selector(&feature.id);
        let report_path = layout.report_path(treatment_id, &feature.id);
        let run_result = runner.run(&selector, &report_path);

        // Mandatory cleanup before the result is even inspected: the tree
        // must not stay patched on any path out of this iteration.
        tree.revert().context("revert after scoring run")?;

        match run_result {
            Ok(()) => {
                let parsed = parse_report(&report_path)
                    .with_context(|| format!("parse report for {}", feature.id))?;
                for unattributable in &parsed.errors {
                    errors.push(format!(
                        "{}: {}: {}",
                        feature.id, unattributable.test_id, unattributable.reason
                    ));
                }
                outcomes.extend(parsed.outcomes);
            }
            Err(exec_err) => {
                warn!(feature = %feature.id, %exec_err, "test execution failed");
                errors.push(format!("{}: {exec_err}", feature.id));
            }
        }
    }

    Ok((records, outcomes))
}

/// Cumulative mode: the treatment's combined patch is applied once and the
/// full suite measured in one run.
fn collect_cumulative(
    config: &ExperimentConfig,
    layout: &DataLayout,
    tree: &RefTree,
    runner: &dyn TestRunner,
    treatment_id: &str,
    errors: &mut Vec<String>,
) -> Result<(BTreeMap<String, PatchRecord>, Vec<TestOutcome>)> {
    // Per-feature patches are still classified for the record, dry runs only.
    let mut records = BTreeMap::new();
    for feature in &config.features {
        let patch_path = layout.patch_path(treatment_id, &feature.id);
        let status = patch::classify(&patch_path, tree)
            .with_context(|| format!("classify patch for {}", feature.id))?;
        let sha256 = if patch_path.exists() {
            Some(store::file_sha256(&patch_path)?)
        } else {
            None
        };
        records.insert(feature.id.clone(), PatchRecord { status, sha256 });
    }

    let cumulative_path = layout.cumulative_patch_path(treatment_id);
    let cumulative_status =
        patch::classify(&cumulative_path, tree).context("classify cumulative patch")?;
    if cumulative_status != PatchStatus::Valid {
        warn!(%cumulative_status, "cumulative patch not applicable, scoring from statuses only");
        errors.push(format!("cumulative patch: {cumulative_status}"));
        return Ok((records, Vec::new()));
    }

    if let Err(err) = tree.apply_patch(&cumulative_path) {
        warn!(%err, "cumulative apply failed after clean dry run");
        errors.push(format!("cumulative patch: apply: {err}"));
        return Ok((records, Vec::new()));
    }

    let report_path = layout.report_path(treatment_id, "cumulative");
    let run_result = runner.run(&config.runner.full_selector, &report_path);

    tree.revert().context("revert after cumulative run")?;

    let outcomes = match run_result {
        Ok(()) => {
            let parsed = parse_report(&report_path).context("parse cumulative report")?;
            for unattributable in &parsed.errors {
                errors.push(format!(
                    "cumulative: {}: {}",
                    unattributable.test_id, unattributable.reason
                ));
            }
            parsed.outcomes
        }
        Err(exec_err) => {
            warn!(%exec_err, "cumulative test execution failed");
            errors.push(format!("cumulative: {exec_err}"));
            Vec::new()
        }
    };

    Ok((records, outcomes))
}
