//! Score persistence: one JSON record per `(treatment, scoring mode)` key.
//!
//! Scores are derived data, fully reproducible from patches and the pinned
//! tree, so the store is a cache for inspection, not irreplaceable record
//! keeping. Records are plain, diffable JSON.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::core::score::{PatchStatus, ScoringMode, TreatmentScoreSet};
use crate::io::layout::DataLayout;

/// Save a treatment's scores, replacing any prior record for the same
/// `(treatment, mode)` key. Full-replace, never an incremental merge.
pub fn save(layout: &DataLayout, set: &TreatmentScoreSet) -> Result<PathBuf> {
    let scores_dir = layout.scores_dir();
    fs::create_dir_all(&scores_dir)
        .with_context(|| format!("create scores dir {}", scores_dir.display()))?;
    let path = layout.score_path(&set.treatment_id, set.mode);
    let contents = serde_json::to_string_pretty(set).context("serialize scores")?;
    fs::write(&path, format!("{contents}\n"))
        .with_context(|| format!("write scores {}", path.display()))?;
    debug!(path = %path.display(), "scores saved");
    Ok(path)
}

pub fn load(
    layout: &DataLayout,
    treatment_id: &str,
    mode: ScoringMode,
) -> Result<Option<TreatmentScoreSet>> {
    let path = layout.score_path(treatment_id, mode);
    if !path.exists() {
        return Ok(None);
    }
    let contents =
        fs::read_to_string(&path).with_context(|| format!("read scores {}", path.display()))?;
    let set: TreatmentScoreSet =
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    Ok(Some(set))
}

static SCORE_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^treatment-(.+)\.(isolated|cumulative)\.json$").unwrap());

/// Load every persisted treatment for a mode, discovered from the score
/// file name pattern rather than a pre-known treatment list.
pub fn load_all(layout: &DataLayout, mode: ScoringMode) -> Result<BTreeMap<String, TreatmentScoreSet>> {
    let scores_dir = layout.scores_dir();
    if !scores_dir.exists() {
        return Ok(BTreeMap::new());
    }
    let mut sets = BTreeMap::new();
    for entry in fs::read_dir(&scores_dir)
        .with_context(|| format!("read scores dir {}", scores_dir.display()))?
    {
        let entry = entry.context("read scores entry")?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let Some(caps) = SCORE_FILE_RE.captures(&name) else {
            continue;
        };
        if &caps[2] != mode.as_str() {
            continue;
        }
        let treatment_id = caps[1].to_string();
        if let Some(set) = load(layout, &treatment_id, mode)? {
            sets.insert(treatment_id, set);
        }
    }
    Ok(sets)
}

/// Provenance fingerprint for one patch artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchRecord {
    pub status: PatchStatus,
    /// SHA-256 of the patch file, when one exists.
    pub sha256: Option<String>,
}

/// Provenance for one collect run, written next to the score record.
///
/// Given the same patches and the same pinned tree, re-running collection
/// must reproduce the scores up to test non-determinism; this is the
/// evidence needed to check that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectMeta {
    pub treatment_id: String,
    pub mode: ScoringMode,
    /// HEAD of the reference tree the run measured against.
    pub tree_head: String,
    pub started_at: String,
    pub finished_at: String,
    pub duration_secs: f64,
    pub patches: BTreeMap<String, PatchRecord>,
    /// Non-fatal per-feature failures (execution errors, unattributable
    /// test ids).
    pub errors: Vec<String>,
}

pub fn write_meta(layout: &DataLayout, meta: &CollectMeta) -> Result<PathBuf> {
    let scores_dir = layout.scores_dir();
    fs::create_dir_all(&scores_dir)
        .with_context(|| format!("create scores dir {}", scores_dir.display()))?;
    let path = layout.meta_path(&meta.treatment_id, meta.mode);
    let contents = serde_json::to_string_pretty(meta).context("serialize meta")?;
    fs::write(&path, format!("{contents}\n"))
        .with_context(|| format!("write meta {}", path.display()))?;
    Ok(path)
}

pub fn file_sha256(path: &Path) -> Result<String> {
    let contents = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(contents);
    Ok(hex::encode(hasher.finalize()))
}
