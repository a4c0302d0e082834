//! Patch artifact classification.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::score::PatchStatus;
use crate::io::config::Feature;
use crate::io::layout::DataLayout;
use crate::io::tree::RefTree;

/// Classify one patch artifact against the current clean tree.
///
/// `Missing` and `Empty` (zero bytes or whitespace only) are valid "agent
/// declined" signals, not errors. `Valid`/`Invalid` come from a
/// `git apply --check` dry run, which never leaves modifications on disk
/// whatever the outcome.
pub fn classify(patch_path: &Path, tree: &RefTree) -> Result<PatchStatus> {
    if !patch_path.exists() {
        return Ok(PatchStatus::Missing);
    }
    let contents = fs::read(patch_path)
        .with_context(|| format!("read patch {}", patch_path.display()))?;
    if contents.iter().all(|byte| byte.is_ascii_whitespace()) {
        return Ok(PatchStatus::Empty);
    }
    match tree.check_patch(patch_path) {
        Ok(()) => Ok(PatchStatus::Valid),
        Err(err) => {
            debug!(patch = %patch_path.display(), %err, "dry run rejected patch");
            Ok(PatchStatus::Invalid)
        }
    }
}

/// Classify every configured feature's patch for one treatment.
///
/// Returns the full feature-to-status map: features without a patch file
/// appear as `Missing` rather than being omitted.
pub fn verify_treatment(
    layout: &DataLayout,
    tree: &RefTree,
    treatment_id: &str,
    features: &[Feature],
) -> Result<BTreeMap<String, PatchStatus>> {
    let mut statuses = BTreeMap::new();
    for feature in features {
        let patch_path = layout.patch_path(treatment_id, &feature.id);
        let status = classify(&patch_path, tree)?;
        statuses.insert(feature.id.clone(), status);
    }
    Ok(statuses)
}
