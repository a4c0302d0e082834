//! Data-directory layout for patches, scores, and run metadata.

use std::path::{Path, PathBuf};

use crate::core::score::ScoringMode;

/// Resolves where patch artifacts, score records, and scratch reports live
/// under one data directory.
#[derive(Debug, Clone)]
pub struct DataLayout {
    data_dir: PathBuf,
}

impl DataLayout {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn patch_dir(&self, treatment_id: &str) -> PathBuf {
        self.data_dir
            .join("patches")
            .join(format!("treatment-{treatment_id}"))
    }

    pub fn patch_path(&self, treatment_id: &str, feature_id: &str) -> PathBuf {
        self.patch_dir(treatment_id).join(format!("{feature_id}.patch"))
    }

    /// Combined patch for cumulative-mode scoring.
    pub fn cumulative_patch_path(&self, treatment_id: &str) -> PathBuf {
        self.patch_dir(treatment_id).join("cumulative.patch")
    }

    pub fn scores_dir(&self) -> PathBuf {
        self.data_dir.join("scores")
    }

    pub fn score_path(&self, treatment_id: &str, mode: ScoringMode) -> PathBuf {
        self.scores_dir()
            .join(format!("treatment-{treatment_id}.{mode}.json"))
    }

    pub fn meta_path(&self, treatment_id: &str, mode: ScoringMode) -> PathBuf {
        self.scores_dir()
            .join(format!("treatment-{treatment_id}.{mode}.meta.json"))
    }

    pub fn report_scratch_dir(&self) -> PathBuf {
        self.scores_dir().join("tmp")
    }

    pub fn report_path(&self, treatment_id: &str, label: &str) -> PathBuf {
        self.report_scratch_dir()
            .join(format!("treatment-{treatment_id}-{label}.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_are_stable() {
        let layout = DataLayout::new("/data");
        assert_eq!(
            layout.patch_path("0a", "F1"),
            PathBuf::from("/data/patches/treatment-0a/F1.patch")
        );
        assert_eq!(
            layout.score_path("0a", ScoringMode::Isolated),
            PathBuf::from("/data/scores/treatment-0a.isolated.json")
        );
        assert_eq!(
            layout.meta_path("5", ScoringMode::Cumulative),
            PathBuf::from("/data/scores/treatment-5.cumulative.meta.json")
        );
        assert_eq!(
            layout.report_path("0a", "F1"),
            PathBuf::from("/data/scores/tmp/treatment-0a-F1.json")
        );
    }

    #[test]
    fn cumulative_patch_lives_beside_feature_patches() {
        let layout = DataLayout::new("/data");
        assert_eq!(
            layout.cumulative_patch_path("3"),
            PathBuf::from("/data/patches/treatment-3/cumulative.patch")
        );
    }
}
