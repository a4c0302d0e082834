//! Experiment configuration loaded from `config/experiment.toml`.
//!
//! Weights, thresholds, and the feature portfolio are configuration, not
//! code: the file is deserialized into strongly typed structs and validated
//! once at startup, never threaded through the core as untyped maps.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::Deserialize;

use crate::core::tier::{Tier, TierWeights};

/// One unit of assigned work. Defined in configuration; immutable.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Feature {
    pub id: String,
    pub subsystem: String,
    pub title: String,
    pub spec: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ExperimentMeta {
    /// Commit the reference tree must be pinned to.
    pub pin: String,
    pub pin_date: Option<String>,
    /// Coefficient-of-variation threshold for the wave gate.
    pub cv_threshold: f64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RunnerSpec {
    /// Test-runner argv prefix (e.g. `["pytest", "-q"]`).
    pub command: Vec<String>,
    /// Per-feature selector template; `{feature}` expands to the lowercased
    /// feature id.
    pub selector: String,
    /// Selector for a full cumulative-mode run.
    pub full_selector: String,
    /// Wall-clock budget per runner invocation.
    pub timeout_secs: u64,
    /// Truncate captured runner output beyond this many bytes.
    #[serde(default = "default_output_limit")]
    pub output_limit_bytes: usize,
}

fn default_output_limit() -> usize {
    50_000
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ExperimentConfig {
    pub experiment: ExperimentMeta,
    pub runner: RunnerSpec,
    pub weights: BTreeMap<Tier, f64>,
    pub features: Vec<Feature>,
}

static FEATURE_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^F\d+$").unwrap());

impl ExperimentConfig {
    /// Load and validate the experiment config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
        let config: ExperimentConfig = toml::from_str(&contents)
            .with_context(|| format!("parse config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("validate config {}", path.display()))?;
        Ok(config)
    }

    #[cfg(test)]
    pub fn parse_str(contents: &str) -> Result<Self> {
        let config: ExperimentConfig = toml::from_str(contents).context("parse config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.experiment.pin.trim().is_empty() {
            bail!("experiment.pin must be non-empty");
        }
        if self.experiment.cv_threshold <= 0.0 {
            bail!("experiment.cv_threshold must be > 0");
        }
        if self.runner.command.is_empty() || self.runner.command[0].trim().is_empty() {
            bail!("runner.command must be a non-empty array");
        }
        if !self.runner.selector.contains("{feature}") {
            bail!("runner.selector must contain a {{feature}} placeholder");
        }
        if self.runner.full_selector.trim().is_empty() {
            bail!("runner.full_selector must be non-empty");
        }
        if self.runner.timeout_secs == 0 {
            bail!("runner.timeout_secs must be > 0");
        }
        if self.runner.output_limit_bytes == 0 {
            bail!("runner.output_limit_bytes must be > 0");
        }
        self.tier_weights()?;
        if self.features.is_empty() {
            bail!("features must be a non-empty array");
        }
        for feature in &self.features {
            if !FEATURE_ID_RE.is_match(&feature.id) {
                bail!(
                    "feature id {} must match F<number> (the attribution grammar depends on it)",
                    feature.id
                );
            }
            if feature.subsystem.trim().is_empty() {
                bail!("feature {} subsystem must be non-empty", feature.id);
            }
            if feature.title.trim().is_empty() {
                bail!("feature {} title must be non-empty", feature.id);
            }
        }
        let mut ids: Vec<&str> = self.features.iter().map(|f| f.id.as_str()).collect();
        ids.sort_unstable();
        for pair in ids.windows(2) {
            if pair[0] == pair[1] {
                bail!("duplicate feature id {}", pair[0]);
            }
        }
        Ok(())
    }

    /// Validated composite weights.
    pub fn tier_weights(&self) -> Result<TierWeights> {
        TierWeights::new(self.weights.clone()).map_err(anyhow::Error::from)
    }

    /// Expand the per-feature selector template.
    pub fn feature_selector(&self, feature_id: &str) -> String {
        self.runner
            .selector
            .replace("{feature}", &feature_id.to_lowercase())
    }

    pub fn get_feature(&self, feature_id: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.id == feature_id)
    }
}
