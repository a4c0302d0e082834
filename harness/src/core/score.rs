//! Tiered scores: aggregation of observed outcomes and weighted composites.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::outcome::TestOutcome;
use crate::core::tier::{Tier, TierWeights};

/// State of one patch artifact at verification time.
///
/// Derived on demand from the patch file and the tree, and additionally
/// recorded on persisted scores so `Missing` and `Empty` (agent declined)
/// stay distinguishable after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStatus {
    Missing,
    Empty,
    Valid,
    Invalid,
}

impl PatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PatchStatus::Missing => "missing",
            PatchStatus::Empty => "empty",
            PatchStatus::Valid => "valid",
            PatchStatus::Invalid => "invalid",
        }
    }
}

impl fmt::Display for PatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scoring protocol for a collection run.
///
/// Isolated: each feature's patch is measured against a freshly reverted
/// tree. Cumulative: one combined patch, one shared measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMode {
    Isolated,
    Cumulative,
}

impl ScoringMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ScoringMode::Isolated => "isolated",
            ScoringMode::Cumulative => "cumulative",
        }
    }
}

impl fmt::Display for ScoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScoringMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "isolated" => Ok(ScoringMode::Isolated),
            "cumulative" => Ok(ScoringMode::Cumulative),
            other => Err(format!("unknown scoring mode '{other}'")),
        }
    }
}

/// Passed/total counts for one observed tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTally {
    pub passed: u32,
    pub total: u32,
}

impl TierTally {
    pub fn ratio(self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            f64::from(self.passed) / f64::from(self.total)
        }
    }
}

/// Per-feature, per-treatment aggregate for one collection run.
///
/// Tier tallies count only outcomes actually observed in that run; a tier
/// with no observed tests is absent from the map, never defaulted from
/// configuration. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieredScore {
    pub feature_id: String,
    pub treatment_id: String,
    pub patch_status: PatchStatus,
    #[serde(default)]
    pub tiers: BTreeMap<Tier, TierTally>,
}

impl TieredScore {
    /// A record with no observed outcomes (composite 0).
    pub fn empty(feature_id: &str, treatment_id: &str, patch_status: PatchStatus) -> Self {
        Self {
            feature_id: feature_id.to_string(),
            treatment_id: treatment_id.to_string(),
            patch_status,
            tiers: BTreeMap::new(),
        }
    }

    /// Weighted composite in [0, 1]: `Σ weight[tier] * passed/total` over
    /// tiers with observed tests. An unobserved tier contributes nothing
    /// and its weight is not redistributed over the remaining tiers.
    pub fn composite(&self, weights: &TierWeights) -> f64 {
        self.tiers
            .iter()
            .filter(|(_, tally)| tally.total > 0)
            .map(|(tier, tally)| weights.get(*tier) * tally.ratio())
            .sum()
    }
}

/// One addressable persisted unit: all feature scores for a
/// `(treatment, mode)` key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentScoreSet {
    pub treatment_id: String,
    pub mode: ScoringMode,
    pub scores: Vec<TieredScore>,
}

impl TreatmentScoreSet {
    pub fn get(&self, feature_id: &str) -> Option<&TieredScore> {
        self.scores.iter().find(|s| s.feature_id == feature_id)
    }
}

/// Fold parsed outcomes into per-feature scores, ordered by feature id.
///
/// Every feature present in `statuses` gets a record even when no outcome
/// was observed for it, so a terminal state is never a silent omission. An
/// outcome for a feature outside `statuses` still produces a record (status
/// `Missing`), so observed data is never discarded.
pub fn aggregate(
    treatment_id: &str,
    outcomes: &[TestOutcome],
    statuses: &BTreeMap<String, PatchStatus>,
) -> Vec<TieredScore> {
    let mut by_feature: BTreeMap<String, TieredScore> = statuses
        .iter()
        .map(|(feature_id, status)| {
            (
                feature_id.clone(),
                TieredScore::empty(feature_id, treatment_id, *status),
            )
        })
        .collect();

    for outcome in outcomes {
        let score = by_feature
            .entry(outcome.feature_id.clone())
            .or_insert_with(|| {
                TieredScore::empty(&outcome.feature_id, treatment_id, PatchStatus::Missing)
            });
        let tally = score.tiers.entry(outcome.tier).or_default();
        tally.total += 1;
        if outcome.status.passed() {
            tally.passed += 1;
        }
    }

    by_feature.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::outcome::TestStatus;

    fn default_weights() -> TierWeights {
        TierWeights::new(
            [
                (Tier::Basic, 0.15),
                (Tier::EdgeCase, 0.35),
                (Tier::Quality, 0.30),
                (Tier::Smoke, 0.20),
            ]
            .into_iter()
            .collect(),
        )
        .expect("weights")
    }

    fn score_with(tallies: &[(Tier, u32, u32)]) -> TieredScore {
        TieredScore {
            feature_id: "F1".to_string(),
            treatment_id: "0a".to_string(),
            patch_status: PatchStatus::Valid,
            tiers: tallies
                .iter()
                .map(|(tier, passed, total)| {
                    (
                        *tier,
                        TierTally {
                            passed: *passed,
                            total: *total,
                        },
                    )
                })
                .collect(),
        }
    }

    fn outcome(test_id: &str, feature: &str, tier: Tier, status: TestStatus) -> TestOutcome {
        TestOutcome {
            test_id: test_id.to_string(),
            feature_id: feature.to_string(),
            tier,
            status,
            duration_secs: None,
        }
    }

    #[test]
    fn perfect_score_composites_to_one() {
        let score = score_with(&[
            (Tier::Basic, 3, 3),
            (Tier::EdgeCase, 5, 5),
            (Tier::Quality, 3, 3),
            (Tier::Smoke, 2, 2),
        ]);
        assert!((score.composite(&default_weights()) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_score_composites_to_zero() {
        let score = score_with(&[
            (Tier::Basic, 0, 3),
            (Tier::EdgeCase, 0, 5),
            (Tier::Quality, 0, 3),
            (Tier::Smoke, 0, 2),
        ]);
        assert_eq!(score.composite(&default_weights()), 0.0);
    }

    #[test]
    fn weighted_combination() {
        let score = score_with(&[
            (Tier::Basic, 3, 3),
            (Tier::EdgeCase, 3, 5),
            (Tier::Quality, 2, 3),
            (Tier::Smoke, 1, 2),
        ]);
        let expected = 0.15 + 0.6 * 0.35 + (2.0 / 3.0) * 0.30 + 0.5 * 0.20;
        assert!((score.composite(&default_weights()) - expected).abs() < 1e-9);
    }

    #[test]
    fn composite_ignores_unobserved_tiers() {
        // No re-normalization: only the basic tier was observed, so the
        // composite is capped at that tier's weight.
        let score = score_with(&[(Tier::Basic, 3, 3)]);
        assert!((score.composite(&default_weights()) - 0.15).abs() < 1e-9);
    }

    #[test]
    fn empty_record_composites_to_zero() {
        let score = TieredScore::empty("F1", "0a", PatchStatus::Missing);
        assert_eq!(score.composite(&default_weights()), 0.0);
    }

    #[test]
    fn composite_monotone_in_passed_count() {
        let weights = default_weights();
        let lower = score_with(&[(Tier::EdgeCase, 2, 5), (Tier::Quality, 1, 3)]);
        let higher = score_with(&[(Tier::EdgeCase, 3, 5), (Tier::Quality, 1, 3)]);
        assert!(higher.composite(&weights) >= lower.composite(&weights));
    }

    #[test]
    fn composite_stays_in_unit_interval() {
        let weights = default_weights();
        let score = score_with(&[
            (Tier::Basic, 3, 3),
            (Tier::EdgeCase, 5, 5),
            (Tier::Quality, 3, 3),
            (Tier::Smoke, 2, 2),
        ]);
        let value = score.composite(&weights);
        assert!((0.0..=1.0).contains(&value));
    }

    #[test]
    fn aggregate_counts_observed_outcomes_per_tier() {
        let statuses: BTreeMap<String, PatchStatus> =
            [("F1".to_string(), PatchStatus::Valid)].into_iter().collect();
        let outcomes = vec![
            outcome("a", "F1", Tier::Basic, TestStatus::Passed),
            outcome("b", "F1", Tier::Basic, TestStatus::Failed),
            outcome("c", "F1", Tier::EdgeCase, TestStatus::Errored),
        ];
        let scores = aggregate("0a", &outcomes, &statuses);
        assert_eq!(scores.len(), 1);
        let tiers = &scores[0].tiers;
        assert_eq!(tiers[&Tier::Basic], TierTally { passed: 1, total: 2 });
        assert_eq!(tiers[&Tier::EdgeCase], TierTally { passed: 0, total: 1 });
        assert!(!tiers.contains_key(&Tier::Quality));
    }

    #[test]
    fn aggregate_keeps_unobserved_features() {
        let statuses: BTreeMap<String, PatchStatus> = [
            ("F1".to_string(), PatchStatus::Valid),
            ("F2".to_string(), PatchStatus::Empty),
        ]
        .into_iter()
        .collect();
        let outcomes = vec![outcome("a", "F1", Tier::Basic, TestStatus::Passed)];
        let scores = aggregate("0a", &outcomes, &statuses);
        assert_eq!(scores.len(), 2);
        let f2 = scores.iter().find(|s| s.feature_id == "F2").expect("F2");
        assert_eq!(f2.patch_status, PatchStatus::Empty);
        assert!(f2.tiers.is_empty());
    }

    #[test]
    fn aggregate_groups_multiple_features() {
        let statuses = BTreeMap::new();
        let outcomes = vec![
            outcome("a", "F1", Tier::Basic, TestStatus::Passed),
            outcome("b", "F2", Tier::Basic, TestStatus::Passed),
            outcome("c", "F2", Tier::Quality, TestStatus::Failed),
            outcome("d", "F3", Tier::Basic, TestStatus::Passed),
        ];
        let scores = aggregate("0a", &outcomes, &statuses);
        let ids: Vec<&str> = scores.iter().map(|s| s.feature_id.as_str()).collect();
        assert_eq!(ids, vec!["F1", "F2", "F3"]);
        let f2 = &scores[1];
        assert_eq!(f2.patch_status, PatchStatus::Missing);
        assert_eq!(f2.tiers[&Tier::Quality], TierTally { passed: 0, total: 1 });
    }
}
