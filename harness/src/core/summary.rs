//! Per-treatment summary statistics over feature composites.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::core::score::TreatmentScoreSet;
use crate::core::tier::TierWeights;

/// Composite statistics for one treatment under one scoring mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreatmentSummary {
    pub treatment_id: String,
    pub n_features: usize,
    pub mean_composite: f64,
    pub min_composite: f64,
    pub max_composite: f64,
    pub per_feature: BTreeMap<String, f64>,
}

/// Summarize one treatment's scores. An empty score set yields all-zero
/// statistics rather than an error.
pub fn summarize(set: &TreatmentScoreSet, weights: &TierWeights) -> TreatmentSummary {
    let per_feature: BTreeMap<String, f64> = set
        .scores
        .iter()
        .map(|score| (score.feature_id.clone(), score.composite(weights)))
        .collect();

    if per_feature.is_empty() {
        return TreatmentSummary {
            treatment_id: set.treatment_id.clone(),
            n_features: 0,
            mean_composite: 0.0,
            min_composite: 0.0,
            max_composite: 0.0,
            per_feature,
        };
    }

    let composites: Vec<f64> = per_feature.values().copied().collect();
    let sum: f64 = composites.iter().sum();
    let min = composites.iter().copied().fold(f64::INFINITY, f64::min);
    let max = composites.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    TreatmentSummary {
        treatment_id: set.treatment_id.clone(),
        n_features: per_feature.len(),
        mean_composite: sum / composites.len() as f64,
        min_composite: min,
        max_composite: max,
        per_feature,
    }
}

/// Summaries for every loaded treatment, keyed by treatment id.
pub fn summarize_all(
    sets: &BTreeMap<String, TreatmentScoreSet>,
    weights: &TierWeights,
) -> BTreeMap<String, TreatmentSummary> {
    sets.iter()
        .map(|(treatment_id, set)| (treatment_id.clone(), summarize(set, weights)))
        .collect()
}
