//! Cross-treatment variance gate for the next experiment wave.

use std::collections::BTreeMap;

use serde::Serialize;

/// Go/no-go recommendation derived from per-treatment mean composites.
///
/// Derived data: computed on demand, never persisted as primary records.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaveDecision {
    /// Fewer than two treatments have scores; the coefficient of variation
    /// is undefined and no numeric CV is fabricated.
    InsufficientData { treatments: usize },
    Evaluated {
        treatments: usize,
        mean: f64,
        std_dev: f64,
        cv: f64,
        min: f64,
        max: f64,
        recommend: bool,
    },
}

impl WaveDecision {
    pub fn recommend(&self) -> bool {
        match self {
            WaveDecision::InsufficientData { .. } => false,
            WaveDecision::Evaluated { recommend, .. } => *recommend,
        }
    }

    /// Human-readable reasoning line for report output.
    pub fn reasoning(&self, cv_threshold: f64) -> String {
        match self {
            WaveDecision::InsufficientData { treatments } => format!(
                "INSUFFICIENT DATA: {treatments} treatment(s) scored, need at least 2 for a variance decision."
            ),
            WaveDecision::Evaluated {
                treatments,
                mean,
                std_dev,
                cv,
                min,
                max,
                recommend,
            } => {
                let action = if *recommend {
                    "RECOMMEND next wave"
                } else {
                    "DO NOT recommend next wave"
                };
                let relation = if *recommend { ">" } else { "<=" };
                format!(
                    "{action}. CV = {cv:.4} ({relation} threshold {cv_threshold:.2}). \
                     Mean composite across {treatments} treatments: {mean:.4} \
                     (min={min:.4}, max={max:.4}, SD={std_dev:.4})."
                )
            }
        }
    }
}

/// Decide from per-treatment mean composites.
///
/// Standard deviation is the population form (divide by N). A zero grand
/// mean is degenerate: CV is reported as 0 and expansion is not
/// recommended. The threshold comparison is strict (`CV > threshold`).
pub fn decide(means: &BTreeMap<String, f64>, cv_threshold: f64) -> WaveDecision {
    if means.len() < 2 {
        return WaveDecision::InsufficientData {
            treatments: means.len(),
        };
    }

    let values: Vec<f64> = means.values().copied().collect();
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if mean == 0.0 {
        return WaveDecision::Evaluated {
            treatments: values.len(),
            mean,
            std_dev: 0.0,
            cv: 0.0,
            min,
            max,
            recommend: false,
        };
    }

    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();
    let cv = std_dev / mean;

    WaveDecision::Evaluated {
        treatments: values.len(),
        mean,
        std_dev,
        cv,
        min,
        max,
        recommend: cv > cv_threshold,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn means(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries
            .iter()
            .map(|(id, value)| (id.to_string(), *value))
            .collect()
    }

    #[test]
    fn uniform_means_never_recommend() {
        let decision = decide(&means(&[("1", 1.0), ("2", 1.0), ("3", 1.0)]), 0.10);
        match decision {
            WaveDecision::Evaluated { cv, recommend, .. } => {
                assert_eq!(cv, 0.0);
                assert!(!recommend);
            }
            WaveDecision::InsufficientData { .. } => panic!("expected evaluated"),
        }
    }

    #[test]
    fn varied_means_recommend_above_threshold() {
        // mean = 47/60, population variance = 73/1800, CV ≈ 0.257086
        let decision = decide(&means(&[("1", 0.5), ("2", 0.9), ("3", 0.95)]), 0.10);
        match decision {
            WaveDecision::Evaluated {
                mean,
                std_dev,
                cv,
                recommend,
                ..
            } => {
                assert!((mean - 47.0 / 60.0).abs() < 1e-9);
                assert!((std_dev - (73.0f64 / 1800.0).sqrt()).abs() < 1e-9);
                assert!((cv - 0.257086).abs() < 1e-4);
                assert!(cv > 0.10);
                assert!(recommend);
            }
            WaveDecision::InsufficientData { .. } => panic!("expected evaluated"),
        }
    }

    #[test]
    fn single_treatment_is_insufficient() {
        let decision = decide(&means(&[("1", 0.8)]), 0.10);
        assert_eq!(decision, WaveDecision::InsufficientData { treatments: 1 });
        assert!(!decision.recommend());
    }

    #[test]
    fn no_treatments_is_insufficient() {
        let decision = decide(&BTreeMap::new(), 0.10);
        assert_eq!(decision, WaveDecision::InsufficientData { treatments: 0 });
    }

    #[test]
    fn zero_mean_does_not_recommend() {
        let decision = decide(&means(&[("1", 0.0), ("2", 0.0)]), 0.10);
        match decision {
            WaveDecision::Evaluated { cv, recommend, .. } => {
                assert_eq!(cv, 0.0);
                assert!(!recommend);
            }
            WaveDecision::InsufficientData { .. } => panic!("expected evaluated"),
        }
    }

    #[test]
    fn threshold_comparison_is_strict() {
        // Two equal means: CV = 0, never above any non-negative threshold.
        let decision = decide(&means(&[("1", 0.6), ("2", 0.6)]), 0.0);
        assert!(!decision.recommend());
    }

    #[test]
    fn reasoning_mentions_cv_and_threshold() {
        let decision = decide(&means(&[("1", 0.5), ("2", 0.9), ("3", 0.95)]), 0.10);
        let reasoning = decision.reasoning(0.10);
        assert!(reasoning.contains("RECOMMEND"));
        assert!(reasoning.contains("threshold 0.10"));
    }

    #[test]
    fn insufficient_reasoning_names_count() {
        let decision = decide(&BTreeMap::new(), 0.10);
        assert!(decision.reasoning(0.10).contains("INSUFFICIENT DATA"));
    }
}
