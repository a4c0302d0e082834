//! Acceptance-test tiers and composite weights.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Quality-gradient bucket for an acceptance test.
///
/// Ordering follows the tier number in the test naming convention
/// (`TestT1…` through `TestT4…`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Basic,
    EdgeCase,
    Quality,
    Smoke,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Basic, Tier::EdgeCase, Tier::Quality, Tier::Smoke];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Basic => "basic",
            Tier::EdgeCase => "edge_case",
            Tier::Quality => "quality",
            Tier::Smoke => "smoke",
        }
    }

    /// Tier for a `TestT<n>…` class number, if `n` is in range.
    pub fn from_number(n: u32) -> Option<Tier> {
        match n {
            1 => Some(Tier::Basic),
            2 => Some(Tier::EdgeCase),
            3 => Some(Tier::Quality),
            4 => Some(Tier::Smoke),
            _ => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum WeightError {
    #[error("weight for {tier} must be >= 0 (got {value})")]
    Negative { tier: Tier, value: f64 },
    #[error("tier weights sum to {sum}, must be <= 1")]
    SumExceedsOne { sum: f64 },
}

/// Validated composite weights per tier.
///
/// Weights are configuration, not code: constructed once from the experiment
/// config and passed by reference wherever composites are computed. A tier
/// may be excluded from the composite with weight 0 (or by omission).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierWeights(BTreeMap<Tier, f64>);

impl TierWeights {
    const SUM_EPSILON: f64 = 1e-9;

    pub fn new(weights: BTreeMap<Tier, f64>) -> Result<Self, WeightError> {
        for (tier, value) in &weights {
            if *value < 0.0 {
                return Err(WeightError::Negative {
                    tier: *tier,
                    value: *value,
                });
            }
        }
        let sum: f64 = weights.values().sum();
        if sum > 1.0 + Self::SUM_EPSILON {
            return Err(WeightError::SumExceedsOne { sum });
        }
        Ok(Self(weights))
    }

    /// Weight for a tier; tiers absent from the config weigh 0.
    pub fn get(&self, tier: Tier) -> f64 {
        self.0.get(&tier).copied().unwrap_or(0.0)
    }
}
