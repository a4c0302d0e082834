//! Per-test outcomes and the test-id attribution grammar.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::core::tier::Tier;

/// Executed-test status. A failing test is normal output, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
    Errored,
}

impl TestStatus {
    pub fn passed(self) -> bool {
        matches!(self, TestStatus::Passed)
    }
}

/// One executed test case, attributed to a feature and tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Full runner test id (pytest nodeid).
    pub test_id: String,
    pub feature_id: String,
    pub tier: Tier,
    pub status: TestStatus,
    pub duration_secs: Option<f64>,
}

/// A test id the attribution grammar could not place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unattributable {
    pub test_id: String,
    pub reason: String,
}

static FEATURE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\btest_(f\d+)_").unwrap());
static TIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"::TestT(\d+)[A-Za-z0-9]*::").unwrap());

/// Attribute a test id to `(feature_id, tier)`.
///
/// Contract: test ids follow the acceptance-suite naming convention
/// `tests/acceptance/test_<feature>_<slug>.py::TestT<n><Name>::<test_name>`,
/// where `<feature>` matches `f\d+` (case-insensitive, reported uppercased)
/// and `<n>` is the tier number 1-4. Anything else is unattributable and is
/// reported per test rather than silently dropped.
pub fn attribute(test_id: &str) -> Result<(String, Tier), Unattributable> {
    let feature_id = FEATURE_RE
        .captures(test_id)
        .map(|caps| caps[1].to_uppercase())
        .ok_or_else(|| Unattributable {
            test_id: test_id.to_string(),
            reason: "no test_<feature>_ marker in test id".to_string(),
        })?;

    let caps = TIER_RE.captures(test_id).ok_or_else(|| Unattributable {
        test_id: test_id.to_string(),
        reason: "no TestT<n> tier class in test id".to_string(),
    })?;
    let number: u32 = caps[1].parse().map_err(|_| Unattributable {
        test_id: test_id.to_string(),
        reason: format!("tier number {} out of range", &caps[1]),
    })?;
    let tier = Tier::from_number(number).ok_or_else(|| Unattributable {
        test_id: test_id.to_string(),
        reason: format!("tier number {number} out of range"),
    })?;

    Ok((feature_id, tier))
}
