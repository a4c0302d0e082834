//! Structured test-report parsing.
//!
//! Reads the pytest JSON report (`--json-report`) and attributes each test
//! to a feature and tier. One pass per report; reports are consumed once.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::core::outcome::{TestOutcome, TestStatus, Unattributable, attribute};

/// Whole-report failure. Fatal for the collection run; nothing from a
/// malformed report is persisted.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("read report {path}: {message}")]
    Read { path: String, message: String },
    #[error("malformed report {path}: {message}")]
    Malformed { path: String, message: String },
}

/// Raw shape of the pytest JSON report. Unknown fields are ignored; a
/// missing `tests` array makes the report malformed.
#[derive(Debug, Deserialize)]
struct RawReport {
    tests: Vec<RawTest>,
}

#[derive(Debug, Deserialize)]
struct RawTest {
    nodeid: String,
    outcome: String,
    #[serde(default)]
    call: Option<RawStage>,
}

#[derive(Debug, Deserialize)]
struct RawStage {
    #[serde(default)]
    duration: Option<f64>,
}

/// Attributed outcomes plus per-test attribution failures from one report.
#[derive(Debug, Default)]
pub struct ParsedReport {
    pub outcomes: Vec<TestOutcome>,
    pub errors: Vec<Unattributable>,
}

/// Parse one report into attributed outcomes.
///
/// An unattributable test id is surfaced in `errors` without invalidating
/// the remaining tests. Skipped tests are not observed outcomes and
/// produce neither an outcome nor an error. Parsing is deterministic:
/// identical report bytes yield identical sequences.
pub fn parse_report(path: &Path) -> Result<ParsedReport, ReportError> {
    let contents = fs::read_to_string(path).map_err(|err| ReportError::Read {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;
    let raw: RawReport = serde_json::from_str(&contents).map_err(|err| ReportError::Malformed {
        path: path.display().to_string(),
        message: err.to_string(),
    })?;

    let mut parsed = ParsedReport::default();
    for test in raw.tests {
        let status = match test.outcome.as_str() {
            "passed" | "xpassed" => TestStatus::Passed,
            "failed" | "xfailed" => TestStatus::Failed,
            "error" => TestStatus::Errored,
            "skipped" => continue,
            other => {
                parsed.errors.push(Unattributable {
                    test_id: test.nodeid,
                    reason: format!("unknown outcome '{other}'"),
                });
                continue;
            }
        };
        match attribute(&test.nodeid) {
            Ok((feature_id, tier)) => parsed.outcomes.push(TestOutcome {
                test_id: test.nodeid,
                feature_id,
                tier,
                status,
                duration_secs: test.call.and_then(|stage| stage.duration),
            }),
            Err(err) => parsed.errors.push(err),
        }
    }
    if !parsed.errors.is_empty() {
        warn!(
            errors = parsed.errors.len(),
            report = %path.display(),
            "report contained unattributable tests"
        );
    }
    Ok(parsed)
}
