#![allow(dead_code)]

//! Shared helpers for integration tests: a throwaway reference repo and a
//! scripted test runner that writes canned reports.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use harness::core::tier::Tier;
use harness::io::config::{ExperimentConfig, ExperimentMeta, Feature, RunnerSpec};
use harness::io::executor::{ExecutionError, TestRunner};

pub const SERIALIZER_SEED: &str = "def dumps(value):\n    return repr(value)\n";
pub const STATE_SEED: &str = "def merge(left, right):\n    return right\n";

pub const F1_PATCH: &str = "\
--- a/serializer.py
+++ b/serializer.py
@@ -1,2 +1,2 @@
 def dumps(value):
-    return repr(value)
+    return encode(value)
";

pub const F2_PATCH: &str = "\
--- a/state.py
+++ b/state.py
@@ -1,2 +1,2 @@
 def merge(left, right):
-    return right
+    return combine(left, right)
";

/// References content the seeded repo never had, so the dry run rejects it.
pub const STALE_PATCH: &str = "\
--- a/serializer.py
+++ b/serializer.py
@@ -1,2 +1,2 @@
 def dumps(value):
-    return something_else(value)
+    return encode(value)
";

pub fn run_git(dir: &Path, args: &[&str]) {
    let output = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Initialize a reference repo with two tracked files; returns HEAD.
pub fn init_reference_repo(dir: &Path) -> String {
    run_git(dir, &["init"]);
    run_git(dir, &["config", "user.name", "Harness Test"]);
    run_git(dir, &["config", "user.email", "harness-test@local.invalid"]);
    fs::write(dir.join("serializer.py"), SERIALIZER_SEED).expect("seed serializer");
    fs::write(dir.join("state.py"), STATE_SEED).expect("seed state");
    run_git(dir, &["add", "."]);
    run_git(dir, &["commit", "-m", "seed reference tree"]);

    let output = std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(dir)
        .output()
        .expect("rev-parse");
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub fn test_config(pin: &str, feature_ids: &[&str]) -> ExperimentConfig {
    ExperimentConfig {
        experiment: ExperimentMeta {
            pin: pin.to_string(),
            pin_date: None,
            cv_threshold: 0.10,
        },
        runner: RunnerSpec {
            command: vec!["pytest".to_string(), "-q".to_string()],
            selector: "tests/acceptance/test_{feature}_*.py".to_string(),
            full_selector: "tests/acceptance".to_string(),
            timeout_secs: 60,
            output_limit_bytes: 50_000,
        },
        weights: [
            (Tier::Basic, 0.15),
            (Tier::EdgeCase, 0.35),
            (Tier::Quality, 0.30),
            (Tier::Smoke, 0.20),
        ]
        .into_iter()
        .collect(),
        features: feature_ids
            .iter()
            .map(|id| Feature {
                id: (*id).to_string(),
                subsystem: "serializer".to_string(),
                title: format!("Feature {id}"),
                spec: format!("Implement feature {id}."),
            })
            .collect(),
    }
}

/// Build a pytest-style JSON report from `(nodeid, outcome)` pairs.
pub fn report_json(entries: &[(&str, &str)]) -> String {
    let tests: Vec<serde_json::Value> = entries
        .iter()
        .map(|(nodeid, outcome)| {
            serde_json::json!({
                "nodeid": nodeid,
                "outcome": outcome,
                "call": {"duration": 0.01}
            })
        })
        .collect();
    serde_json::json!({ "exitcode": 0, "tests": tests }).to_string()
}

/// Test runner that writes canned reports keyed by selector instead of
/// spawning processes.
#[derive(Default)]
pub struct ScriptedRunner {
    reports: BTreeMap<String, String>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_report(mut self, selector: &str, report: &str) -> Self {
        self.reports.insert(selector.to_string(), report.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl TestRunner for ScriptedRunner {
    fn run(&self, selector: &str, report_path: &Path) -> Result<(), ExecutionError> {
        self.calls.borrow_mut().push(selector.to_string());
        match self.reports.get(selector) {
            Some(contents) => {
                fs::write(report_path, contents)
                    .map_err(|err| ExecutionError::Crashed(err.to_string()))?;
                Ok(())
            }
            None => Err(ExecutionError::MissingReport(report_path.to_path_buf())),
        }
    }
}
