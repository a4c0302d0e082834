//! Git-backed controller for the pinned reference tree.
//!
//! The working copy is a single shared mutable resource: one
//! apply/test/revert cycle may be in flight against it at a time, and the
//! tree must be back at the pinned commit before the next cycle starts.
//! Scoring treatments in parallel requires separate checkouts, never
//! concurrent mutation of one tree.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Failure touching the integrity of the reference tree. Fatal to the
/// enclosing scoring run: a dirty or half-reverted tree corrupts every
/// subsequent measurement.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("working tree not clean:\n{entries}")]
    Dirty { entries: String },
    #[error("pinned commit mismatch: expected {expected}, found {found}")]
    PinMismatch { expected: String, found: String },
    #[error("revert failed: {0}")]
    RevertFailed(String),
    #[error("git {args} failed: {message}")]
    Git { args: String, message: String },
}

/// Why a patch failed to apply. Expected and common with agent-produced
/// patches; surfaced as `PatchStatus::Invalid`, never a crash.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("patch conflicts with tree: {0}")]
    Conflict(String),
    #[error("malformed patch: {0}")]
    MalformedPatch(String),
    #[error("patch references a path missing from the tree: {0}")]
    PathNotFound(String),
    #[error("git apply failed: {0}")]
    Git(String),
}

/// Handle on the pinned checkout. Single-owner: passed by reference through
/// the pipeline, never duplicated implicitly.
#[derive(Debug, Clone)]
pub struct RefTree {
    workdir: PathBuf,
}

impl RefTree {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Fail if modified or untracked files are present. Side-effect-free.
    #[instrument(skip_all)]
    pub fn verify_clean(&self) -> Result<(), TreeError> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        if out.trim().is_empty() {
            debug!("reference tree is clean");
            return Ok(());
        }
        warn!(entries = out.lines().count(), "reference tree not clean");
        Err(TreeError::Dirty {
            entries: out.trim_end().to_string(),
        })
    }

    pub fn head_sha(&self) -> Result<String, TreeError> {
        let out = self.run_capture(&["rev-parse", "HEAD"])?;
        Ok(out.trim().to_string())
    }

    /// HEAD must match the pinned commit (full or abbreviated form).
    pub fn verify_pin(&self, expected: &str) -> Result<(), TreeError> {
        let found = self.head_sha()?;
        if found == expected || found.starts_with(expected) {
            return Ok(());
        }
        Err(TreeError::PinMismatch {
            expected: expected.to_string(),
            found,
        })
    }

    /// Dry-run a patch with `git apply --check`. Never mutates the tree.
    pub fn check_patch(&self, patch: &Path) -> Result<(), ApplyError> {
        self.apply_inner(patch, true)
    }

    /// Apply a patch, dry-running first so a failing patch leaves the tree
    /// untouched. `git apply` itself is all-or-nothing, so a post-check
    /// failure also leaves no partial state behind.
    #[instrument(skip_all, fields(patch = %patch.display()))]
    pub fn apply_patch(&self, patch: &Path) -> Result<(), ApplyError> {
        self.apply_inner(patch, true)?;
        self.apply_inner(patch, false)?;
        debug!("patch applied");
        Ok(())
    }

    fn apply_inner(&self, patch: &Path, check: bool) -> Result<(), ApplyError> {
        let patch_arg = patch.display().to_string();
        let mut args = vec!["apply"];
        if check {
            args.push("--check");
        }
        args.push(&patch_arg);
        let output = self
            .run(&args)
            .map_err(|err| ApplyError::Git(err.to_string()))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(classify_apply_failure(stderr.trim()))
    }

    /// Discard all tracked modifications and remove untracked files,
    /// restoring the pinned commit. Idempotent: on an already-clean tree
    /// this is a no-op success.
    #[instrument(skip_all)]
    pub fn revert(&self) -> Result<(), TreeError> {
        for args in [
            &["checkout", "--", "."] as &[&str],
            &["clean", "-fd"] as &[&str],
        ] {
            let output = self
                .run(args)
                .map_err(|err| TreeError::RevertFailed(err.to_string()))?;
            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(args = ?args, "revert step failed");
                return Err(TreeError::RevertFailed(format!(
                    "git {}: {}",
                    args.join(" "),
                    stderr.trim()
                )));
            }
        }
        debug!("reference tree reverted");
        Ok(())
    }

    fn run_capture(&self, args: &[&str]) -> Result<String, TreeError> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TreeError::Git {
                args: args.join(" "),
                message: stderr.trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run(&self, args: &[&str]) -> Result<Output, TreeError> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .map_err(|err| TreeError::Git {
                args: args.join(" "),
                message: err.to_string(),
            })
    }
}

fn classify_apply_failure(stderr: &str) -> ApplyError {
    let lower = stderr.to_lowercase();
    if lower.contains("does not exist in index")
        || lower.contains("no such file or directory")
        || lower.contains("does not exist in working directory")
    {
        return ApplyError::PathNotFound(stderr.to_string());
    }
    if lower.contains("corrupt patch")
        || lower.contains("unrecognized input")
        || lower.contains("git diff header lacks filename")
        || lower.contains("patch fragment without header")
    {
        return ApplyError::MalformedPatch(stderr.to_string());
    }
    if lower.contains("does not apply") || lower.contains("patch failed") {
        return ApplyError::Conflict(stderr.to_string());
    }
    ApplyError::Git(stderr.to_string())
}

/// Preflight report: everything wrong with the checkout, not just the
/// first problem found.
#[derive(Debug)]
pub struct PreflightReport {
    /// HEAD of the checkout, when it could be read.
    pub head: Option<String>,
    pub issues: Vec<String>,
}

impl PreflightReport {
    pub fn ok(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check the reference checkout before any scoring run: directory present,
/// a git repository, at the pinned commit, and clean.
pub fn preflight(workdir: &Path, expected_pin: &str) -> PreflightReport {
    let mut issues = Vec::new();

    if !workdir.exists() {
        issues.push(format!("reference tree not found at {}", workdir.display()));
        return PreflightReport { head: None, issues };
    }
    if !workdir.join(".git").exists() {
        issues.push(format!("{} has no .git directory", workdir.display()));
        return PreflightReport { head: None, issues };
    }

    let tree = RefTree::new(workdir);
    let head = match tree.head_sha() {
        Ok(sha) => Some(sha),
        Err(err) => {
            issues.push(format!("cannot read HEAD: {err}"));
            None
        }
    };
    if let Some(found) = &head
        && *found != expected_pin
        && !found.starts_with(expected_pin)
    {
        issues.push(format!(
            "HEAD {found} does not match pinned commit {expected_pin}"
        ));
    }
    if let Err(err) = tree.verify_clean() {
        issues.push(format!("working tree is dirty: {err}"));
    }

    PreflightReport { head, issues }
}
