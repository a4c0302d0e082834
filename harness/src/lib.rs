//! Scoring harness for agent-coding experiments.
//!
//! Applies untrusted agent-generated patches to a pinned reference
//! checkout, runs the tiered acceptance suite against the patched tree,
//! attributes results back to features, computes weighted composite
//! scores, persists them, and renders a variance-based go/no-go decision
//! for the next experiment wave. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (attribution, scoring,
//!   summaries, the decision gate). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config, git, patch dry runs,
//!   test-runner invocation, persistence). Isolated to enable faking in
//!   tests.
//!
//! [`collect`] coordinates core logic with I/O to implement one scoring
//! run; [`cli`] wires the subcommands.

pub mod cli;
pub mod collect;
pub mod core;
pub mod io;
pub mod logging;
