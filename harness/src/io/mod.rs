//! Side-effecting operations: config, filesystem layout, git, processes.

pub mod config;
pub mod executor;
pub mod layout;
pub mod patch;
pub mod report;
pub mod store;
pub mod tree;
