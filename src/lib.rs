//! Drydock - a programmable build orchestrator for native C/C++ projects.
//!
//! Targets and their dependencies form a graph. A pipeline of task emitters
//! runs over every target, concurrently across targets, and an incremental
//! cache skips every unit whose inputs are unchanged since its last
//! successful run.

pub mod builder;
pub mod core;
pub mod util;

/// Test doubles for unit tests.
#[cfg(test)]
pub mod test_support;

pub use builder::{BuildContext, BuildReport, BuildSystem, TaskEmitter};
pub use core::{ConfigError, Manifest, Target, TaskError};
pub use util::ProjectContext;
