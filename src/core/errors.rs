//! Error types shared by the target graph and the scheduler.
//!
//! Configuration errors abort the run before (or instead of) executing any
//! further work. Task errors come out of a single build unit and are either
//! recoverable (the unit just fails) or fatal (the whole build is cancelled).

use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

use crate::builder::scheduler::TaskFingerprint;

/// An invalid graph, emitter setup or argument combination.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("target `{0}` is declared more than once")]
    #[diagnostic(
        code(drydock::graph::duplicate_target),
        help("target names must be unique across the whole build, including package members")
    )]
    DuplicateTarget(String),

    #[error("package `{0}` is declared more than once")]
    #[diagnostic(code(drydock::graph::duplicate_package))]
    DuplicatePackage(String),

    #[error("task emitter `{0}` is registered more than once")]
    #[diagnostic(code(drydock::emitter::duplicate))]
    DuplicateEmitter(String),

    #[error("target `{target}` depends on unknown target `{dependency}`")]
    #[diagnostic(code(drydock::graph::unknown_target))]
    UnknownTarget { target: String, dependency: String },

    #[error("no target named `{name}`; available targets: {available}")]
    #[diagnostic(code(drydock::graph::no_such_target))]
    NoSuchTarget { name: String, available: String },

    #[error("target `{target}` refers to unknown package `{package}`")]
    #[diagnostic(code(drydock::graph::unknown_package))]
    UnknownPackage { target: String, package: String },

    #[error("package `{package}` has no member named `{member}`")]
    #[diagnostic(code(drydock::package::unknown_member))]
    UnknownPackageMember { package: String, member: String },

    #[error("target `{target}` already requires package `{package}`")]
    #[diagnostic(
        code(drydock::package::already_required),
        help("a target may pin exactly one configuration per package")
    )]
    PackageAlreadyRequired { target: String, package: String },

    #[error("target `{target}` uses package `{package}` without requiring it")]
    #[diagnostic(
        code(drydock::package::not_required),
        help("add a requirement for `{package}` to `{target}`")
    )]
    PackageNotRequired { target: String, package: String },

    #[error("`{reference}` in target `{target}` is not a `package@member` reference")]
    #[diagnostic(code(drydock::package::invalid_reference))]
    InvalidPackageReference { target: String, reference: String },

    #[error("task emitter `{emitter}` depends on unknown emitter `{dependency}`")]
    #[diagnostic(code(drydock::emitter::unknown))]
    UnknownEmitter { emitter: String, dependency: String },

    #[error("task emitter `{emitter}` depends on `{dependency}`, which is registered after it")]
    #[diagnostic(
        code(drydock::emitter::order),
        help("register `{dependency}` before `{emitter}`")
    )]
    EmitterOrder { emitter: String, dependency: String },

    #[error("dependency cycle detected: {}", cycle.join(" -> "))]
    #[diagnostic(code(drydock::graph::cycle))]
    DependencyCycle { cycle: Vec<String> },

    #[error("conflicting values for argument `{argument}` in target `{target}`: `{existing}` and `{incoming}` (from `{source_target}`)")]
    #[diagnostic(
        code(drydock::argument::conflict),
        help("make the values agree, or make one of them private")
    )]
    ConflictingArgument {
        target: String,
        argument: String,
        existing: String,
        incoming: String,
        source_target: String,
    },

    #[error("argument `{argument}` in target `{target}` is used both as a single value and as a list")]
    #[diagnostic(code(drydock::argument::kind_mismatch))]
    ArgumentKindMismatch { target: String, argument: String },

    #[error("task `{0}` is scheduled more than once")]
    #[diagnostic(code(drydock::scheduler::duplicate_fingerprint))]
    DuplicateFingerprint(TaskFingerprint),

    #[error("invalid file pattern `{pattern}` in target `{target}`: {message}")]
    #[diagnostic(code(drydock::files::invalid_glob))]
    InvalidGlob {
        target: String,
        pattern: String,
        message: String,
    },

    #[error("target `{target}`: {message}")]
    #[diagnostic(code(drydock::graph::invalid_target))]
    InvalidTarget { target: String, message: String },
}

/// Failure of a single build unit.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Cancels the whole build. `detail` holds the full tool output.
    #[error("{summary}")]
    Fatal { summary: String, detail: String },

    /// Fails only this unit and whatever depends on it.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl TaskError {
    pub fn fatal(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        TaskError::Fatal {
            summary: summary.into(),
            detail: detail.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, TaskError::Fatal { .. })
    }
}

impl From<ConfigError> for TaskError {
    fn from(err: ConfigError) -> Self {
        let detail = err.help().map(|help| help.to_string()).unwrap_or_default();
        TaskError::Fatal {
            summary: err.to_string(),
            detail,
        }
    }
}

/// A fatal error recorded by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FatalError {
    pub fingerprint: TaskFingerprint,
    pub summary: String,
    pub detail: String,
}
