//! User-facing diagnostic messages.
//!
//! Every error printed at the end of a build carries the root cause, the
//! location it came from and, where one exists, a suggested fix.

use std::fmt;
use std::path::PathBuf;

use crate::core::errors::FatalError;

/// Common suggestion messages for consistent error handling.
pub mod suggestions {
    /// Suggestion when no manifest file is found.
    pub const NO_MANIFEST: &str = "create a `Drydock.toml` in the project root";

    /// Suggestion when a requested target does not exist.
    pub const TARGET_NOT_FOUND: &str = "check the target names declared in `Drydock.toml`";

    /// Suggestion when a build fails.
    pub const BUILD_FAILED: &str = "run `drydock build --verbose` for more details";

    /// Suggestion when the cache looks inconsistent.
    pub const STALE_CACHE: &str = "run `drydock clean --all` to discard the incremental cache";
}

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Note => write!(f, "note"),
        }
    }
}

/// A diagnostic message with optional suggestions.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Primary message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Additional context lines
    pub context: Vec<String>,
    /// Suggested fixes
    pub suggestions: Vec<String>,
    /// Related location (file path)
    pub location: Option<PathBuf>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            message: message.into(),
            severity: Severity::Error,
            context: Vec::new(),
            suggestions: Vec::new(),
            location: None,
        }
    }

    /// Create a new note diagnostic.
    pub fn note(message: impl Into<String>) -> Self {
        Diagnostic {
            severity: Severity::Note,
            ..Diagnostic::error(message)
        }
    }

    /// Add context to the diagnostic.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context.push(context.into());
        self
    }

    /// Add a suggestion for fixing the issue.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add a file location.
    pub fn with_location(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Some(path.into());
        self
    }

    /// Format the diagnostic for terminal output.
    pub fn format(&self, color: bool) -> String {
        let mut output = String::new();

        let severity_str = if color {
            match self.severity {
                Severity::Error => "\x1b[1;31merror\x1b[0m",
                Severity::Warning => "\x1b[1;33mwarning\x1b[0m",
                Severity::Note => "\x1b[1;36mnote\x1b[0m",
            }
        } else {
            match self.severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
                Severity::Note => "note",
            }
        };

        output.push_str(&format!("{}: {}\n", severity_str, self.message));

        if let Some(ref path) = self.location {
            output.push_str(&format!("  --> {}\n", path.display()));
        }

        for ctx in &self.context {
            for line in ctx.lines() {
                output.push_str(&format!("  | {}\n", line));
            }
        }

        if !self.suggestions.is_empty() {
            let help_prefix = if color {
                "\x1b[1;32mhelp\x1b[0m"
            } else {
                "help"
            };
            for suggestion in &self.suggestions {
                output.push_str(&format!("{}: {}\n", help_prefix, suggestion));
            }
        }

        output
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format(false))
    }
}

/// Turn the fatal errors of a build into diagnostics.
///
/// The first error is reported in full. The rest are usually fallout from
/// the same cancellation, so only their summaries are listed.
pub fn fatal_report(errors: &[FatalError]) -> Vec<Diagnostic> {
    let mut report = Vec::new();
    let Some((first, rest)) = errors.split_first() else {
        return report;
    };

    let mut primary = Diagnostic::error(&first.summary)
        .with_context(format!("in {}", first.fingerprint))
        .with_suggestion(suggestions::BUILD_FAILED);
    if !first.detail.is_empty() {
        primary = primary.with_context(&first.detail);
    }
    report.push(primary);

    for error in rest {
        report.push(
            Diagnostic::note(&error.summary).with_context(format!("in {}", error.fingerprint)),
        );
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::scheduler::TaskFingerprint;

    #[test]
    fn test_diagnostic_format() {
        let diag = Diagnostic::error("no manifest found")
            .with_context("searched from /tmp/project")
            .with_suggestion(suggestions::NO_MANIFEST);

        let output = diag.format(false);
        assert!(output.contains("error: no manifest found"));
        assert!(output.contains("  | searched from /tmp/project"));
        assert!(output.contains("help: create a `Drydock.toml`"));
    }

    #[test]
    fn test_diagnostic_with_location() {
        let diag = Diagnostic::error("bad target").with_location("Drydock.toml");
        assert!(diag.to_string().contains("--> Drydock.toml"));
    }

    #[test]
    fn test_fatal_report_first_in_full() {
        let errors = vec![
            FatalError {
                fingerprint: TaskFingerprint::target("Lib", "Cpp.Compile"),
                summary: "failed to compile a.cpp".into(),
                detail: "a.cpp:1: error: expected ';'".into(),
            },
            FatalError {
                fingerprint: TaskFingerprint::target("App", "Cpp.Link"),
                summary: "failed to link App".into(),
                detail: "undefined reference".into(),
            },
        ];

        let report = fatal_report(&errors);
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].severity, Severity::Error);
        assert!(report[0].format(false).contains("expected ';'"));
        assert_eq!(report[1].severity, Severity::Note);
        assert!(!report[1].format(false).contains("undefined reference"));
    }

    #[test]
    fn test_fatal_report_empty() {
        assert!(fatal_report(&[]).is_empty());
    }
}
