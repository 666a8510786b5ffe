//! Build event types for JSON output.
//!
//! These events are emitted one per line when using `--message-format=json`.
//!
//! # Event Types
//!
//! - `unit-finished`: a scheduled unit completed (ran, was restored, or failed)
//! - `fatal-error`: a unit raised a fatal error and the build was cancelled
//! - `build-finished`: the build completed (success or failure)
//!
//! New fields may be added, but existing fields should not be removed or renamed.

use std::path::PathBuf;

use serde::Serialize;

use crate::builder::scheduler::TaskFingerprint;
use crate::core::errors::FatalError;

/// A build event emitted during the build process.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "reason")]
pub enum BuildEvent {
    /// A unit completed.
    #[serde(rename = "unit-finished")]
    UnitFinished {
        target: String,
        /// Source file of per-file units
        #[serde(skip_serializing_if = "Option::is_none")]
        file: Option<String>,
        emitter: String,
        success: bool,
        /// Whether the unit's outputs were restored from cache
        #[serde(skip_serializing_if = "Option::is_none")]
        fresh: Option<bool>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        outputs: Vec<PathBuf>,
    },

    /// A unit failed fatally.
    #[serde(rename = "fatal-error")]
    FatalError {
        target: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        file: Option<String>,
        emitter: String,
        summary: String,
        /// Full tool output
        detail: String,
    },

    /// Build completed (success or failure).
    #[serde(rename = "build-finished")]
    BuildFinished {
        success: bool,
        /// Total build duration in milliseconds
        duration_ms: u64,
        /// Units that ran their tool
        executed: usize,
        /// Units restored from cache
        restored: usize,
    },
}

fn file_of(fingerprint: &TaskFingerprint) -> Option<String> {
    fingerprint
        .is_file_level()
        .then(|| fingerprint.file.clone())
}

impl BuildEvent {
    /// Create a unit-finished event.
    pub fn unit(
        fingerprint: &TaskFingerprint,
        success: bool,
        fresh: Option<bool>,
        outputs: Vec<PathBuf>,
    ) -> Self {
        BuildEvent::UnitFinished {
            target: fingerprint.target.clone(),
            file: file_of(fingerprint),
            emitter: fingerprint.emitter.clone(),
            success,
            fresh,
            outputs,
        }
    }

    /// Create a fatal-error event.
    pub fn fatal(error: &FatalError) -> Self {
        BuildEvent::FatalError {
            target: error.fingerprint.target.clone(),
            file: file_of(&error.fingerprint),
            emitter: error.fingerprint.emitter.clone(),
            summary: error.summary.clone(),
            detail: error.detail.clone(),
        }
    }

    /// Create a build-finished event.
    pub fn finished(success: bool, duration_ms: u64, executed: usize, restored: usize) -> Self {
        BuildEvent::BuildFinished {
            success,
            duration_ms,
            executed,
            restored,
        }
    }

    /// Serialize to a single-line JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_unit_serialization() {
        let fingerprint = TaskFingerprint::target("Lib", "Cpp.Link");
        let event = BuildEvent::unit(
            &fingerprint,
            true,
            Some(false),
            vec![PathBuf::from("build/Lib/libLib.a")],
        );
        let json = event.to_json();
        assert!(json.contains("\"reason\":\"unit-finished\""));
        assert!(json.contains("\"emitter\":\"Cpp.Link\""));
        assert!(json.contains("\"fresh\":false"));
        assert!(json.contains("libLib.a"));
        assert!(!json.contains("\"file\""));
    }

    #[test]
    fn test_file_unit_serialization() {
        let fingerprint = TaskFingerprint::file("Lib", Path::new("src/a.cpp"), "Cpp.Compile");
        let json = BuildEvent::unit(&fingerprint, false, None, Vec::new()).to_json();
        assert!(json.contains("\"file\":\"src/a.cpp\""));
        assert!(json.contains("\"success\":false"));
        assert!(!json.contains("\"outputs\""));
    }

    #[test]
    fn test_fatal_serialization() {
        let error = FatalError {
            fingerprint: TaskFingerprint::target("App", "Cpp.Link"),
            summary: "link failed".into(),
            detail: "undefined reference to `foo'".into(),
        };
        let json = BuildEvent::fatal(&error).to_json();
        assert!(json.contains("\"reason\":\"fatal-error\""));
        assert!(json.contains("\"summary\":\"link failed\""));
        assert!(json.contains("undefined reference"));
    }

    #[test]
    fn test_finished_serialization() {
        let json = BuildEvent::finished(true, 2340, 3, 1).to_json();
        assert!(json.contains("\"reason\":\"build-finished\""));
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"duration_ms\":2340"));
        assert!(json.contains("\"restored\":1"));
    }
}
