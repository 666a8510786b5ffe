//! Task emitters: pluggable build steps.
//!
//! An emitter decides, per target, whether it takes part in the build and
//! which units it produces: at most one target-level unit and any number of
//! per-file units. Emitters are registered with the build system in order
//! and may declare dependencies on earlier emitters.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::builder::context::EmitContext;
use crate::core::errors::TaskError;
use crate::core::file_list::{FileKind, FileOptions};
use crate::core::target::Target;

/// How a unit waits on another emitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyModel {
    /// The other emitter's target-level unit for the same target.
    PerTarget,
    /// The other emitter's unit for the same file of the same target.
    PerFile,
    /// The other emitter's target-level unit on every final dependency.
    ExternalTarget,
}

/// What a unit produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub outputs: Vec<PathBuf>,
    /// The outputs were up to date and nothing ran.
    pub restored: bool,
}

impl Artifact {
    pub fn new(outputs: Vec<PathBuf>, restored: bool) -> Self {
        Artifact { outputs, restored }
    }

    pub fn single(output: impl Into<PathBuf>, restored: bool) -> Self {
        Artifact::new(vec![output.into()], restored)
    }
}

/// A build step. Every method has a do-nothing default.
pub trait TaskEmitter: Send + Sync {
    /// Whether this emitter takes part for `target` at all.
    fn enable_emitter(&self, _target: &Target) -> bool {
        true
    }

    /// Whether to run [`TaskEmitter::per_target_task`] for `target`.
    fn emit_target_task(&self, _target: &Target) -> bool {
        false
    }

    /// Target-level work. Runs on the blocking pool.
    fn per_target_task(
        &self,
        _cx: &EmitContext<'_>,
        _target: &Target,
    ) -> Result<Option<Artifact>, TaskError> {
        Ok(None)
    }

    /// Whether to run [`TaskEmitter::per_file_task`] for files of `kind`.
    fn emit_file_task(&self, _target: &Target, _kind: FileKind) -> bool {
        false
    }

    /// Per-file work. Runs on the blocking pool.
    fn per_file_task(
        &self,
        _cx: &EmitContext<'_>,
        _target: &Target,
        _kind: FileKind,
        _options: Option<&FileOptions>,
        _file: &Path,
    ) -> Result<Option<Artifact>, TaskError> {
        Ok(None)
    }
}

/// A registered emitter and the emitters it waits on.
#[derive(Clone)]
pub struct EmitterEntry {
    name: String,
    emitter: Arc<dyn TaskEmitter>,
    dependencies: Vec<(String, DependencyModel)>,
}

impl EmitterEntry {
    pub(crate) fn new(name: String, emitter: Arc<dyn TaskEmitter>) -> Self {
        EmitterEntry {
            name,
            emitter,
            dependencies: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn emitter(&self) -> &Arc<dyn TaskEmitter> {
        &self.emitter
    }

    /// Wait on `emitter` according to `model` before running.
    pub fn add_dependency(&mut self, emitter: impl Into<String>, model: DependencyModel) -> &mut Self {
        self.dependencies.push((emitter.into(), model));
        self
    }

    pub fn dependencies(&self) -> &[(String, DependencyModel)] {
        &self.dependencies
    }

    /// Names of the emitters waited on through `model`.
    pub fn dependencies_of(&self, model: DependencyModel) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .filter(move |(_, m)| *m == model)
            .map(|(name, _)| name.as_str())
    }
}

impl std::fmt::Debug for EmitterEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmitterEntry")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl TaskEmitter for Noop {}

    #[test]
    fn test_defaults() {
        let target = Target::new("Lib", "/project");
        let noop = Noop;
        assert!(noop.enable_emitter(&target));
        assert!(!noop.emit_target_task(&target));
        assert!(!noop.emit_file_task(&target, FileKind::Cpp));
    }

    #[test]
    fn test_dependencies_of() {
        let mut entry = EmitterEntry::new("Cpp.Link".into(), Arc::new(Noop));
        entry
            .add_dependency("Cpp.Compile", DependencyModel::PerTarget)
            .add_dependency("Cpp.Link", DependencyModel::ExternalTarget);

        assert_eq!(
            entry.dependencies_of(DependencyModel::PerTarget).collect::<Vec<_>>(),
            ["Cpp.Compile"]
        );
        assert_eq!(
            entry.dependencies_of(DependencyModel::ExternalTarget).collect::<Vec<_>>(),
            ["Cpp.Link"]
        );
        assert_eq!(entry.dependencies_of(DependencyModel::PerFile).count(), 0);
    }
}
