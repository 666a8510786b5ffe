//! Build context: output locations, cache settings and job limits shared by
//! every unit of one build.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::builder::depend::{Depend, DependKey, DependOptions, DependStore, StampMode};
use crate::core::errors::TaskError;
use crate::core::graph::TargetGraph;
use crate::core::target::Target;
use crate::util::fs::relative_path;
use crate::util::hash::short_hash;

/// Settings for one build run.
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Root of all build outputs
    pub build_dir: PathBuf,

    /// Maximum number of concurrently running tool invocations
    pub jobs: usize,

    /// How the incremental cache detects changes
    pub stamp_mode: StampMode,

    /// Reject argument paths that do not exist
    pub strict_paths: bool,

    /// Ignore the incremental cache and run everything
    pub force: bool,

    /// Host operating system (`std::env::consts::OS`)
    pub os: String,

    /// Incremental cache
    pub depend: Arc<DependStore>,
}

impl BuildContext {
    pub fn new(build_dir: impl Into<PathBuf>, depend: Arc<DependStore>) -> Self {
        BuildContext {
            build_dir: build_dir.into(),
            jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            stamp_mode: StampMode::default(),
            strict_paths: false,
            force: false,
            os: std::env::consts::OS.to_string(),
            depend,
        }
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_stamp_mode(mut self, mode: StampMode) -> Self {
        self.stamp_mode = mode;
        self
    }

    pub fn with_strict_paths(mut self, strict: bool) -> Self {
        self.strict_paths = strict;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn depend_options(&self) -> DependOptions {
        DependOptions {
            force: self.force,
            stamp_mode: self.stamp_mode,
        }
    }

    /// Output directory of one target.
    pub fn target_dir(&self, target: &str) -> PathBuf {
        let sanitized: String = target
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.build_dir.join(sanitized)
    }

    pub fn object_dir(&self, target: &str) -> PathBuf {
        self.target_dir(target).join("obj")
    }

    pub fn generated_dir(&self, target: &str) -> PathBuf {
        self.target_dir(target).join("gen")
    }

    /// A file name for `file` that stays unique within the target even when
    /// two sources share a base name.
    pub fn unique_file_name(&self, target: &Target, file: &Path, extension: &str) -> String {
        let relative = relative_path(target.directory(), file);
        let stem = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unit".to_string());
        let mut hash = short_hash(&relative.to_string_lossy());
        hash.truncate(8);
        format!("{}.{}.{}", stem, hash, extension)
    }
}

/// What an emitter sees while one of its units runs.
#[derive(Clone, Copy)]
pub struct EmitContext<'a> {
    pub build: &'a BuildContext,
    pub graph: &'a TargetGraph,
    /// Name the running emitter was registered under
    pub emitter: &'a str,
}

impl<'a> EmitContext<'a> {
    /// Cache key for a unit of the running emitter.
    pub fn key(&self, target: &Target, file: impl Into<String>) -> DependKey {
        DependKey::new(target.name(), file, self.emitter)
    }

    /// Run `work` through the incremental cache with this build's options.
    pub fn on_changed<F>(
        &self,
        key: &DependKey,
        files: Vec<PathBuf>,
        args: Vec<String>,
        work: F,
    ) -> Result<bool, TaskError>
    where
        F: FnOnce(&mut Depend) -> Result<(), TaskError>,
    {
        self.build
            .depend
            .on_changed(key, files, args, self.build.depend_options(), work)
    }
}
