//! Project context for Drydock commands.
//!
//! Locates the manifest, loads the merged configuration and derives the
//! directories a build writes to.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use crate::util::config::{global_config_path, load_config, project_config_path, Config};

/// Name of the build manifest.
pub const MANIFEST_NAME: &str = "Drydock.toml";

/// Error returned when no manifest can be found.
#[derive(Debug, Error)]
#[error("could not find `{MANIFEST_NAME}` in `{}` or any parent directory", dir.display())]
pub struct ManifestNotFound {
    pub dir: PathBuf,
}

/// Context shared by every command operating on one project.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    /// Directory containing the manifest
    root: PathBuf,

    /// Path to the manifest
    manifest_path: PathBuf,

    /// Merged global and project configuration
    config: Config,
}

impl ProjectContext {
    /// Discover the project that contains `cwd`.
    pub fn discover(cwd: &Path) -> Result<Self> {
        let manifest_path = find_manifest(cwd)?;
        Self::from_manifest(manifest_path)
    }

    /// Create a context for an explicit manifest path.
    pub fn from_manifest(manifest_path: PathBuf) -> Result<Self> {
        let manifest_path = if manifest_path.is_absolute() {
            manifest_path
        } else {
            std::env::current_dir()
                .context("failed to get current directory")?
                .join(manifest_path)
        };
        let root = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .with_context(|| format!("manifest has no parent: {}", manifest_path.display()))?;

        let global = global_config_path();
        let config = load_config(global.as_deref(), &project_config_path(&root));

        Ok(ProjectContext {
            root,
            manifest_path,
            config,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Directory that holds build outputs.
    pub fn build_dir(&self) -> PathBuf {
        self.config.build_dir(&self.root)
    }

    /// Directory that holds the incremental cache.
    pub fn cache_dir(&self) -> PathBuf {
        self.config.cache_dir(&self.root)
    }

    /// Path of the incremental cache journal.
    pub fn depend_store_path(&self) -> PathBuf {
        self.cache_dir().join("depend.jsonl")
    }
}

/// Find `Drydock.toml` starting from `start` and searching upward.
pub fn find_manifest(start: &Path) -> Result<PathBuf, ManifestNotFound> {
    let mut current = start.to_path_buf();
    loop {
        let candidate = current.join(MANIFEST_NAME);
        if candidate.is_file() {
            return Ok(candidate);
        }
        if !current.pop() {
            return Err(ManifestNotFound {
                dir: start.to_path_buf(),
            });
        }
    }
}
