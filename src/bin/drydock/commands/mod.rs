//! Command implementations

pub mod build;
pub mod clean;

use std::path::PathBuf;

use anyhow::{Context, Result};
use drydock::ProjectContext;

/// Locate the project from an explicit manifest path or the working directory.
pub fn project_context(manifest_path: Option<PathBuf>) -> Result<ProjectContext> {
    match manifest_path {
        Some(path) => ProjectContext::from_manifest(path),
        None => {
            let cwd = std::env::current_dir().context("failed to get current directory")?;
            ProjectContext::discover(&cwd)
        }
    }
}
