//! Configuration file support for Drydock.
//!
//! Drydock reads two configuration files:
//! - Global: `<config dir>/drydock/config.toml` - User-wide defaults
//! - Project: `.drydock/config.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config, and command-line
//! flags take precedence over both.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::builder::depend::StampMode;

/// Drydock configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build settings
    pub build: BuildConfig,

    /// Tool overrides
    pub toolchain: ToolchainSettings,
}

/// Build-related configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct BuildConfig {
    /// Number of parallel jobs (None = available parallelism)
    pub jobs: Option<usize>,

    /// How input files are stamped by the incremental cache
    pub stamp_mode: Option<StampMode>,

    /// Reject argument paths that do not exist
    pub strict_paths: Option<bool>,

    /// Directory for build outputs, relative to the project root
    pub build_dir: Option<PathBuf>,

    /// Directory for the incremental cache, relative to the project root
    pub cache_dir: Option<PathBuf>,
}

/// Tool overrides for the C/C++ toolchain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainSettings {
    /// Path to the C compiler (e.g., /usr/bin/clang)
    pub cc: Option<PathBuf>,

    /// Path to the C++ compiler (e.g., /usr/bin/clang++)
    pub cxx: Option<PathBuf>,

    /// Path to the archiver (e.g., /usr/bin/llvm-ar)
    pub ar: Option<PathBuf>,

    /// Path to the metadata code generator
    pub meta: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Load configuration with fallback to defaults if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("failed to load config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Merge another config into this one (other takes precedence).
    pub fn merge(&mut self, other: Config) {
        if other.build.jobs.is_some() {
            self.build.jobs = other.build.jobs;
        }
        if other.build.stamp_mode.is_some() {
            self.build.stamp_mode = other.build.stamp_mode;
        }
        if other.build.strict_paths.is_some() {
            self.build.strict_paths = other.build.strict_paths;
        }
        if other.build.build_dir.is_some() {
            self.build.build_dir = other.build.build_dir;
        }
        if other.build.cache_dir.is_some() {
            self.build.cache_dir = other.build.cache_dir;
        }

        if other.toolchain.cc.is_some() {
            self.toolchain.cc = other.toolchain.cc;
        }
        if other.toolchain.cxx.is_some() {
            self.toolchain.cxx = other.toolchain.cxx;
        }
        if other.toolchain.ar.is_some() {
            self.toolchain.ar = other.toolchain.ar;
        }
        if other.toolchain.meta.is_some() {
            self.toolchain.meta = other.toolchain.meta;
        }
    }

    /// Effective number of jobs.
    pub fn jobs(&self) -> usize {
        self.build
            .jobs
            .filter(|jobs| *jobs > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
    }

    /// Effective build directory for a project rooted at `root`.
    pub fn build_dir(&self, root: &Path) -> PathBuf {
        crate::util::fs::absolutize(
            root,
            self.build
                .build_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(".drydock/build")),
        )
    }

    /// Effective cache directory for a project rooted at `root`.
    pub fn cache_dir(&self, root: &Path) -> PathBuf {
        crate::util::fs::absolutize(
            root,
            self.build
                .cache_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(".drydock/cache")),
        )
    }
}

/// Load merged configuration from global and project locations.
///
/// Order of precedence (highest to lowest):
/// 1. Project config (.drydock/config.toml)
/// 2. Global config
/// 3. Defaults
pub fn load_config(global_path: Option<&Path>, project_path: &Path) -> Config {
    let mut config = Config::default();

    if let Some(global_path) = global_path {
        if global_path.exists() {
            config.merge(Config::load_or_default(global_path));
        }
    }

    if project_path.exists() {
        config.merge(Config::load_or_default(project_path));
    }

    config
}

/// Get the global drydock config path.
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "drydock").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Get the project config path (.drydock/config.toml).
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".drydock").join("config.toml")
}
