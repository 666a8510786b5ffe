//! Toolchain abstraction for C/C++ compilers.
//!
//! Emitters never build command lines themselves. They ask a [`Compiler`],
//! [`Linker`] or [`Archiver`] for an [`ArgumentDriver`], fill it from the
//! target's resolved arguments plus per-invocation settings (`Object`,
//! `Source`, `Output`, `Inputs`), and hand it back. The tool renders the
//! driver, runs through the incremental cache, and returns an [`Artifact`].
//!
//! Toolchain detection priority:
//! 1. Config file (`toolchain.cc` / `cxx` / `ar`)
//! 2. Environment variables (CC, CXX, AR)
//! 3. Auto-detection (searching PATH for common compilers)

use std::path::Path;
use std::sync::Arc;

use crate::builder::context::EmitContext;
use crate::builder::emitter::Artifact;
use crate::core::errors::TaskError;
use crate::core::file_list::FileKind;
use crate::core::target::Target;

mod detect;
pub mod driver;
mod gcc;

pub use detect::{detect_compiler_family, detect_toolchain};
pub use driver::{ArgumentDriver, PathKind, Property, PropertyError, PropertyTable};
pub use gcc::{parse_depfile, GccToolchain};

/// Driver language used for a compile or link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    C,
    Cxx,
}

impl Language {
    /// Language of a compilable file kind.
    pub fn for_kind(kind: FileKind) -> Option<Language> {
        match kind {
            FileKind::C | FileKind::ObjC => Some(Language::C),
            FileKind::Cpp | FileKind::ObjCpp => Some(Language::Cxx),
            FileKind::Header => None,
        }
    }

    /// Language to link a target with: C++ if any of its sources are.
    pub fn for_target(target: &Target) -> Language {
        let cxx = target
            .file_kinds()
            .into_iter()
            .any(|kind| Language::for_kind(kind) == Some(Language::Cxx) && target.has_files(kind));
        if cxx {
            Language::Cxx
        } else {
            Language::C
        }
    }
}

/// The platform/family of a toolchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolchainPlatform {
    /// GCC (GNU Compiler Collection)
    Gcc,
    /// Clang/LLVM
    Clang,
    /// Apple Clang (macOS)
    AppleClang,
}

impl ToolchainPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolchainPlatform::Gcc => "gcc",
            ToolchainPlatform::Clang => "clang",
            ToolchainPlatform::AppleClang => "apple-clang",
        }
    }
}

/// Turns one source file into an object file.
pub trait Compiler: Send + Sync {
    fn platform(&self) -> ToolchainPlatform;

    /// A driver for sources of `kind`.
    fn create_argument_driver(&self, kind: FileKind, strict_paths: bool) -> ArgumentDriver;

    /// Compile `source` with the settings in `driver`, which must set `Object`.
    fn compile(
        &self,
        cx: &EmitContext<'_>,
        target: &Target,
        kind: FileKind,
        source: &Path,
        driver: &ArgumentDriver,
    ) -> Result<Artifact, TaskError>;
}

/// Links objects and libraries into an executable or shared library.
pub trait Linker: Send + Sync {
    fn create_argument_driver(&self, strict_paths: bool) -> ArgumentDriver;

    /// Link with the settings in `driver`, which must set `Output`.
    fn link(
        &self,
        cx: &EmitContext<'_>,
        target: &Target,
        language: Language,
        driver: &ArgumentDriver,
    ) -> Result<Artifact, TaskError>;
}

/// Bundles objects into a static library.
pub trait Archiver: Send + Sync {
    fn create_argument_driver(&self, strict_paths: bool) -> ArgumentDriver;

    /// Archive with the settings in `driver`, which must set `Output`.
    fn archive(
        &self,
        cx: &EmitContext<'_>,
        target: &Target,
        driver: &ArgumentDriver,
    ) -> Result<Artifact, TaskError>;
}

/// The tools one build uses.
#[derive(Clone)]
pub struct Toolchain {
    pub compiler: Arc<dyn Compiler>,
    pub linker: Arc<dyn Linker>,
    pub archiver: Arc<dyn Archiver>,
}

impl Toolchain {
    /// One value providing all three tools.
    pub fn from_tools<T>(tools: T) -> Self
    where
        T: Compiler + Linker + Archiver + 'static,
    {
        let tools = Arc::new(tools);
        Toolchain {
            compiler: Arc::clone(&tools) as Arc<dyn Compiler>,
            linker: Arc::clone(&tools) as Arc<dyn Linker>,
            archiver: tools,
        }
    }
}

impl std::fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolchain")
            .field("platform", &self.compiler.platform())
            .finish_non_exhaustive()
    }
}

/// The single-valued setting `name` as a path, or a fatal error.
pub(crate) fn required_path(driver: &ArgumentDriver, name: &str) -> Result<std::path::PathBuf, TaskError> {
    driver
        .argument(name)
        .and_then(|value| value.as_scalar())
        .map(std::path::PathBuf::from)
        .ok_or_else(|| TaskError::fatal(format!("`{}` was not set for this invocation", name), ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_for_kind() {
        assert_eq!(Language::for_kind(FileKind::C), Some(Language::C));
        assert_eq!(Language::for_kind(FileKind::ObjCpp), Some(Language::Cxx));
        assert_eq!(Language::for_kind(FileKind::Header), None);
    }

    #[test]
    fn test_language_for_target() {
        let mut target = Target::new("Lib", "/project");
        target.add_files(FileKind::C, ["a.c"]);
        assert_eq!(Language::for_target(&target), Language::C);
        target.add_files(FileKind::Cpp, ["b.cpp"]);
        assert_eq!(Language::for_target(&target), Language::Cxx);
    }

    #[test]
    fn test_platform_names() {
        assert_eq!(ToolchainPlatform::AppleClang.as_str(), "apple-clang");
    }
}
