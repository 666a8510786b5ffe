//! Toolchain detection.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::util::config::ToolchainSettings;
use crate::util::process::{find_executable, ProcessBuilder};

use super::{GccToolchain, ToolchainPlatform};

/// Pick a tool: configured path, then environment variable, then `PATH`.
fn pick(configured: Option<&PathBuf>, env: &str, candidates: &[&str]) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.exists() || find_executable(path).is_some() {
            return Some(path.clone());
        }
        tracing::warn!("configured tool not found: {}", path.display());
    }
    if let Ok(value) = std::env::var(env) {
        if !value.is_empty() {
            return Some(PathBuf::from(value));
        }
    }
    candidates.iter().find_map(|name| find_executable(name))
}

/// Detect the available toolchain.
///
/// Each tool comes from, in order: the `[toolchain]` config table, the
/// `CC`/`CXX`/`AR` environment variables, then a `PATH` search.
pub fn detect_toolchain(settings: &ToolchainSettings) -> Result<GccToolchain> {
    let Some(cc) = pick(settings.cc.as_ref(), "CC", &["cc", "gcc", "clang"]) else {
        bail!(
            "no C compiler found\n\
             \n\
             drydock requires a C compiler (gcc or clang).\n\
             Set the CC environment variable, set `toolchain.cc` in the config,\n\
             or install a compiler."
        );
    };

    let cxx = pick(settings.cxx.as_ref(), "CXX", &["c++", "g++", "clang++"])
        .unwrap_or_else(|| GccToolchain::infer_cxx(&cc));

    let Some(ar) = pick(settings.ar.as_ref(), "AR", &["ar", "llvm-ar"]) else {
        bail!("no archiver found (tried `ar` and `llvm-ar`); set AR or `toolchain.ar`");
    };

    let family = detect_compiler_family(&cc);
    tracing::debug!(
        "using {} toolchain: cc={}, cxx={}, ar={}",
        family.as_str(),
        cc.display(),
        cxx.display(),
        ar.display()
    );

    Ok(GccToolchain::new(cc, cxx, ar, family))
}

/// Detect whether the compiler is GCC, Clang, or Apple Clang.
pub fn detect_compiler_family(cc: &Path) -> ToolchainPlatform {
    let name = cc
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .to_lowercase();

    if name.contains("clang") {
        return clang_variant(cc);
    } else if name.contains("gcc") || name.contains("g++") {
        return ToolchainPlatform::Gcc;
    }

    if let Some(version) = version_output(cc) {
        if version.contains("clang") {
            return clang_variant(cc);
        }
    }
    ToolchainPlatform::Gcc
}

fn version_output(cc: &Path) -> Option<String> {
    let output = ProcessBuilder::new(cc).arg("--version").exec().ok()?;
    Some(String::from_utf8_lossy(&output.stdout).to_lowercase())
}

fn clang_variant(cc: &Path) -> ToolchainPlatform {
    match version_output(cc) {
        Some(version) if version.contains("apple") => ToolchainPlatform::AppleClang,
        _ => ToolchainPlatform::Clang,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_from_name() {
        assert_eq!(
            detect_compiler_family(Path::new("/nonexistent/x86_64-linux-gnu-gcc")),
            ToolchainPlatform::Gcc
        );
        assert_eq!(
            detect_compiler_family(Path::new("/nonexistent/clang")),
            ToolchainPlatform::Clang
        );
    }

    #[test]
    fn test_unknown_compiler_defaults_to_gcc() {
        assert_eq!(
            detect_compiler_family(Path::new("/nonexistent/mycc")),
            ToolchainPlatform::Gcc
        );
    }

    #[test]
    fn test_configured_tool_wins() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cc = tmp.path().join("gcc");
        std::fs::write(&cc, "").unwrap();
        assert_eq!(pick(Some(&cc), "DRYDOCK_TEST_UNSET_VAR", &[]), Some(cc));
    }

    #[test]
    fn test_missing_configured_tool_falls_through() {
        let configured = PathBuf::from("/nonexistent/compiler");
        assert_eq!(pick(Some(&configured), "DRYDOCK_TEST_UNSET_VAR", &[]), None);
    }
}
