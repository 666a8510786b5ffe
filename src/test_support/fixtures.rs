//! Scratch project trees.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Files to lay out under a directory.
#[derive(Debug, Clone, Default)]
pub struct ProjectFixture {
    files: Vec<(PathBuf, String)>,
}

impl ProjectFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// `Lib` (static, two sources) and `App` (private dependency on `Lib`).
    pub fn lib_and_app() -> Self {
        ProjectFixture::new()
            .with_manifest(
                r#"
[[target]]
name = "Lib"
type = "static"
files.cpp = ["lib/*.cpp"]
arguments.public = { Defines = ["USE_LIB"] }

[[target]]
name = "App"
type = "executable"
files.cpp = ["app/main.cpp"]
deps.private = ["Lib"]
"#,
            )
            .with_file("lib/a.cpp", "int a() { return 1; }\n")
            .with_file("lib/b.cpp", "int b() { return 2; }\n")
            .with_file("app/main.cpp", "int main() { return 0; }\n")
    }

    pub fn with_manifest(self, contents: &str) -> Self {
        self.with_file("Drydock.toml", contents)
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.files.push((path.into(), contents.into()));
        self
    }

    /// Write every file below `root`, creating directories as needed.
    pub fn write_to(&self, root: &Path) -> std::io::Result<()> {
        for (path, contents) in &self.files {
            let full = root.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(full, contents)?;
        }
        Ok(())
    }
}

/// Move a file's mtime `seconds` into the future.
pub fn bump_mtime(path: &Path, seconds: u64) -> std::io::Result<()> {
    let file = std::fs::File::options().write(true).open(path)?;
    file.set_modified(SystemTime::now() + Duration::from_secs(seconds))
}
