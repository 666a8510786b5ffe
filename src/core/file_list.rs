//! Source file lists.
//!
//! A target keeps one list per [`FileKind`]. Entries are plain paths or glob
//! patterns relative to the target directory; globs are expanded once during
//! argument resolution. Per-file options attach extra arguments to single
//! files or to everything a pattern matches.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::argument::Arguments;
use crate::core::errors::ConfigError;
use crate::util::fs::{absolutize, glob_files, is_glob_pattern};

/// Category of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    C,
    Cpp,
    ObjC,
    ObjCpp,
    Header,
}

impl FileKind {
    pub const ALL: [FileKind; 5] = [
        FileKind::C,
        FileKind::Cpp,
        FileKind::ObjC,
        FileKind::ObjCpp,
        FileKind::Header,
    ];

    /// Whether files of this kind are compiled into objects.
    pub fn is_compilable(&self) -> bool {
        !matches!(self, FileKind::Header)
    }

    /// Guess the kind from a file extension.
    pub fn from_path(path: &Path) -> Option<FileKind> {
        let ext = path.extension()?.to_str()?;
        match ext {
            "c" => Some(FileKind::C),
            "cc" | "cpp" | "cxx" | "c++" => Some(FileKind::Cpp),
            "m" => Some(FileKind::ObjC),
            "mm" => Some(FileKind::ObjCpp),
            "h" | "hh" | "hpp" | "hxx" | "inl" => Some(FileKind::Header),
            _ => None,
        }
    }
}

/// Extra arguments for a single file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOptions {
    #[serde(default)]
    pub arguments: Arguments,
}

/// Files of one kind belonging to a target.
#[derive(Debug, Clone)]
pub struct FileList {
    kind: FileKind,
    directory: PathBuf,
    patterns: Vec<(String, Option<FileOptions>)>,
    files: BTreeSet<PathBuf>,
    options: BTreeMap<PathBuf, FileOptions>,
}

impl FileList {
    pub fn new(kind: FileKind, directory: impl Into<PathBuf>) -> Self {
        FileList {
            kind,
            directory: directory.into(),
            patterns: Vec::new(),
            files: BTreeSet::new(),
            options: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    /// Add paths or glob patterns.
    pub fn add<I, S>(&mut self, entries: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for entry in entries {
            self.add_entry(entry.as_ref(), None);
        }
    }

    /// Add paths or glob patterns that all share `options`.
    pub fn add_with_options<I, S>(&mut self, options: FileOptions, entries: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for entry in entries {
            self.add_entry(entry.as_ref(), Some(options.clone()));
        }
    }

    fn add_entry(&mut self, entry: &str, options: Option<FileOptions>) {
        if is_glob_pattern(entry) {
            self.patterns.push((entry.to_string(), options));
        } else {
            let path = absolutize(&self.directory, entry);
            if let Some(options) = options {
                self.options.insert(path.clone(), options);
            }
            self.files.insert(path);
        }
    }

    /// Add files produced while the build is running.
    pub fn add_generated<I>(&mut self, files: I)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.files.extend(files);
    }

    /// Expand pending glob patterns into concrete files.
    pub fn resolve_globs(&mut self, target: &str) -> Result<(), ConfigError> {
        for (pattern, options) in std::mem::take(&mut self.patterns) {
            let matched = glob_files(&self.directory, std::slice::from_ref(&pattern)).map_err(
                |e| ConfigError::InvalidGlob {
                    target: target.to_string(),
                    pattern: pattern.clone(),
                    message: format!("{:#}", e),
                },
            )?;
            if matched.is_empty() {
                tracing::debug!("pattern `{}` in `{}` matched no files", pattern, target);
            }
            for path in matched {
                if let Some(options) = &options {
                    self.options.insert(path.clone(), options.clone());
                }
                self.files.insert(path);
            }
        }
        Ok(())
    }

    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(PathBuf::as_path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    pub fn options(&self, path: &Path) -> Option<&FileOptions> {
        self.options.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::argument::ArgumentValue;
    use tempfile::TempDir;

    #[test]
    fn test_from_path() {
        assert_eq!(FileKind::from_path(Path::new("a.cpp")), Some(FileKind::Cpp));
        assert_eq!(FileKind::from_path(Path::new("a.c")), Some(FileKind::C));
        assert_eq!(FileKind::from_path(Path::new("a.hpp")), Some(FileKind::Header));
        assert_eq!(FileKind::from_path(Path::new("README")), None);
    }

    #[test]
    fn test_plain_paths_are_absolutized() {
        let mut list = FileList::new(FileKind::Cpp, "/project/lib");
        list.add(["src/a.cpp", "/abs/b.cpp"]);

        let files: Vec<_> = list.files().collect();
        assert_eq!(
            files,
            [Path::new("/abs/b.cpp"), Path::new("/project/lib/src/a.cpp")]
        );
    }

    #[test]
    fn test_globs_expand_with_options() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("src")).unwrap();
        std::fs::write(tmp.path().join("src/a.cpp"), "").unwrap();
        std::fs::write(tmp.path().join("src/b.cpp"), "").unwrap();

        let mut options = FileOptions::default();
        options
            .arguments
            .insert("OptimizationLevel".into(), ArgumentValue::from("None"));

        let mut list = FileList::new(FileKind::Cpp, tmp.path());
        list.add_with_options(options.clone(), ["src/*.cpp"]);
        assert!(list.is_empty());

        list.resolve_globs("Lib").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.options(&tmp.path().join("src/a.cpp")), Some(&options));
    }

    #[test]
    fn test_invalid_glob() {
        let mut list = FileList::new(FileKind::Cpp, "/project");
        list.add(["src/[*.cpp"]);
        let err = list.resolve_globs("Lib").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidGlob { .. }));
    }

    #[test]
    fn test_generated_files() {
        let mut list = FileList::new(FileKind::Cpp, "/project");
        list.add_generated([PathBuf::from("/build/gen/meta.cpp")]);
        assert!(list.contains(Path::new("/build/gen/meta.cpp")));
    }
}
