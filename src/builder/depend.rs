//! Incremental build cache.
//!
//! A [`DependRecord`] remembers, per unit key, the input files with their
//! stamps, the argument tokens, and the external files the unit produced or
//! read. [`DependStore::on_changed`] re-runs a unit only when one of those
//! changed and commits a new record only after the unit succeeded, so a
//! failed or interrupted unit always runs again next time.
//!
//! Records are kept in memory and appended to a JSON-lines journal. The last
//! line for a key wins; [`DependStore::compact`] rewrites the journal with
//! one line per key at the end of a build.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::SystemTime;

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::builder::scheduler::TaskFingerprint;
use crate::core::errors::TaskError;
use crate::util::fs::ensure_parent;
use crate::util::hash::sha256_file;

/// How file changes are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StampMode {
    /// Compare modification times.
    #[default]
    Mtime,
    /// Compare SHA-256 digests of the contents.
    Content,
}

impl std::str::FromStr for StampMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mtime" => Ok(StampMode::Mtime),
            "content" => Ok(StampMode::Content),
            other => Err(format!("unknown stamp mode `{}`", other)),
        }
    }
}

/// Observed state of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum FileStamp {
    Missing,
    Modified(SystemTime),
    Content(String),
}

impl FileStamp {
    pub fn capture(path: &Path, mode: StampMode) -> Result<Self> {
        if !path.exists() {
            return Ok(FileStamp::Missing);
        }
        match mode {
            StampMode::Mtime => {
                let modified = std::fs::metadata(path)
                    .and_then(|m| m.modified())
                    .with_context(|| format!("failed to stat {}", path.display()))?;
                Ok(FileStamp::Modified(modified))
            }
            StampMode::Content => Ok(FileStamp::Content(sha256_file(path)?)),
        }
    }
}

fn capture_all(files: &[PathBuf], mode: StampMode) -> Result<Vec<FileStamp>> {
    files
        .par_iter()
        .map(|file| FileStamp::capture(file, mode))
        .collect()
}

/// Stamping failures leave the cache unable to decide anything.
fn stamp_error(key: &DependKey, err: anyhow::Error) -> TaskError {
    TaskError::fatal(
        format!("failed to stamp files of {}/{}/{}", key.emitter, key.target, key.file),
        format!("{:#}", err),
    )
}

/// Structured cache key of one unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DependKey {
    pub target: String,
    pub file: String,
    pub emitter: String,
}

impl DependKey {
    pub fn new(target: impl Into<String>, file: impl Into<String>, emitter: impl Into<String>) -> Self {
        DependKey {
            target: target.into(),
            file: file.into(),
            emitter: emitter.into(),
        }
    }
}

impl From<&TaskFingerprint> for DependKey {
    fn from(fp: &TaskFingerprint) -> Self {
        DependKey::new(fp.target.clone(), fp.file.clone(), fp.emitter.clone())
    }
}

/// What a unit saw the last time it ran successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependRecord {
    pub key: DependKey,
    pub input_files: Vec<PathBuf>,
    pub input_stamps: Vec<FileStamp>,
    pub input_args: Vec<String>,
    pub external_files: Vec<PathBuf>,
    pub external_stamps: Vec<FileStamp>,
}

impl DependRecord {
    /// Whether the unit can be skipped for `files` and `args` (both sorted).
    fn is_up_to_date(&self, files: &[PathBuf], args: &[String], mode: StampMode) -> Result<bool> {
        if self.input_files != files || self.input_args != args {
            return Ok(false);
        }
        if !stamps_match(&self.input_files, &self.input_stamps, mode)? {
            return Ok(false);
        }
        stamps_match(&self.external_files, &self.external_stamps, mode)
    }
}

fn stamps_match(files: &[PathBuf], recorded: &[FileStamp], mode: StampMode) -> Result<bool> {
    if files.len() != recorded.len() {
        return Ok(false);
    }
    let current = capture_all(files, mode)?;
    Ok(current
        .iter()
        .zip(recorded)
        .all(|(now, then)| *now != FileStamp::Missing && now == then))
}

/// Handle passed to a unit body while it runs.
#[derive(Debug, Default)]
pub struct Depend {
    external_files: Vec<PathBuf>,
}

impl Depend {
    /// Track a file the unit produced or read.
    pub fn add_external_file(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.external_files.push(path.into());
        self
    }

    pub fn add_external_files<I>(&mut self, paths: I) -> &mut Self
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.external_files.extend(paths);
        self
    }

    pub fn external_files(&self) -> &[PathBuf] {
        &self.external_files
    }
}

/// Options for a single `on_changed` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependOptions {
    /// Run even when the record says nothing changed.
    pub force: bool,
    pub stamp_mode: StampMode,
}

/// In-memory records backed by an append-only journal.
#[derive(Debug)]
pub struct DependStore {
    path: Option<PathBuf>,
    records: RwLock<HashMap<DependKey, DependRecord>>,
    journal: Mutex<Option<File>>,
}

impl DependStore {
    /// A store that is never persisted.
    pub fn in_memory() -> Self {
        DependStore {
            path: None,
            records: RwLock::new(HashMap::new()),
            journal: Mutex::new(None),
        }
    }

    /// Open the journal at `path`, creating it if needed.
    ///
    /// Lines that fail to parse are skipped with a warning; the affected
    /// units simply run again.
    pub fn open(path: &Path) -> Result<Self> {
        ensure_parent(path)?;
        let mut records = HashMap::new();

        if path.exists() {
            let file = File::open(path)
                .with_context(|| format!("failed to open cache journal: {}", path.display()))?;
            for (index, line) in BufReader::new(file).lines().enumerate() {
                let line = line
                    .with_context(|| format!("failed to read cache journal: {}", path.display()))?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<DependRecord>(&line) {
                    Ok(record) => {
                        records.insert(record.key.clone(), record);
                    }
                    Err(err) => tracing::warn!(
                        "skipping corrupt cache record at {}:{}: {}",
                        path.display(),
                        index + 1,
                        err
                    ),
                }
            }
        }

        let journal = open_journal(path)?;
        tracing::debug!("loaded {} cache records from {}", records.len(), path.display());

        Ok(DependStore {
            path: Some(path.to_path_buf()),
            records: RwLock::new(records),
            journal: Mutex::new(Some(journal)),
        })
    }

    /// Delete the journal at `path`, if any.
    pub fn remove(path: &Path) -> Result<()> {
        crate::util::fs::remove_file_if_exists(path)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: &DependKey) -> Option<DependRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Persist `record`. Failing to write the journal is fatal.
    pub fn commit(&self, record: DependRecord) -> Result<(), TaskError> {
        let mut journal = self.journal.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(file) = journal.as_mut() {
            let line = serde_json::to_string(&record)
                .map_err(|e| TaskError::fatal("failed to encode cache record", e.to_string()))?;
            writeln!(file, "{}", line)
                .and_then(|_| file.flush())
                .map_err(|e| TaskError::fatal("failed to write cache journal", e.to_string()))?;
        }
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.key.clone(), record);
        Ok(())
    }

    /// Run `work` if the inputs of `key` changed since its last success.
    ///
    /// Returns `Ok(true)` when `work` ran and `Ok(false)` when it was
    /// skipped. `files` and `args` are sorted first, so their order never
    /// matters.
    pub fn on_changed<F>(
        &self,
        key: &DependKey,
        mut files: Vec<PathBuf>,
        mut args: Vec<String>,
        options: DependOptions,
        work: F,
    ) -> Result<bool, TaskError>
    where
        F: FnOnce(&mut Depend) -> Result<(), TaskError>,
    {
        files.sort();
        args.sort();

        if !options.force {
            if let Some(previous) = self.get(key) {
                let fresh = previous
                    .is_up_to_date(&files, &args, options.stamp_mode)
                    .map_err(|e| stamp_error(key, e))?;
                if fresh {
                    tracing::debug!("{}/{}/{} is up to date", key.emitter, key.target, key.file);
                    return Ok(false);
                }
            }
        }

        let input_stamps = capture_all(&files, options.stamp_mode).map_err(|e| stamp_error(key, e))?;

        let mut depend = Depend::default();
        work(&mut depend)?;

        let mut external_files = depend.external_files;
        external_files.sort();
        external_files.dedup();
        let external_stamps =
            capture_all(&external_files, options.stamp_mode).map_err(|e| stamp_error(key, e))?;

        self.commit(DependRecord {
            key: key.clone(),
            input_files: files,
            input_stamps,
            input_args: args,
            external_files,
            external_stamps,
        })?;
        Ok(true)
    }

    /// Rewrite the journal with exactly one line per key.
    pub fn compact(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut journal = self.journal.lock().unwrap_or_else(PoisonError::into_inner);

        let mut records: Vec<DependRecord> = self
            .records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;
        for record in &records {
            serde_json::to_writer(&mut tmp, record)?;
            tmp.write_all(b"\n")?;
        }
        tmp.flush()?;
        tmp.persist(path)
            .with_context(|| format!("failed to replace cache journal: {}", path.display()))?;

        *journal = Some(open_journal(path)?);
        tracing::debug!("compacted cache journal to {} records", records.len());
        Ok(())
    }
}

fn open_journal(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open cache journal: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn key() -> DependKey {
        DependKey::new("Lib", "a.cpp", "Cpp.Compile")
    }

    fn bump_mtime(path: &Path) {
        let file = File::options().write(true).open(path).unwrap();
        let modified = file.metadata().unwrap().modified().unwrap();
        file.set_modified(modified + Duration::from_secs(5)).unwrap();
    }

    fn touch_output(depend: &mut Depend, out: &Path) -> Result<(), TaskError> {
        std::fs::write(out, "object").map_err(anyhow::Error::from)?;
        depend.add_external_file(out);
        Ok(())
    }

    #[test]
    fn test_runs_once_then_skips() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.cpp");
        let out = tmp.path().join("a.o");
        std::fs::write(&src, "int a;").unwrap();
        let store = DependStore::in_memory();
        let opts = DependOptions::default();

        let ran = store
            .on_changed(&key(), vec![src.clone()], vec!["-O2".into()], opts, |d| {
                touch_output(d, &out)
            })
            .unwrap();
        assert!(ran);

        let ran = store
            .on_changed(&key(), vec![src.clone()], vec!["-O2".into()], opts, |_| {
                panic!("must not run")
            })
            .unwrap();
        assert!(!ran);
    }

    #[test]
    fn test_argument_order_is_irrelevant() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.cpp");
        std::fs::write(&src, "").unwrap();
        let store = DependStore::in_memory();
        let opts = DependOptions::default();
        let args = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        store
            .on_changed(&key(), vec![src.clone()], args(&["-a", "-b"]), opts, |_| Ok(()))
            .unwrap();
        assert!(!store
            .on_changed(&key(), vec![src.clone()], args(&["-b", "-a"]), opts, |_| Ok(()))
            .unwrap());
        assert!(store
            .on_changed(&key(), vec![src], args(&["-b", "-c"]), opts, |_| Ok(()))
            .unwrap());
    }

    #[test]
    fn test_input_change_reruns() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.cpp");
        std::fs::write(&src, "").unwrap();
        let store = DependStore::in_memory();
        let opts = DependOptions::default();

        store.on_changed(&key(), vec![src.clone()], vec![], opts, |_| Ok(())).unwrap();
        bump_mtime(&src);
        assert!(store.on_changed(&key(), vec![src], vec![], opts, |_| Ok(())).unwrap());
    }

    #[test]
    fn test_missing_output_reruns() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.cpp");
        let out = tmp.path().join("a.o");
        std::fs::write(&src, "").unwrap();
        let store = DependStore::in_memory();
        let opts = DependOptions::default();

        store
            .on_changed(&key(), vec![src.clone()], vec![], opts, |d| touch_output(d, &out))
            .unwrap();
        std::fs::remove_file(&out).unwrap();
        assert!(store
            .on_changed(&key(), vec![src], vec![], opts, |d| touch_output(d, &out))
            .unwrap());
    }

    #[test]
    fn test_failure_commits_nothing() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.cpp");
        std::fs::write(&src, "").unwrap();
        let store = DependStore::in_memory();
        let opts = DependOptions::default();

        let err = store
            .on_changed(&key(), vec![src.clone()], vec![], opts, |_| {
                Err(TaskError::fatal("compile failed", ""))
            })
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(store.get(&key()).is_none());
        assert!(store.on_changed(&key(), vec![src], vec![], opts, |_| Ok(())).unwrap());
    }

    #[test]
    fn test_force_always_runs() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.cpp");
        std::fs::write(&src, "").unwrap();
        let store = DependStore::in_memory();
        let forced = DependOptions {
            force: true,
            ..DependOptions::default()
        };

        store.on_changed(&key(), vec![src.clone()], vec![], forced, |_| Ok(())).unwrap();
        assert!(store.on_changed(&key(), vec![src], vec![], forced, |_| Ok(())).unwrap());
    }

    #[test]
    fn test_content_mode_ignores_touch() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.cpp");
        std::fs::write(&src, "int a;").unwrap();
        let store = DependStore::in_memory();
        let opts = DependOptions {
            stamp_mode: StampMode::Content,
            ..DependOptions::default()
        };

        store.on_changed(&key(), vec![src.clone()], vec![], opts, |_| Ok(())).unwrap();
        bump_mtime(&src);
        assert!(!store.on_changed(&key(), vec![src.clone()], vec![], opts, |_| Ok(())).unwrap());

        std::fs::write(&src, "int b;").unwrap();
        assert!(store.on_changed(&key(), vec![src], vec![], opts, |_| Ok(())).unwrap());
    }

    #[test]
    fn test_unreadable_input_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("not_a_file");
        std::fs::create_dir(&dir).unwrap();
        let store = DependStore::in_memory();
        let opts = DependOptions {
            stamp_mode: StampMode::Content,
            ..DependOptions::default()
        };

        let err = store
            .on_changed(&key(), vec![dir], vec![], opts, |_| Ok(()))
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(store.get(&key()).is_none());
    }

    #[test]
    fn test_journal_survives_reopen_and_compacts() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("a.cpp");
        std::fs::write(&src, "").unwrap();
        let journal = tmp.path().join("cache/depend.jsonl");
        let opts = DependOptions::default();

        {
            let store = DependStore::open(&journal).unwrap();
            store.on_changed(&key(), vec![src.clone()], vec!["1".into()], opts, |_| Ok(())).unwrap();
            store.on_changed(&key(), vec![src.clone()], vec!["2".into()], opts, |_| Ok(())).unwrap();
        }
        assert_eq!(std::fs::read_to_string(&journal).unwrap().lines().count(), 2);

        let store = DependStore::open(&journal).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key()).unwrap().input_args, ["2"]);
        assert!(!store.on_changed(&key(), vec![src], vec!["2".into()], opts, |_| Ok(())).unwrap());

        store.compact().unwrap();
        assert_eq!(std::fs::read_to_string(&journal).unwrap().lines().count(), 1);
    }

    #[test]
    fn test_corrupt_lines_are_skipped() {
        let tmp = TempDir::new().unwrap();
        let journal = tmp.path().join("depend.jsonl");
        std::fs::write(&journal, "{not json\n\n").unwrap();

        let store = DependStore::open(&journal).unwrap();
        assert!(store.is_empty());
    }
}
