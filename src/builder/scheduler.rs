//! Fingerprint-keyed task scheduler.
//!
//! Every unit of work is identified by a [`TaskFingerprint`] and runs at most
//! once. Its boolean result is memoized in a single-assignment slot that is
//! created lazily by whichever side touches it first, so a waiter may ask
//! for a fingerprint before the producer has registered it.
//!
//! Units are tokio tasks. Their blocking parts (tool invocations, hashing)
//! go through [`TaskManager::blocking`], which bounds concurrency with a
//! semaphore sized to the job count. A fatal unit error is queued and
//! cancels the build: units that have not started yet report failure
//! without running, and waiters stop waiting.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;

use crate::core::errors::{ConfigError, FatalError, TaskError};

/// Identity of one unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskFingerprint {
    pub target: String,
    /// Source file for per-file units; empty for target-level units.
    pub file: String,
    pub emitter: String,
}

impl TaskFingerprint {
    /// Fingerprint of a target-level unit.
    pub fn target(target: impl Into<String>, emitter: impl Into<String>) -> Self {
        TaskFingerprint {
            target: target.into(),
            file: String::new(),
            emitter: emitter.into(),
        }
    }

    /// Fingerprint of a per-file unit.
    pub fn file(target: impl Into<String>, file: &Path, emitter: impl Into<String>) -> Self {
        TaskFingerprint {
            target: target.into(),
            file: file.to_string_lossy().into_owned(),
            emitter: emitter.into(),
        }
    }

    pub fn is_file_level(&self) -> bool {
        !self.file.is_empty()
    }
}

impl fmt::Display for TaskFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() {
            write!(f, "{} | {}", self.emitter, self.target)
        } else {
            write!(f, "{} | {} | {}", self.emitter, self.target, self.file)
        }
    }
}

#[derive(Debug)]
struct Slot {
    registered: AtomicBool,
    result: watch::Sender<Option<bool>>,
}

impl Slot {
    fn new() -> Self {
        let (result, _) = watch::channel(None);
        Slot {
            registered: AtomicBool::new(false),
            result,
        }
    }

    fn complete(&self, success: bool) {
        self.result.send_replace(Some(success));
    }
}

/// Runs units once and lets other units await their results.
#[derive(Debug)]
pub struct TaskManager {
    slots: Mutex<HashMap<TaskFingerprint, Arc<Slot>>>,
    stop_all: AtomicBool,
    cancel: watch::Sender<bool>,
    fatal_errors: Mutex<Vec<FatalError>>,
    permits: Semaphore,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskManager {
    /// Create a scheduler that runs at most `jobs` blocking sections at once.
    pub fn new(jobs: usize) -> Arc<Self> {
        let (cancel, _) = watch::channel(false);
        Arc::new(TaskManager {
            slots: Mutex::new(HashMap::new()),
            stop_all: AtomicBool::new(false),
            cancel,
            fatal_errors: Mutex::new(Vec::new()),
            permits: Semaphore::new(jobs.max(1)),
            handles: Mutex::new(Vec::new()),
        })
    }

    fn slot(&self, fingerprint: &TaskFingerprint) -> Arc<Slot> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(fingerprint.clone())
            .or_insert_with(|| Arc::new(Slot::new()))
            .clone()
    }

    fn register(&self, fingerprint: &TaskFingerprint) -> Result<Arc<Slot>, ConfigError> {
        let slot = self.slot(fingerprint);
        if slot.registered.swap(true, Ordering::SeqCst) {
            return Err(ConfigError::DuplicateFingerprint(fingerprint.clone()));
        }
        Ok(slot)
    }

    /// Register a unit that has nothing to do and counts as succeeded.
    pub fn add_completed(&self, fingerprint: TaskFingerprint) -> Result<(), ConfigError> {
        let slot = self.register(&fingerprint)?;
        slot.complete(true);
        Ok(())
    }

    /// Register and start a unit.
    ///
    /// `work` resolves to the unit's success flag. A fatal error is queued
    /// and cancels the build; a recoverable error only fails this unit.
    pub fn run<F>(self: &Arc<Self>, fingerprint: TaskFingerprint, work: F) -> Result<(), ConfigError>
    where
        F: Future<Output = Result<bool, TaskError>> + Send + 'static,
    {
        let slot = self.register(&fingerprint)?;
        let manager = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let success = if manager.is_cancelled() {
                tracing::debug!("skipping {} after cancellation", fingerprint);
                false
            } else {
                match work.await {
                    Ok(success) => success,
                    Err(TaskError::Fatal { summary, detail }) => {
                        tracing::error!("{}: {}", fingerprint, summary);
                        manager.raise(FatalError {
                            fingerprint: fingerprint.clone(),
                            summary,
                            detail,
                        });
                        false
                    }
                    Err(TaskError::Failed(err)) => {
                        tracing::warn!("{} failed: {:#}", fingerprint, err);
                        false
                    }
                }
            };
            slot.complete(success);
        });

        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
        Ok(())
    }

    /// Wait for the unit behind `fingerprint` and return its success flag.
    ///
    /// Returns `false` as soon as the build is cancelled.
    pub async fn await_fingerprint(&self, fingerprint: &TaskFingerprint) -> bool {
        let mut result = self.slot(fingerprint).result.subscribe();
        let mut cancel = self.cancel.subscribe();

        tokio::select! {
            biased;
            done = result.wait_for(Option::is_some) => match done {
                Ok(value) => (*value).unwrap_or(false),
                Err(_) => false,
            },
            _ = cancel.wait_for(|cancelled| *cancelled) => false,
        }
    }

    /// Whether `fingerprint` has a registered unit.
    pub fn is_registered(&self, fingerprint: &TaskFingerprint) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .get(fingerprint)
            .is_some_and(|slot| slot.registered.load(Ordering::SeqCst))
    }

    /// Run blocking work on the blocking pool, bounded by the job count.
    pub async fn blocking<T, F>(&self, work: F) -> Result<T, TaskError>
    where
        F: FnOnce() -> Result<T, TaskError> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| TaskError::fatal("job slots closed", e.to_string()))?;

        match tokio::task::spawn_blocking(work).await {
            Ok(result) => result,
            Err(err) => Err(TaskError::fatal("build worker panicked", err.to_string())),
        }
    }

    fn raise(&self, error: FatalError) {
        self.fatal_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error);
        self.cancel();
    }

    /// Request cancellation. Running units finish; nothing new starts.
    pub fn cancel(&self) {
        self.stop_all.store(true, Ordering::SeqCst);
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop_all.load(Ordering::SeqCst)
    }

    /// Fatal errors queued so far, in the order they were raised.
    pub fn fatal_errors(&self) -> Vec<FatalError> {
        self.fatal_errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait until every registered unit has finished, including units
    /// registered while waiting, and return the queued fatal errors.
    pub async fn wait_all(&self) -> Vec<FatalError> {
        loop {
            let handles = std::mem::take(
                &mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner),
            );
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(err) = handle.await {
                    tracing::error!("build unit panicked: {}", err);
                }
            }
        }
        self.fatal_errors()
    }

    /// Cancel and then wait for everything in flight.
    pub async fn force_quit(&self) -> Vec<FatalError> {
        self.cancel();
        self.wait_all().await
    }
}
