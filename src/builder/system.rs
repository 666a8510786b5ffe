//! The build system: registries of targets, packages and emitters, and the
//! driver that runs every emitter over every selected target.
//!
//! Each selected target gets one driver task that walks the emitters in
//! registration order. For every emitter it registers a target-level unit
//! (or a completed placeholder when the emitter is disabled for the target)
//! and waits for it before moving on. A target-level unit waits on its
//! declared dependencies, runs the emitter's target task, then schedules and
//! waits for the emitter's per-file units. Its fingerprint therefore stands
//! for "this emitter is done with this target".

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::builder::context::{BuildContext, EmitContext};
use crate::builder::emitter::{Artifact, DependencyModel, EmitterEntry, TaskEmitter};
use crate::builder::progress::BuildProgress;
use crate::builder::scheduler::{TaskFingerprint, TaskManager};
use crate::core::errors::{ConfigError, FatalError, TaskError};
use crate::core::file_list::FileKind;
use crate::core::graph::TargetGraph;
use crate::core::package::Package;
use crate::core::target::{Target, TargetHook};

/// Called after every unit that did work (or failed trying).
pub type UnitCallback = Arc<dyn Fn(&UnitReport) + Send + Sync>;

/// Outcome of one unit.
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub fingerprint: TaskFingerprint,
    pub success: bool,
    pub artifact: Option<Artifact>,
    pub elapsed: Duration,
}

impl UnitReport {
    /// Whether the unit's outputs were up to date.
    pub fn restored(&self) -> bool {
        self.artifact.as_ref().is_some_and(|a| a.restored)
    }
}

/// Outcome of a whole build.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Units sorted by fingerprint
    pub units: Vec<UnitReport>,
    pub fatal_errors: Vec<FatalError>,
    pub elapsed: Duration,
}

impl BuildReport {
    pub fn success(&self) -> bool {
        self.fatal_errors.is_empty() && self.units.iter().all(|u| u.success)
    }

    pub fn unit(&self, fingerprint: &TaskFingerprint) -> Option<&UnitReport> {
        self.units.iter().find(|u| &u.fingerprint == fingerprint)
    }

    /// Units that ran their tool.
    pub fn executed_count(&self) -> usize {
        self.units
            .iter()
            .filter(|u| u.success && !u.restored())
            .count()
    }

    pub fn restored_count(&self) -> usize {
        self.units.iter().filter(|u| u.restored()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.units.iter().filter(|u| !u.success).count()
    }
}

/// Owns everything registered for one build.
#[derive(Default)]
pub struct BuildSystem {
    graph: TargetGraph,
    emitters: Vec<EmitterEntry>,
    on_unit: Option<UnitCallback>,
}

impl BuildSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target. Names are unique.
    pub fn add_target(&mut self, target: Target) -> Result<&mut Target, ConfigError> {
        self.graph.add_target(target)
    }

    pub fn add_package(&mut self, package: Package) -> Result<&mut Package, ConfigError> {
        self.graph.add_package(package)
    }

    /// Register a hook applied to every target added afterwards.
    pub fn target_default(&mut self, hook: TargetHook) {
        self.graph.target_default(hook);
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.graph.get(name)
    }

    pub fn target_mut(&mut self, name: &str) -> Option<&mut Target> {
        self.graph.get_mut(name)
    }

    pub fn graph(&self) -> &TargetGraph {
        &self.graph
    }

    /// Register an emitter under `name`. Emitters run in registration order.
    pub fn add_task_emitter(
        &mut self,
        name: impl Into<String>,
        emitter: Arc<dyn TaskEmitter>,
    ) -> Result<&mut EmitterEntry, ConfigError> {
        let name = name.into();
        if self.emitters.iter().any(|e| e.name() == name) {
            return Err(ConfigError::DuplicateEmitter(name));
        }
        self.emitters.push(EmitterEntry::new(name, emitter));
        let last = self.emitters.len() - 1;
        Ok(&mut self.emitters[last])
    }

    pub fn emitters(&self) -> &[EmitterEntry] {
        &self.emitters
    }

    pub fn on_unit_finished(&mut self, callback: UnitCallback) {
        self.on_unit = Some(callback);
    }

    /// Every emitter dependency must name a registered emitter. Same-target
    /// dependencies must name an earlier one, since emitters of a target
    /// run in order.
    fn validate_emitters(&self) -> Result<(), ConfigError> {
        for (index, entry) in self.emitters.iter().enumerate() {
            for (dependency, model) in entry.dependencies() {
                let position = self
                    .emitters
                    .iter()
                    .position(|e| e.name() == dependency)
                    .ok_or_else(|| ConfigError::UnknownEmitter {
                        emitter: entry.name().to_string(),
                        dependency: dependency.clone(),
                    })?;
                let same_target = matches!(model, DependencyModel::PerTarget | DependencyModel::PerFile);
                if same_target && position >= index {
                    return Err(ConfigError::EmitterOrder {
                        emitter: entry.name().to_string(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Expected number of units that will do work, before generated files.
    fn count_units(&self, selected: &[String]) -> usize {
        let mut total = 0;
        for target in selected.iter().filter_map(|name| self.graph.get(name)) {
            for entry in &self.emitters {
                let emitter = entry.emitter();
                if !emitter.enable_emitter(target) {
                    continue;
                }
                if emitter.emit_target_task(target) {
                    total += 1;
                }
                for kind in target.file_kinds() {
                    if emitter.emit_file_task(target, kind) {
                        total += target.files(kind).len();
                    }
                }
            }
        }
        total
    }

    /// Resolve the graph and run every emitter over the selected targets.
    ///
    /// `filter` names the targets to build (plus their dependencies); empty
    /// builds everything. Configuration errors abort with `Err`; unit
    /// failures are reported in the returned [`BuildReport`].
    pub fn run_build(mut self, context: BuildContext, filter: &[String]) -> Result<BuildReport> {
        let started = Instant::now();

        self.validate_emitters()?;
        self.graph.resolve()?;
        let selected = self.graph.select(filter)?;
        let total = self.count_units(&selected);
        debug!(
            "building {} targets with {} emitters ({} units, {} jobs)",
            selected.len(),
            self.emitters.len(),
            total,
            context.jobs
        );

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(context.jobs.max(1))
            .thread_name("drydock-worker")
            .enable_all()
            .build()
            .context("failed to start the build runtime")?;

        let shared = Arc::new(Shared {
            manager: TaskManager::new(context.jobs),
            progress: BuildProgress::new(total),
            graph: self.graph,
            emitters: self.emitters,
            context,
            units: Mutex::new(Vec::new()),
            config_error: Mutex::new(None),
            on_unit: self.on_unit,
        });

        let fatal_errors = runtime.block_on({
            let shared = Arc::clone(&shared);
            async move {
                let drivers: Vec<_> = selected
                    .into_iter()
                    .map(|name| tokio::spawn(drive_target(Arc::clone(&shared), name)))
                    .collect();
                for driver in drivers {
                    if let Err(err) = driver.await {
                        error!("target driver panicked: {}", err);
                    }
                }
                shared.manager.wait_all().await
            }
        });
        drop(runtime);

        if let Err(err) = shared.context.depend.compact() {
            warn!("failed to compact the dependency store: {:#}", err);
        }

        let config_error = shared
            .config_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(err) = config_error {
            return Err(err.into());
        }

        let mut units = std::mem::take(&mut *shared.units.lock().unwrap_or_else(PoisonError::into_inner));
        units.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));

        Ok(BuildReport {
            units,
            fatal_errors,
            elapsed: started.elapsed(),
        })
    }
}

/// Frozen build state shared by every unit.
struct Shared {
    graph: TargetGraph,
    emitters: Vec<EmitterEntry>,
    context: BuildContext,
    manager: Arc<TaskManager>,
    progress: BuildProgress,
    units: Mutex<Vec<UnitReport>>,
    config_error: Mutex<Option<ConfigError>>,
    on_unit: Option<UnitCallback>,
}

impl Shared {
    fn emit_context<'a>(&'a self, emitter: &'a str) -> EmitContext<'a> {
        EmitContext {
            build: &self.context,
            graph: &self.graph,
            emitter,
        }
    }

    fn raise_config(&self, err: ConfigError) {
        error!("{}", err);
        let mut slot = self.config_error.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        }
        self.manager.cancel();
    }

    fn record(
        &self,
        fingerprint: TaskFingerprint,
        outcome: &Result<Option<Artifact>, TaskError>,
        started: Instant,
    ) {
        let elapsed = started.elapsed();
        let (success, artifact) = match outcome {
            Ok(artifact) => (true, artifact.clone()),
            Err(_) => (false, None),
        };
        let restored = artifact.as_ref().is_some_and(|a| a.restored);
        let finished = self.progress.finish_unit(success && !restored);
        let percentage = self.progress.percentage(finished);

        if !success {
            debug!("[{:5.1}%] {} failed", percentage, fingerprint);
        } else if restored {
            debug!("[{:5.1}%] {} (restored)", percentage, fingerprint);
        } else {
            info!("[{:5.1}%] {} ({:.2}s)", percentage, fingerprint, elapsed.as_secs_f64());
        }

        let report = UnitReport {
            fingerprint,
            success,
            artifact,
            elapsed,
        };
        if let Some(callback) = &self.on_unit {
            callback(&report);
        }
        self.units
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report);
    }
}

fn missing_target(name: &str) -> TaskError {
    TaskError::fatal(format!("target `{}` disappeared during the build", name), "")
}

async fn drive_target(shared: Arc<Shared>, target: String) {
    for index in 0..shared.emitters.len() {
        let fingerprint = TaskFingerprint::target(target.as_str(), shared.emitters[index].name());
        let enabled = shared
            .graph
            .get(&target)
            .is_some_and(|t| shared.emitters[index].emitter().enable_emitter(t));

        let registered = if enabled {
            let unit = emitter_unit(Arc::clone(&shared), target.clone(), index);
            shared.manager.run(fingerprint.clone(), unit)
        } else {
            shared.manager.add_completed(fingerprint.clone())
        };
        if let Err(err) = registered {
            shared.raise_config(err);
            return;
        }

        if !shared.manager.await_fingerprint(&fingerprint).await {
            debug!("{} did not succeed", fingerprint);
        }
    }
}

/// Await `fingerprint`, logging why the caller gives up when it failed.
async fn prerequisite(shared: &Shared, waiter: &TaskFingerprint, fingerprint: &TaskFingerprint) -> bool {
    let success = shared.manager.await_fingerprint(fingerprint).await;
    if !success {
        debug!("{} skipped: {} did not succeed", waiter, fingerprint);
    }
    success
}

async fn emitter_unit(shared: Arc<Shared>, name: String, index: usize) -> Result<bool, TaskError> {
    let entry = &shared.emitters[index];
    let target = shared.graph.get(&name).ok_or_else(|| missing_target(&name))?;
    let fingerprint = TaskFingerprint::target(name.as_str(), entry.name());

    for emitter in entry.dependencies_of(DependencyModel::ExternalTarget) {
        for dependency in target.dependencies() {
            let other = TaskFingerprint::target(dependency.as_str(), emitter);
            if !prerequisite(&shared, &fingerprint, &other).await {
                return Ok(false);
            }
        }
    }
    for emitter in entry.dependencies_of(DependencyModel::PerTarget) {
        let other = TaskFingerprint::target(name.as_str(), emitter);
        if !prerequisite(&shared, &fingerprint, &other).await {
            return Ok(false);
        }
    }

    if entry.emitter().emit_target_task(target) {
        let started = Instant::now();
        let worker = Arc::clone(&shared);
        let target_name = name.clone();
        let outcome = shared
            .manager
            .blocking(move || {
                let entry = &worker.emitters[index];
                let target = worker
                    .graph
                    .get(&target_name)
                    .ok_or_else(|| missing_target(&target_name))?;
                entry
                    .emitter()
                    .per_target_task(&worker.emit_context(entry.name()), target)
            })
            .await;
        shared.record(fingerprint.clone(), &outcome, started);
        outcome?;
    }

    let mut file_units = Vec::new();
    for kind in target.file_kinds() {
        if !entry.emitter().emit_file_task(target, kind) {
            continue;
        }
        for file in target.files(kind) {
            let unit_fingerprint = TaskFingerprint::file(name.as_str(), &file, entry.name());
            let unit = file_unit(Arc::clone(&shared), name.clone(), index, kind, file);
            if let Err(err) = shared.manager.run(unit_fingerprint.clone(), unit) {
                shared.raise_config(err);
                return Ok(false);
            }
            file_units.push(unit_fingerprint);
        }
    }

    let mut success = true;
    for unit in &file_units {
        success &= shared.manager.await_fingerprint(unit).await;
    }
    Ok(success)
}

async fn file_unit(
    shared: Arc<Shared>,
    name: String,
    index: usize,
    kind: FileKind,
    file: PathBuf,
) -> Result<bool, TaskError> {
    let entry = &shared.emitters[index];
    let fingerprint = TaskFingerprint::file(name.as_str(), &file, entry.name());

    for emitter in entry.dependencies_of(DependencyModel::PerFile) {
        // The other emitter ran earlier for this target, so once its
        // target-level unit succeeded every file unit it emits is registered.
        let whole = TaskFingerprint::target(name.as_str(), emitter);
        if !prerequisite(&shared, &fingerprint, &whole).await {
            return Ok(false);
        }
        let other = TaskFingerprint::file(name.as_str(), &file, emitter);
        if shared.manager.is_registered(&other) && !prerequisite(&shared, &fingerprint, &other).await {
            return Ok(false);
        }
    }

    let started = Instant::now();
    let worker = Arc::clone(&shared);
    let outcome = shared
        .manager
        .blocking(move || {
            let entry = &worker.emitters[index];
            let target = worker.graph.get(&name).ok_or_else(|| missing_target(&name))?;
            let options = target.file_options(kind, &file);
            entry.emitter().per_file_task(
                &worker.emit_context(entry.name()),
                target,
                kind,
                options.as_ref(),
                &file,
            )
        })
        .await;
    shared.record(fingerprint, &outcome, started);
    outcome?;
    Ok(true)
}
