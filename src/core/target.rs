//! Build targets.
//!
//! A target is created during loading, mutated freely until the graph is
//! frozen, and read concurrently while the build runs. The only mutation
//! allowed during execution is appending generated files, which goes through
//! the interior lock around the file lists.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use crate::core::argument::{ArgumentStore, ArgumentValue, Arguments, Visibility};
use crate::core::attribute::{Attribute, AttributeSet, CodegenMeta, CreatePch, PchMode, TargetType, UsePch};
use crate::core::errors::ConfigError;
use crate::core::file_list::{FileKind, FileList, FileOptions};
use crate::core::package::PackageConfig;
use crate::util::fs::absolutize;

/// Callback run against a target at a fixed point of graph resolution.
pub type TargetHook = Arc<dyn Fn(&mut Target) -> Result<(), ConfigError> + Send + Sync>;

#[derive(Debug, Default, Clone)]
struct DependencySet {
    public: BTreeSet<String>,
    private: BTreeSet<String>,
    interface: BTreeSet<String>,
}

impl DependencySet {
    fn get(&self, visibility: Visibility) -> &BTreeSet<String> {
        match visibility {
            Visibility::Public => &self.public,
            Visibility::Private => &self.private,
            Visibility::Interface => &self.interface,
        }
    }

    fn get_mut(&mut self, visibility: Visibility) -> &mut BTreeSet<String> {
        match visibility {
            Visibility::Public => &mut self.public,
            Visibility::Private => &mut self.private,
            Visibility::Interface => &mut self.interface,
        }
    }
}

/// A named unit of build work.
pub struct Target {
    name: String,
    location: PathBuf,
    directory: PathBuf,
    attributes: AttributeSet,
    file_lists: RwLock<BTreeMap<FileKind, FileList>>,
    arguments: ArgumentStore,
    dependencies: DependencySet,
    package_dependencies: DependencySet,
    requirements: BTreeMap<String, PackageConfig>,
    final_dependencies: BTreeSet<String>,
    after_load: Vec<TargetHook>,
    before_build: Vec<TargetHook>,
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("name", &self.name)
            .field("directory", &self.directory)
            .field("attributes", &self.attributes)
            .field("dependencies", &self.dependencies)
            .field("final_dependencies", &self.final_dependencies)
            .finish_non_exhaustive()
    }
}

impl Target {
    /// Create a target declared in `location`; relative paths resolve
    /// against the directory containing it.
    pub fn new(name: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        let location = location.into();
        let directory = if location.is_dir() || location.extension().is_none() {
            location.clone()
        } else {
            location
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| location.clone())
        };
        Target {
            name: name.into(),
            location,
            directory,
            attributes: AttributeSet::new(),
            file_lists: RwLock::new(BTreeMap::new()),
            arguments: ArgumentStore::new(),
            dependencies: DependencySet::default(),
            package_dependencies: DependencySet::default(),
            requirements: BTreeMap::new(),
            final_dependencies: BTreeSet::new(),
            after_load: Vec::new(),
            before_build: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Override the directory relative paths resolve against.
    pub fn set_directory(&mut self, directory: impl Into<PathBuf>) -> &mut Self {
        self.directory = directory.into();
        self
    }

    // ----- attributes -----

    pub fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }

    pub fn set_attribute(&mut self, attribute: Attribute) -> &mut Self {
        self.attributes.set(attribute);
        self
    }

    pub fn set_target_type(&mut self, ty: TargetType) -> &mut Self {
        self.set_attribute(Attribute::TargetType(ty))
    }

    /// Declared target type, defaulting to an executable.
    pub fn target_type(&self) -> TargetType {
        self.attributes.target_type().unwrap_or_default()
    }

    pub fn set_codegen_meta(&mut self, root: impl AsRef<Path>) -> &mut Self {
        let root = absolutize(&self.directory, root);
        self.set_attribute(Attribute::CodegenMeta(CodegenMeta { root }))
    }

    fn absolute_paths<I, P>(&self, paths: I) -> Vec<PathBuf>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        paths.into_iter().map(|p| absolutize(&self.directory, p)).collect()
    }

    /// Precompile `headers` for this target's own C++ sources only.
    pub fn use_private_pch<I, P>(&mut self, headers: I) -> &mut Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let headers = self.absolute_paths(headers);
        self.set_attribute(Attribute::CreatePch(CreatePch {
            mode: PchMode::Private,
            headers,
        }))
        .set_attribute(Attribute::UsePch(UsePch {
            mode: PchMode::Private,
            provider: None,
        }))
    }

    /// Precompile `headers` for targets that call [`Target::use_shared_pch`].
    pub fn create_shared_pch<I, P>(&mut self, headers: I) -> &mut Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let headers = self.absolute_paths(headers);
        self.set_attribute(Attribute::CreatePch(CreatePch {
            mode: PchMode::Shared,
            headers,
        }))
    }

    /// Include the shared header created by `provider`, which becomes a
    /// private dependency unless it is this target.
    pub fn use_shared_pch(&mut self, provider: &str) -> &mut Self {
        let provider = if provider == self.name {
            None
        } else {
            self.depend(Visibility::Private, [provider]);
            Some(provider.to_string())
        };
        self.set_attribute(Attribute::UsePch(UsePch {
            mode: PchMode::Shared,
            provider,
        }))
    }

    // ----- files -----

    fn with_list<R>(&self, kind: FileKind, f: impl FnOnce(&mut FileList) -> R) -> R {
        let mut lists = self
            .file_lists
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let list = lists
            .entry(kind)
            .or_insert_with(|| FileList::new(kind, self.directory.clone()));
        f(list)
    }

    /// Add paths or glob patterns of `kind`.
    pub fn add_files<I, S>(&mut self, kind: FileKind, entries: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.with_list(kind, |list| list.add(entries));
        self
    }

    /// Add paths or glob patterns of `kind` that carry extra arguments.
    pub fn add_files_with_options<I, S>(
        &mut self,
        kind: FileKind,
        options: FileOptions,
        entries: I,
    ) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.with_list(kind, |list| list.add_with_options(options, entries));
        self
    }

    /// Append files produced while the build runs.
    pub fn add_generated_files<I>(&self, kind: FileKind, files: I)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.with_list(kind, |list| list.add_generated(files));
    }

    pub(crate) fn resolve_globs(&mut self) -> Result<(), ConfigError> {
        let name = self.name.clone();
        let lists = self
            .file_lists
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for list in lists.values_mut() {
            list.resolve_globs(&name)?;
        }
        Ok(())
    }

    /// Kinds that currently have at least one file.
    pub fn file_kinds(&self) -> Vec<FileKind> {
        let lists = self.file_lists.read().unwrap_or_else(PoisonError::into_inner);
        lists
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(kind, _)| *kind)
            .collect()
    }

    /// Snapshot of the files of `kind`.
    pub fn files(&self, kind: FileKind) -> Vec<PathBuf> {
        let lists = self.file_lists.read().unwrap_or_else(PoisonError::into_inner);
        lists
            .get(&kind)
            .map(|list| list.files().map(Path::to_path_buf).collect())
            .unwrap_or_default()
    }

    /// Snapshot of every compilable file, grouped by kind.
    pub fn compilable_files(&self) -> Vec<(FileKind, PathBuf)> {
        let lists = self.file_lists.read().unwrap_or_else(PoisonError::into_inner);
        lists
            .iter()
            .filter(|(kind, _)| kind.is_compilable())
            .flat_map(|(kind, list)| list.files().map(move |f| (*kind, f.to_path_buf())))
            .collect()
    }

    pub fn has_files(&self, kind: FileKind) -> bool {
        let lists = self.file_lists.read().unwrap_or_else(PoisonError::into_inner);
        lists.get(&kind).is_some_and(|list| !list.is_empty())
    }

    pub fn has_file(&self, kind: FileKind, file: &Path) -> bool {
        let lists = self.file_lists.read().unwrap_or_else(PoisonError::into_inner);
        lists.get(&kind).is_some_and(|list| list.contains(file))
    }

    pub fn file_options(&self, kind: FileKind, file: &Path) -> Option<FileOptions> {
        let lists = self.file_lists.read().unwrap_or_else(PoisonError::into_inner);
        lists.get(&kind).and_then(|list| list.options(file)).cloned()
    }

    // ----- arguments -----

    pub fn argument_store(&self) -> &ArgumentStore {
        &self.arguments
    }

    pub(crate) fn argument_store_mut(&mut self) -> &mut ArgumentStore {
        &mut self.arguments
    }

    /// Resolved arguments: own public and private plus what dependencies export.
    pub fn arguments(&self) -> &Arguments {
        self.arguments.resolved()
    }

    /// Set a single-valued argument.
    pub fn set_argument(
        &mut self,
        visibility: Visibility,
        name: impl Into<String>,
        value: impl Into<ArgumentValue>,
    ) -> &mut Self {
        self.arguments.set(visibility, name, value);
        self
    }

    /// Append to a list argument.
    pub fn append_argument<I, S>(
        &mut self,
        visibility: Visibility,
        name: &str,
        values: I,
    ) -> Result<&mut Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.append(&self.name, visibility, name, values)?;
        Ok(self)
    }

    fn append_paths<I, P>(&mut self, visibility: Visibility, name: &str, paths: I) -> Result<&mut Self, ConfigError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let values: Vec<String> = paths
            .into_iter()
            .map(|p| absolutize(&self.directory, p).to_string_lossy().into_owned())
            .collect();
        self.append_argument(visibility, name, values)
    }

    pub fn c_version(&mut self, visibility: Visibility, version: &str) -> &mut Self {
        self.set_argument(visibility, "CVersion", version)
    }

    pub fn cpp_version(&mut self, visibility: Visibility, version: &str) -> &mut Self {
        self.set_argument(visibility, "CppVersion", version)
    }

    pub fn optimization_level(&mut self, visibility: Visibility, level: &str) -> &mut Self {
        self.set_argument(visibility, "OptimizationLevel", level)
    }

    pub fn debug_symbols(&mut self, visibility: Visibility, enabled: bool) -> &mut Self {
        self.set_argument(visibility, "DebugSymbols", enabled)
    }

    pub fn exceptions(&mut self, visibility: Visibility, enabled: bool) -> &mut Self {
        self.set_argument(visibility, "Exception", enabled)
    }

    pub fn rtti(&mut self, visibility: Visibility, enabled: bool) -> &mut Self {
        self.set_argument(visibility, "RTTI", enabled)
    }

    pub fn warning_as_error(&mut self, visibility: Visibility, enabled: bool) -> &mut Self {
        self.set_argument(visibility, "WarningAsError", enabled)
    }

    pub fn defines<I, S>(&mut self, visibility: Visibility, defines: I) -> Result<&mut Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.append_argument(visibility, "Defines", defines)
    }

    pub fn include_dirs<I, P>(&mut self, visibility: Visibility, dirs: I) -> Result<&mut Self, ConfigError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.append_paths(visibility, "IncludeDirs", dirs)
    }

    pub fn link_dirs<I, P>(&mut self, visibility: Visibility, dirs: I) -> Result<&mut Self, ConfigError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.append_paths(visibility, "LinkDirs", dirs)
    }

    pub fn links<I, S>(&mut self, visibility: Visibility, libs: I) -> Result<&mut Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.append_argument(visibility, "Links", libs)
    }

    pub fn cpp_flags<I, S>(&mut self, visibility: Visibility, flags: I) -> Result<&mut Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.append_argument(visibility, "CppFlags", flags)
    }

    pub fn link_flags<I, S>(&mut self, visibility: Visibility, flags: I) -> Result<&mut Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.append_argument(visibility, "LinkFlags", flags)
    }

    // ----- dependencies -----

    /// Depend on other targets by name.
    pub fn depend<I, S>(&mut self, visibility: Visibility, names: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .get_mut(visibility)
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Depend on package members through `package@member` references.
    pub fn depend_package<I, S>(&mut self, visibility: Visibility, references: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.package_dependencies
            .get_mut(visibility)
            .extend(references.into_iter().map(Into::into));
        self
    }

    /// Pin the configuration used for every member of `package`.
    pub fn require(&mut self, package: impl Into<String>, config: PackageConfig) -> Result<&mut Self, ConfigError> {
        let package = package.into();
        if self.requirements.contains_key(&package) {
            return Err(ConfigError::PackageAlreadyRequired {
                target: self.name.clone(),
                package,
            });
        }
        self.requirements.insert(package, config);
        Ok(self)
    }

    pub fn requirement(&self, package: &str) -> Option<&PackageConfig> {
        self.requirements.get(package)
    }

    /// Direct dependencies declared with `visibility`.
    pub fn direct_dependencies(&self, visibility: Visibility) -> &BTreeSet<String> {
        self.dependencies.get(visibility)
    }

    pub fn package_dependencies(&self, visibility: Visibility) -> &BTreeSet<String> {
        self.package_dependencies.get(visibility)
    }

    /// Every direct dependency regardless of visibility.
    pub fn all_direct_dependencies(&self) -> impl Iterator<Item = &String> {
        Visibility::ALL
            .into_iter()
            .flat_map(move |vis| self.dependencies.get(vis).iter())
    }

    /// Transitive dependencies that apply to this target. Empty until the
    /// graph is resolved.
    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.final_dependencies
    }

    pub(crate) fn set_final_dependencies(&mut self, deps: BTreeSet<String>) {
        self.final_dependencies = deps;
    }

    // ----- hooks -----

    /// Run `hook` after every target and package member has been loaded.
    pub fn after_load(&mut self, hook: TargetHook) -> &mut Self {
        self.after_load.push(hook);
        self
    }

    /// Run `hook` after arguments are resolved, just before the build starts.
    pub fn before_build(&mut self, hook: TargetHook) -> &mut Self {
        self.before_build.push(hook);
        self
    }

    pub(crate) fn run_after_load(&mut self) -> Result<(), ConfigError> {
        for hook in std::mem::take(&mut self.after_load) {
            hook(self)?;
        }
        Ok(())
    }

    pub(crate) fn run_before_build(&mut self) -> Result<(), ConfigError> {
        for hook in std::mem::take(&mut self.before_build) {
            hook(self)?;
        }
        Ok(())
    }
}
