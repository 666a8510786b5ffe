//! `Drydock.toml` manifest parsing.
//!
//! The manifest registers targets and packages declaratively:
//!
//! ```toml
//! [project]
//! name = "demo"
//!
//! [[target]]
//! name = "Lib"
//! type = "static"
//! files.cpp = ["src/lib/*.cpp"]
//! deps.public = ["Base"]
//! arguments.public = { IncludeDirs = ["include"], CppVersion = "20" }
//!
//! [[package]]
//! name = "zlib"
//! directory = "third_party/zlib"
//!
//! [[package.member]]
//! name = "zlib"
//! type = "static"
//! files.c = ["*.c"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use semver::Version;
use serde::Deserialize;

use crate::builder::system::BuildSystem;
use crate::core::argument::{ArgumentValue, Visibility};
use crate::core::attribute::TargetType;
use crate::core::errors::ConfigError;
use crate::core::file_list::{FileKind, FileOptions};
use crate::core::package::{Package, PackageConfig};
use crate::core::target::Target;
use crate::util::fs::absolutize;

/// Settings whose values are paths relative to the target directory.
const PATH_ARGUMENTS: &[&str] = &["IncludeDirs", "LinkDirs"];

/// A parsed manifest.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    raw: RawManifest,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    #[serde(default)]
    project: Option<ProjectSection>,
    #[serde(default, rename = "target")]
    targets: Vec<TargetSpec>,
    #[serde(default, rename = "package")]
    packages: Vec<PackageSpec>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProjectSection {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct TargetSpec {
    name: String,
    #[serde(default, rename = "type")]
    target_type: Option<TargetType>,
    #[serde(default)]
    directory: Option<PathBuf>,
    #[serde(default)]
    codegen_root: Option<PathBuf>,
    #[serde(default)]
    pch: Option<PchSpec>,
    #[serde(default)]
    use_shared_pch: Option<String>,
    #[serde(default)]
    files: FilesSpec,
    #[serde(default)]
    file_options: Vec<FileOptionsSpec>,
    #[serde(default)]
    deps: VisibilityLists,
    #[serde(default)]
    packages: VisibilityLists,
    #[serde(default)]
    requires: BTreeMap<String, RequirementSpec>,
    #[serde(default)]
    arguments: ArgumentSections,
}

/// Headers to precompile. A private header is used only by its own target.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct PchSpec {
    headers: Vec<PathBuf>,
    #[serde(default)]
    shared: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilesSpec {
    #[serde(default)]
    c: Vec<String>,
    #[serde(default)]
    cpp: Vec<String>,
    #[serde(default)]
    objc: Vec<String>,
    #[serde(default)]
    objcpp: Vec<String>,
    #[serde(default)]
    header: Vec<String>,
}

impl FilesSpec {
    fn iter(&self) -> impl Iterator<Item = (FileKind, &Vec<String>)> {
        [
            (FileKind::C, &self.c),
            (FileKind::Cpp, &self.cpp),
            (FileKind::ObjC, &self.objc),
            (FileKind::ObjCpp, &self.objcpp),
            (FileKind::Header, &self.header),
        ]
        .into_iter()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ArgumentSections {
    #[serde(default)]
    public: BTreeMap<String, RawArgument>,
    #[serde(default)]
    private: BTreeMap<String, RawArgument>,
    #[serde(default)]
    interface: BTreeMap<String, RawArgument>,
}

impl ArgumentSections {
    fn iter(&self) -> impl Iterator<Item = (Visibility, &BTreeMap<String, RawArgument>)> {
        [
            (Visibility::Public, &self.public),
            (Visibility::Private, &self.private),
            (Visibility::Interface, &self.interface),
        ]
        .into_iter()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileOptionsSpec {
    kind: FileKind,
    files: Vec<String>,
    #[serde(default)]
    arguments: BTreeMap<String, RawArgument>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct VisibilityLists {
    #[serde(default)]
    public: Vec<String>,
    #[serde(default)]
    private: Vec<String>,
    #[serde(default)]
    interface: Vec<String>,
}

impl VisibilityLists {
    fn iter(&self) -> impl Iterator<Item = (Visibility, &Vec<String>)> {
        [
            (Visibility::Public, &self.public),
            (Visibility::Private, &self.private),
            (Visibility::Interface, &self.interface),
        ]
        .into_iter()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RequirementSpec {
    Version(Version),
    Detailed {
        version: Version,
        #[serde(default)]
        options: BTreeMap<String, String>,
    },
}

impl RequirementSpec {
    fn to_config(&self) -> PackageConfig {
        match self {
            RequirementSpec::Version(version) => PackageConfig::new(version.clone()),
            RequirementSpec::Detailed { version, options } => PackageConfig {
                version: version.clone(),
                options: options.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawArgument {
    Bool(bool),
    Integer(i64),
    Text(String),
    List(Vec<String>),
}

impl RawArgument {
    fn into_value(self) -> ArgumentValue {
        match self {
            RawArgument::Bool(b) => ArgumentValue::from(b),
            RawArgument::Integer(i) => ArgumentValue::from(i.to_string()),
            RawArgument::Text(s) => ArgumentValue::from(s),
            RawArgument::List(list) => ArgumentValue::from(list),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct PackageSpec {
    name: String,
    #[serde(default)]
    directory: Option<PathBuf>,
    #[serde(default, rename = "member")]
    members: Vec<TargetSpec>,
}

impl Manifest {
    /// Load a manifest from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest: {}", path.display()))?;

        Self::parse(&content, path)
    }

    /// Parse manifest content.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let raw: RawManifest = toml::from_str(content)
            .with_context(|| format!("failed to parse {}", path.display()))?;

        Ok(Manifest {
            path: path.to_path_buf(),
            raw,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory relative paths in the manifest resolve against.
    pub fn directory(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn project_name(&self) -> Option<&str> {
        self.raw.project.as_ref().map(|p| p.name.as_str())
    }

    pub fn target_names(&self) -> impl Iterator<Item = &str> {
        self.raw.targets.iter().map(|t| t.name.as_str())
    }

    /// Whether anything in the manifest needs a C/C++ toolchain.
    pub fn needs_toolchain(&self) -> bool {
        let compiles = |spec: &TargetSpec| {
            spec.files
                .iter()
                .any(|(kind, files)| kind.is_compilable() && !files.is_empty())
        };
        self.raw.targets.iter().any(compiles)
            || self
                .raw
                .packages
                .iter()
                .any(|p| p.members.iter().any(compiles))
    }

    /// Register every declared target and package with `system`.
    pub fn register(&self, system: &mut BuildSystem) -> Result<(), ConfigError> {
        let root = self.directory();

        for spec in &self.raw.packages {
            let directory = spec
                .directory
                .as_ref()
                .map(|d| absolutize(&root, d))
                .unwrap_or_else(|| root.clone());
            let mut package = Package::new(spec.name.clone(), directory);
            for member in &spec.members {
                let member = member.clone();
                package.member(
                    member.name.clone(),
                    Arc::new(move |target: &mut Target, _config: &PackageConfig| {
                        apply_spec(&member, target)
                    }),
                );
            }
            system.add_package(package)?;
        }

        for spec in &self.raw.targets {
            let mut target = Target::new(spec.name.clone(), self.path.clone());
            if let Some(dir) = &spec.directory {
                target.set_directory(absolutize(&root, dir));
            }
            apply_spec(spec, &mut target)?;
            system.add_target(target)?;
        }
        Ok(())
    }
}

fn apply_spec(spec: &TargetSpec, target: &mut Target) -> Result<(), ConfigError> {
    if let Some(ty) = spec.target_type {
        target.set_target_type(ty);
    }
    if let Some(root) = &spec.codegen_root {
        target.set_codegen_meta(root);
    }
    match &spec.pch {
        Some(pch) if pch.shared => {
            target.create_shared_pch(&pch.headers);
        }
        Some(pch) => {
            target.use_private_pch(&pch.headers);
        }
        None => {}
    }
    if let Some(provider) = &spec.use_shared_pch {
        target.use_shared_pch(provider);
    }

    for (kind, files) in spec.files.iter() {
        if !files.is_empty() {
            target.add_files(kind, files);
        }
    }
    for options in &spec.file_options {
        let file_options = FileOptions {
            arguments: options
                .arguments
                .iter()
                .map(|(k, v)| (k.clone(), v.clone().into_value()))
                .collect(),
        };
        target.add_files_with_options(options.kind, file_options, &options.files);
    }

    for (visibility, names) in spec.deps.iter() {
        target.depend(visibility, names.iter().cloned());
    }
    for (visibility, references) in spec.packages.iter() {
        target.depend_package(visibility, references.iter().cloned());
    }
    for (package, requirement) in &spec.requires {
        target.require(package.clone(), requirement.to_config())?;
    }

    for (visibility, arguments) in spec.arguments.iter() {
        for (name, raw) in arguments {
            match raw.clone().into_value() {
                ArgumentValue::List(list) if PATH_ARGUMENTS.contains(&name.as_str()) => {
                    let dir = target.directory().to_path_buf();
                    let paths = list
                        .iter()
                        .map(|p| absolutize(&dir, p).to_string_lossy().into_owned());
                    target.append_argument(visibility, name, paths)?;
                }
                ArgumentValue::List(list) => {
                    target.append_argument(visibility, name, list.iter().cloned())?;
                }
                scalar => {
                    target.set_argument(visibility, name.clone(), scalar);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::attribute::PchMode;

    const SAMPLE: &str = r#"
[project]
name = "demo"

[[target]]
name = "Lib"
type = "static"
files.cpp = ["src/lib/*.cpp"]
files.header = ["include/lib.hpp"]
deps.public = ["Base"]
arguments.public = { IncludeDirs = ["include"], CppVersion = 20, RTTI = false }
arguments.private = { Defines = ["LIB_IMPL"] }

[[target.file-options]]
kind = "cpp"
files = ["src/lib/slow.cpp"]
arguments = { OptimizationLevel = "None" }

[[target]]
name = "Base"
type = "header-only"

[[target]]
name = "App"
files.cpp = ["src/app/main.cpp"]
deps.private = ["Lib"]
packages.private = ["zlib@zlib"]
requires.zlib = "1.3.0"

[[package]]
name = "zlib"
directory = "third_party/zlib"

[[package.member]]
name = "zlib"
type = "static"
files.c = ["*.c"]
"#;

    #[test]
    fn test_parse_sample() {
        let manifest = Manifest::parse(SAMPLE, Path::new("/project/Drydock.toml")).unwrap();
        assert_eq!(manifest.project_name(), Some("demo"));
        assert_eq!(manifest.target_names().collect::<Vec<_>>(), ["Lib", "Base", "App"]);
        assert!(manifest.needs_toolchain());
        assert_eq!(manifest.directory(), PathBuf::from("/project"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = Manifest::parse(
            "[[target]]\nname = \"A\"\nsources = []\n",
            Path::new("Drydock.toml"),
        )
        .unwrap_err();
        assert!(format!("{:#}", err).contains("sources"));
    }

    #[test]
    fn test_register_targets() {
        let manifest = Manifest::parse(SAMPLE, Path::new("/project/Drydock.toml")).unwrap();
        let mut system = BuildSystem::new();
        manifest.register(&mut system).unwrap();

        let lib = system.target("Lib").unwrap();
        assert_eq!(lib.target_type(), TargetType::Static);
        assert!(lib.direct_dependencies(Visibility::Public).contains("Base"));
        let public = lib.argument_store().bucket(Visibility::Public);
        assert_eq!(
            public["IncludeDirs"].as_list().unwrap().as_slice(),
            ["/project/include"]
        );
        assert_eq!(public["CppVersion"], ArgumentValue::from("20"));
        assert_eq!(public["RTTI"], ArgumentValue::from("false"));
        assert_eq!(
            lib.file_options(FileKind::Cpp, Path::new("/project/src/lib/slow.cpp"))
                .unwrap()
                .arguments["OptimizationLevel"],
            ArgumentValue::from("None")
        );

        let app = system.target("App").unwrap();
        assert_eq!(
            app.requirement("zlib").unwrap().version,
            Version::new(1, 3, 0)
        );
        assert!(app.package_dependencies(Visibility::Private).contains("zlib@zlib"));
    }

    #[test]
    fn test_pch_settings() {
        let manifest = Manifest::parse(
            r#"
[[target]]
name = "Core"
type = "static"
files.cpp = ["core.cpp"]
pch = { headers = ["common.h"], shared = true }

[[target]]
name = "App"
files.cpp = ["main.cpp"]
use-shared-pch = "Core"

[[target]]
name = "Tool"
files.cpp = ["tool.cpp"]
pch = { headers = ["tool.h"] }
"#,
            Path::new("/p/Drydock.toml"),
        )
        .unwrap();
        let mut system = BuildSystem::new();
        manifest.register(&mut system).unwrap();

        let core = system.target("Core").unwrap();
        let create = core.attributes().create_pch().unwrap();
        assert_eq!(create.mode, PchMode::Shared);
        assert_eq!(create.headers, [PathBuf::from("/p/common.h")]);
        assert!(core.attributes().use_pch().is_none());

        let app = system.target("App").unwrap();
        assert_eq!(app.attributes().use_pch().unwrap().provider.as_deref(), Some("Core"));
        assert!(app.direct_dependencies(Visibility::Private).contains("Core"));

        let tool = system.target("Tool").unwrap();
        assert_eq!(tool.attributes().create_pch().unwrap().mode, PchMode::Private);
        assert_eq!(tool.attributes().use_pch().unwrap().mode, PchMode::Private);
    }

    #[test]
    fn test_header_only_manifest_needs_no_toolchain() {
        let manifest = Manifest::parse(
            "[[target]]\nname = \"Base\"\ntype = \"header-only\"\nfiles.header = [\"a.hpp\"]\n",
            Path::new("/p/Drydock.toml"),
        )
        .unwrap();
        assert!(!manifest.needs_toolchain());
    }
}
