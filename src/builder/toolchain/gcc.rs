//! GCC/Clang toolchain implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::builder::context::EmitContext;
use crate::builder::emitter::Artifact;
use crate::core::errors::TaskError;
use crate::core::file_list::FileKind;
use crate::core::target::Target;
use crate::util::fs::{absolutize, ensure_parent, remove_file_if_exists};
use crate::util::process::ProcessBuilder;

use super::driver::{ArgumentDriver, PathKind, Property, PropertyTable};
use super::{required_path, Archiver, Compiler, Language, Linker, ToolchainPlatform};

/// GCC/Clang toolchain (Unix-like systems).
#[derive(Debug, Clone)]
pub struct GccToolchain {
    /// Path to the C compiler
    pub cc: PathBuf,
    /// Path to the C++ compiler
    pub cxx: PathBuf,
    /// Path to the archiver
    pub ar: PathBuf,
    /// Compiler family (gcc, clang, apple-clang)
    pub family: ToolchainPlatform,
    c_table: Arc<PropertyTable>,
    cpp_table: Arc<PropertyTable>,
    objc_table: Arc<PropertyTable>,
    objcpp_table: Arc<PropertyTable>,
    link_table: Arc<PropertyTable>,
    archive_table: Arc<PropertyTable>,
}

impl GccToolchain {
    pub fn new(cc: PathBuf, cxx: PathBuf, ar: PathBuf, family: ToolchainPlatform) -> Self {
        GccToolchain {
            cc,
            cxx,
            ar,
            family,
            c_table: Arc::new(compiler_table(FileKind::C)),
            cpp_table: Arc::new(compiler_table(FileKind::Cpp)),
            objc_table: Arc::new(compiler_table(FileKind::ObjC)),
            objcpp_table: Arc::new(compiler_table(FileKind::ObjCpp)),
            link_table: Arc::new(linker_table(family)),
            archive_table: Arc::new(archiver_table()),
        }
    }

    /// Infer C++ compiler path from C compiler path.
    ///
    /// - gcc, x86_64-linux-gnu-gcc -> g++, x86_64-linux-gnu-g++
    /// - clang -> clang++
    /// - cc, /usr/bin/cc -> c++, /usr/bin/c++
    pub fn infer_cxx(cc: &Path) -> PathBuf {
        let cc_str = cc.to_string_lossy();

        if let Some(prefix) = cc_str.strip_suffix("gcc") {
            return PathBuf::from(format!("{}g++", prefix));
        }
        if cc_str.ends_with("clang") {
            return PathBuf::from(format!("{}++", cc_str));
        }

        // Only a complete `cc` basename, not `mycc`
        let is_standalone_cc = cc_str == "cc" || cc_str.ends_with("/cc") || cc_str.ends_with("-cc");
        if is_standalone_cc {
            return PathBuf::from(format!("{}++", &cc_str[..cc_str.len() - 1]));
        }

        PathBuf::from(format!("{}++", cc_str))
    }

    fn program(&self, language: Language) -> &Path {
        match language {
            Language::C => &self.cc,
            Language::Cxx => &self.cxx,
        }
    }
}

fn standard(prefix: &'static str, value: &str) -> Option<Vec<String>> {
    let version = value
        .strip_prefix(prefix)
        .or_else(|| value.strip_prefix("gnu"))
        .map(|v| v.trim_start_matches("++"))
        .unwrap_or(value);
    if version.is_empty() || !version.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    let dialect = if value.starts_with("gnu") { "gnu" } else { prefix };
    let plus = if prefix == "c++" && dialect == "gnu" { "++" } else { "" };
    Some(vec![format!("-std={}{}{}", dialect, plus, version)])
}

fn each(prefix: &'static str) -> impl Fn(&str) -> Option<Vec<String>> + Send + Sync {
    move |value| Some(vec![format!("{}{}", prefix, value)])
}

fn verbatim(value: &str) -> Option<Vec<String>> {
    Some(vec![value.to_string()])
}

fn compiler_table(kind: FileKind) -> PropertyTable {
    let cxx = matches!(kind, FileKind::Cpp | FileKind::ObjCpp);
    let language = match kind {
        FileKind::C | FileKind::Header => None,
        FileKind::Cpp => Some("c++"),
        FileKind::ObjC => Some("objective-c"),
        FileKind::ObjCpp => Some("objective-c++"),
    };

    let mut table = PropertyTable::new()
        .property(Property::list("CppFlags", verbatim))
        .property(Property::switch("DebugSymbols", &["-g"], &[]))
        .property(Property::list("Defines", each("-D")))
        .property(Property::list("IncludeDirs", each("-I")).paths(PathKind::Existing))
        .property(
            Property::scalar("Object", |v| Some(vec!["-o".to_string(), v.to_string()]))
                .paths(PathKind::Output),
        )
        .property(Property::scalar("OptimizationLevel", |v| {
            let flag = match v {
                "None" => "-O0",
                "Fast" => "-O1",
                "Faster" => "-O2",
                "Fastest" => "-O3",
                "Smallest" => "-Os",
                _ => return None,
            };
            Some(vec![flag.to_string()])
        }))
        .property(Property::scalar("SIMD", |v| {
            let flags: &[&str] = match v {
                "None" => &[],
                "SSE2" => &["-msse2"],
                "SSE4" => &["-msse4.2"],
                "AVX" => &["-mavx"],
                "AVX2" => &["-mavx2"],
                "AVX512" => &["-mavx512f"],
                "Native" => &["-march=native"],
                _ => return None,
            };
            Some(flags.iter().map(|f| f.to_string()).collect())
        }))
        .property(
            Property::scalar("Source", move |v| {
                let mut tokens = Vec::new();
                if let Some(language) = language {
                    tokens.extend(["-x".to_string(), language.to_string()]);
                }
                tokens.push(v.to_string());
                Some(tokens)
            })
            .paths(PathKind::Existing),
        )
        .property(
            Property::scalar("SourceDependencies", |v| {
                Some(vec!["-MD".to_string(), "-MF".to_string(), v.to_string()])
            })
            .paths(PathKind::Output),
        )
        .property(Property::switch("WarningAsError", &["-Werror"], &[]))
        .raw_flag("-c")
        .raw_flag("-fPIC");

    if cxx {
        let header_language = language.map(|l| format!("{}-header", l));
        table = table
            .property(Property::scalar("CppVersion", |v| standard("c++", v)))
            .property(
                Property::scalar("PCHHeader", move |v| {
                    let mut tokens = Vec::new();
                    if let Some(language) = &header_language {
                        tokens.extend(["-x".to_string(), language.clone()]);
                    }
                    tokens.push(v.to_string());
                    Some(tokens)
                })
                .paths(PathKind::Existing),
            )
            // The compiler picks up `<header>.gch` next to the included header.
            .property(
                Property::scalar("PCHInclude", |v| {
                    Some(vec!["-include".to_string(), v.to_string()])
                })
                .paths(PathKind::Existing),
            )
            .property(
                Property::scalar("PCHObject", |v| Some(vec!["-o".to_string(), v.to_string()]))
                    .paths(PathKind::Output),
            )
            .property(Property::switch("Exception", &[], &["-fno-exceptions"]))
            .property(Property::switch("RTTI", &[], &["-fno-rtti"]));
    } else {
        table = table.property(Property::scalar("CVersion", |v| standard("c", v)));
    }
    table
}

fn linker_table(family: ToolchainPlatform) -> PropertyTable {
    let shared: &'static [&'static str] = if family == ToolchainPlatform::AppleClang {
        &["-dynamiclib"]
    } else {
        &["-shared"]
    };
    PropertyTable::new()
        .property(Property::switch("DebugSymbols", &["-g"], &[]))
        .property(Property::list("Inputs", verbatim).paths(PathKind::Existing))
        .property(Property::list("LinkDirs", each("-L")).paths(PathKind::Existing))
        .property(Property::list("LinkFlags", verbatim))
        .property(Property::list("Links", each("-l")))
        .property(
            Property::scalar("Output", |v| Some(vec!["-o".to_string(), v.to_string()]))
                .paths(PathKind::Output),
        )
        .property(Property::switch("Shared", shared, &[]))
}

fn archiver_table() -> PropertyTable {
    PropertyTable::new()
        .property(Property::list("Inputs", verbatim).paths(PathKind::Existing))
        .property(Property::scalar("Output", |_| Some(Vec::new())).paths(PathKind::Output))
}

fn output_dir_error(path: &Path, err: anyhow::Error) -> TaskError {
    TaskError::fatal(
        format!("failed to create output directory for {}", path.display()),
        format!("{:#}", err),
    )
}

fn inputs(driver: &ArgumentDriver) -> Vec<PathBuf> {
    driver
        .argument("Inputs")
        .and_then(|value| value.as_list())
        .map(|list| list.iter().map(PathBuf::from).collect())
        .unwrap_or_default()
}

/// Prerequisites listed in a Makefile-style depfile.
pub fn parse_depfile(contents: &str) -> Vec<PathBuf> {
    let joined = contents.replace("\\\r\n", " ").replace("\\\n", " ");
    let mut paths = Vec::new();

    for rule in joined.lines() {
        let prerequisites = match rule.split_once(": ") {
            Some((_, rest)) => rest,
            None => continue,
        };
        let mut current = String::new();
        let mut chars = prerequisites.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\\' if chars.peek() == Some(&' ') => {
                    current.push(' ');
                    chars.next();
                }
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        paths.push(PathBuf::from(std::mem::take(&mut current)));
                    }
                }
                c => current.push(c),
            }
        }
        if !current.is_empty() {
            paths.push(PathBuf::from(current));
        }
    }

    paths.sort();
    paths.dedup();
    paths
}

impl Compiler for GccToolchain {
    fn platform(&self) -> ToolchainPlatform {
        self.family
    }

    fn create_argument_driver(&self, kind: FileKind, strict_paths: bool) -> ArgumentDriver {
        let table = match kind {
            FileKind::C | FileKind::Header => &self.c_table,
            FileKind::Cpp => &self.cpp_table,
            FileKind::ObjC => &self.objc_table,
            FileKind::ObjCpp => &self.objcpp_table,
        };
        ArgumentDriver::new(Arc::clone(table)).strict_paths(strict_paths)
    }

    fn compile(
        &self,
        cx: &EmitContext<'_>,
        target: &Target,
        kind: FileKind,
        source: &Path,
        driver: &ArgumentDriver,
    ) -> Result<Artifact, TaskError> {
        let object = match driver.argument("PCHObject").and_then(|value| value.as_scalar()) {
            Some(pch) => PathBuf::from(pch),
            None => required_path(driver, "Object")?,
        };
        let depfile = driver
            .argument("SourceDependencies")
            .and_then(|value| value.as_scalar())
            .map(PathBuf::from);
        let program = self.program(Language::for_kind(kind).unwrap_or(Language::C));
        let args = driver.command_line()?;

        let mut tokens = args.clone();
        tokens.push(program.display().to_string());

        let key = cx.key(target, source.to_string_lossy());
        let changed = cx.on_changed(&key, vec![source.to_path_buf()], tokens, |depend| {
            ensure_parent(&object).map_err(|e| output_dir_error(&object, e))?;
            ProcessBuilder::new(program)
                .args(&args)
                .cwd(target.directory())
                .exec_checked(format!("failed to compile {}", source.display()))?;

            if let Some(depfile) = &depfile {
                match std::fs::read_to_string(depfile) {
                    Ok(contents) => {
                        let headers = parse_depfile(&contents)
                            .into_iter()
                            .map(|p| absolutize(target.directory(), p))
                            .filter(|p| p != source);
                        depend.add_external_files(headers);
                    }
                    Err(err) => tracing::debug!("no depfile at {}: {}", depfile.display(), err),
                }
            }
            depend.add_external_file(&object);
            Ok(())
        })?;

        Ok(Artifact::single(object, !changed))
    }
}

impl Linker for GccToolchain {
    fn create_argument_driver(&self, strict_paths: bool) -> ArgumentDriver {
        ArgumentDriver::new(Arc::clone(&self.link_table)).strict_paths(strict_paths)
    }

    fn link(
        &self,
        cx: &EmitContext<'_>,
        target: &Target,
        language: Language,
        driver: &ArgumentDriver,
    ) -> Result<Artifact, TaskError> {
        let output = required_path(driver, "Output")?;
        let program = self.program(language);
        let args = driver.command_line()?;

        let mut tokens = args.clone();
        tokens.push(program.display().to_string());

        let key = cx.key(target, "");
        let changed = cx.on_changed(&key, inputs(driver), tokens, |depend| {
            ensure_parent(&output).map_err(|e| output_dir_error(&output, e))?;
            ProcessBuilder::new(program)
                .args(&args)
                .cwd(target.directory())
                .exec_checked(format!("failed to link {}", target.name()))?;
            depend.add_external_file(&output);
            Ok(())
        })?;

        Ok(Artifact::single(output, !changed))
    }
}

impl Archiver for GccToolchain {
    fn create_argument_driver(&self, strict_paths: bool) -> ArgumentDriver {
        ArgumentDriver::new(Arc::clone(&self.archive_table)).strict_paths(strict_paths)
    }

    fn archive(
        &self,
        cx: &EmitContext<'_>,
        target: &Target,
        driver: &ArgumentDriver,
    ) -> Result<Artifact, TaskError> {
        let output = required_path(driver, "Output")?;
        let mut rendered = driver.calculate_arguments()?;

        let mut args = vec!["rcs".to_string(), output.display().to_string()];
        args.extend(rendered.remove("Inputs").unwrap_or_default());

        let mut tokens = args.clone();
        tokens.push(self.ar.display().to_string());

        let key = cx.key(target, "");
        let changed = cx.on_changed(&key, inputs(driver), tokens, |depend| {
            ensure_parent(&output).map_err(|e| output_dir_error(&output, e))?;
            // `ar r` keeps members that are no longer inputs
            remove_file_if_exists(&output).map_err(|e| {
                TaskError::fatal(format!("failed to remove {}", output.display()), format!("{:#}", e))
            })?;
            ProcessBuilder::new(&self.ar)
                .args(&args)
                .cwd(target.directory())
                .exec_checked(format!("failed to archive {}", target.name()))?;
            depend.add_external_file(&output);
            Ok(())
        })?;

        Ok(Artifact::single(output, !changed))
    }
}
