//! Test doubles for unit tests.
//!
//! [`FakeToolchain`] stands in for the compiler, linker and archiver. It
//! goes through the incremental cache exactly like a real tool, but instead
//! of spawning a process it writes a small output file and records the
//! invocation.

pub mod fixtures;

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::builder::context::EmitContext;
use crate::builder::emitter::Artifact;
use crate::builder::toolchain::{
    required_path, Archiver, ArgumentDriver, Compiler, Language, Linker, PathKind, Property,
    PropertyTable, ToolchainPlatform,
};
use crate::core::errors::TaskError;
use crate::core::file_list::FileKind;
use crate::core::target::Target;
use crate::util::fs::write_string;

/// One recorded tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub tool: &'static str,
    pub target: String,
    pub output: PathBuf,
}

#[derive(Debug)]
pub struct FakeToolchain {
    table: Arc<PropertyTable>,
    invocations: Mutex<Vec<Invocation>>,
    serial: AtomicUsize,
    fail_on: Mutex<Option<String>>,
}

impl Default for FakeToolchain {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeToolchain {
    pub fn new() -> Self {
        let table = PropertyTable::new()
            .property(Property::list("Defines", |v| Some(vec![format!("-D{}", v)])))
            .property(Property::list("Inputs", |v| Some(vec![v.to_string()])).paths(PathKind::Existing))
            .property(Property::scalar("Object", |v| Some(vec![v.to_string()])).paths(PathKind::Output))
            .property(Property::scalar("Output", |v| Some(vec![v.to_string()])).paths(PathKind::Output))
            .property(Property::scalar("PCHHeader", |v| Some(vec![v.to_string()])))
            .property(Property::scalar("PCHInclude", |v| Some(vec![format!("-include={}", v)])))
            .property(Property::scalar("PCHObject", |v| Some(vec![v.to_string()])).paths(PathKind::Output))
            .property(Property::switch("Shared", &["-shared"], &[]))
            .property(Property::scalar("Source", |v| Some(vec![v.to_string()])));
        FakeToolchain {
            table: Arc::new(table),
            invocations: Mutex::new(Vec::new()),
            serial: AtomicUsize::new(0),
            fail_on: Mutex::new(None),
        }
    }

    /// Make every tool run for `target` fail fatally.
    pub fn fail_on(&self, target: &str) {
        *self.fail_on.lock().unwrap() = Some(target.to_string());
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }

    pub fn count(&self, tool: &str) -> usize {
        self.invocations().iter().filter(|i| i.tool == tool).count()
    }

    pub fn clear(&self) {
        self.invocations.lock().unwrap().clear();
    }

    fn driver(&self) -> ArgumentDriver {
        ArgumentDriver::new(Arc::clone(&self.table))
    }

    fn run(
        &self,
        cx: &EmitContext<'_>,
        target: &Target,
        tool: &'static str,
        file: String,
        inputs: Vec<PathBuf>,
        driver: &ArgumentDriver,
    ) -> Result<Artifact, TaskError> {
        let slot = match tool {
            "compile" => "Object",
            "precompile" => "PCHObject",
            _ => "Output",
        };
        let output = required_path(driver, slot)?;
        let args = driver.command_line()?;
        let key = cx.key(target, file);

        let changed = cx.on_changed(&key, inputs, args, |depend| {
            if self.fail_on.lock().unwrap().as_deref() == Some(target.name()) {
                return Err(TaskError::fatal(
                    format!("{} failed for {}", tool, target.name()),
                    "fake tool output",
                ));
            }
            let serial = self.serial.fetch_add(1, Ordering::SeqCst);
            write_string(&output, &format!("{} #{} of {}", tool, serial, target.name()))
                .map_err(|e| TaskError::fatal("fake tool could not write", format!("{:#}", e)))?;
            self.invocations.lock().unwrap().push(Invocation {
                tool,
                target: target.name().to_string(),
                output: output.clone(),
            });
            depend.add_external_file(&output);
            Ok(())
        })?;

        Ok(Artifact::single(output, !changed))
    }
}

fn input_list(driver: &ArgumentDriver) -> Vec<PathBuf> {
    driver
        .argument("Inputs")
        .and_then(|v| v.as_list())
        .map(|list| list.iter().map(PathBuf::from).collect())
        .unwrap_or_default()
}

impl Compiler for FakeToolchain {
    fn platform(&self) -> ToolchainPlatform {
        ToolchainPlatform::Gcc
    }

    fn create_argument_driver(&self, _kind: FileKind, _strict_paths: bool) -> ArgumentDriver {
        self.driver()
    }

    fn compile(
        &self,
        cx: &EmitContext<'_>,
        target: &Target,
        _kind: FileKind,
        source: &std::path::Path,
        driver: &ArgumentDriver,
    ) -> Result<Artifact, TaskError> {
        let tool = if driver.argument("PCHObject").is_some() {
            "precompile"
        } else {
            "compile"
        };
        let file = source.to_string_lossy().into_owned();
        self.run(cx, target, tool, file, vec![source.to_path_buf()], driver)
    }
}

impl Linker for FakeToolchain {
    fn create_argument_driver(&self, _strict_paths: bool) -> ArgumentDriver {
        self.driver()
    }

    fn link(
        &self,
        cx: &EmitContext<'_>,
        target: &Target,
        _language: Language,
        driver: &ArgumentDriver,
    ) -> Result<Artifact, TaskError> {
        self.run(cx, target, "link", String::new(), input_list(driver), driver)
    }
}

impl Archiver for FakeToolchain {
    fn create_argument_driver(&self, _strict_paths: bool) -> ArgumentDriver {
        self.driver()
    }

    fn archive(
        &self,
        cx: &EmitContext<'_>,
        target: &Target,
        driver: &ArgumentDriver,
    ) -> Result<Artifact, TaskError> {
        self.run(cx, target, "archive", String::new(), input_list(driver), driver)
    }
}
