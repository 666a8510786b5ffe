//! Linking and archiving.
//!
//! Static libraries archive their own objects. Everything a static library
//! needs is linked by the nearest executable or shared library that depends
//! on it: those "link-only" inputs are the static library's own final
//! dependencies, collected transitively through further static libraries.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::builder::context::{BuildContext, EmitContext};
use crate::builder::emitter::{Artifact, TaskEmitter};
use crate::builder::toolchain::{Archiver, Language, Linker};
use crate::core::attribute::TargetType;
use crate::core::errors::TaskError;
use crate::core::graph::TargetGraph;
use crate::core::target::Target;

use super::compile::target_objects;

pub const LINK_EMITTER: &str = "Cpp.Link";

/// Path of the binary `name` produces.
pub fn output_path(build: &BuildContext, name: &str, ty: TargetType) -> PathBuf {
    build
        .target_dir(name)
        .join(ty.output_filename(name, &build.os))
}

/// Targets whose outputs a link of `target` consumes.
fn link_closure(graph: &TargetGraph, target: &Target) -> BTreeSet<String> {
    let mut closure = BTreeSet::new();
    let mut pending: Vec<&str> = target.dependencies().iter().map(String::as_str).collect();

    while let Some(name) = pending.pop() {
        if !closure.insert(name.to_string()) {
            continue;
        }
        let Some(dep) = graph.get(name) else {
            continue;
        };
        if matches!(dep.target_type(), TargetType::Static | TargetType::Objects) {
            pending.extend(dep.dependencies().iter().map(String::as_str));
        }
    }
    closure
}

/// Objects and libraries to link `target` from, dependents before their
/// dependencies.
pub fn link_inputs(build: &BuildContext, graph: &TargetGraph, target: &Target) -> Vec<PathBuf> {
    let mut inputs = target_objects(build, target);
    let closure = link_closure(graph, target);

    for name in graph.order().iter().rev().filter(|n| closure.contains(*n)) {
        let Some(dep) = graph.get(name) else {
            continue;
        };
        match dep.target_type() {
            TargetType::Objects => inputs.extend(target_objects(build, dep)),
            ty if ty.is_linkable() => inputs.push(output_path(build, name, ty)),
            _ => {}
        }
    }
    inputs
}

/// Produces the binary of every executable, shared and static library.
pub struct LinkEmitter {
    linker: Arc<dyn Linker>,
    archiver: Arc<dyn Archiver>,
}

impl LinkEmitter {
    pub fn new(linker: Arc<dyn Linker>, archiver: Arc<dyn Archiver>) -> Self {
        LinkEmitter { linker, archiver }
    }
}

impl TaskEmitter for LinkEmitter {
    /// Object libraries take part without producing anything: links that
    /// consume their objects also consume their dependencies' binaries, so
    /// their unit must still wait for those.
    fn enable_emitter(&self, target: &Target) -> bool {
        let ty = target.target_type();
        ty.produces_binary() || ty == TargetType::Objects
    }

    fn emit_target_task(&self, target: &Target) -> bool {
        target.target_type().produces_binary()
    }

    fn per_target_task(
        &self,
        cx: &EmitContext<'_>,
        target: &Target,
    ) -> Result<Option<Artifact>, TaskError> {
        let ty = target.target_type();
        let output = output_path(cx.build, target.name(), ty);

        if ty == TargetType::Static {
            let objects: Vec<String> = target_objects(cx.build, target)
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect();
            let mut driver = self.archiver.create_argument_driver(cx.build.strict_paths);
            driver
                .add_argument("Inputs", objects)
                .add_argument("Output", output.as_path());
            return self.archiver.archive(cx, target, &driver).map(Some);
        }

        let inputs: Vec<String> = link_inputs(cx.build, cx.graph, target)
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect();
        let mut driver = self.linker.create_argument_driver(cx.build.strict_paths);
        driver.add_arguments(target.name(), target.arguments())?;
        driver
            .add_argument("Inputs", inputs)
            .add_argument("Output", output.as_path())
            .add_argument("Shared", ty == TargetType::Dynamic);

        self.linker
            .link(cx, target, Language::for_target(target), &driver)
            .map(Some)
    }
}
