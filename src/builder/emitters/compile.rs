//! Per-file compilation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::builder::context::{BuildContext, EmitContext};
use crate::builder::emitter::{Artifact, TaskEmitter};
use crate::builder::emitters::pch::pch_include;
use crate::builder::toolchain::Compiler;
use crate::core::attribute::TargetType;
use crate::core::errors::TaskError;
use crate::core::file_list::{FileKind, FileOptions};
use crate::core::target::Target;

pub const COMPILE_EMITTER: &str = "Cpp.Compile";

/// Object file for `source` of `target`.
pub fn object_path(build: &BuildContext, target: &Target, source: &Path) -> PathBuf {
    build
        .object_dir(target.name())
        .join(build.unique_file_name(target, source, "o"))
}

/// Every object file `target` produces, in source order.
pub fn target_objects(build: &BuildContext, target: &Target) -> Vec<PathBuf> {
    target
        .compilable_files()
        .into_iter()
        .map(|(_, source)| object_path(build, target, &source))
        .collect()
}

/// Compiles every C, C++, Objective-C and Objective-C++ file of a target.
pub struct CompileEmitter {
    compiler: Arc<dyn Compiler>,
}

impl CompileEmitter {
    pub fn new(compiler: Arc<dyn Compiler>) -> Self {
        CompileEmitter { compiler }
    }
}

impl TaskEmitter for CompileEmitter {
    fn enable_emitter(&self, target: &Target) -> bool {
        target.target_type() != TargetType::HeaderOnly
    }

    fn emit_file_task(&self, _target: &Target, kind: FileKind) -> bool {
        kind.is_compilable()
    }

    fn per_file_task(
        &self,
        cx: &EmitContext<'_>,
        target: &Target,
        kind: FileKind,
        options: Option<&FileOptions>,
        file: &Path,
    ) -> Result<Option<Artifact>, TaskError> {
        let object = object_path(cx.build, target, file);

        let mut driver = self.compiler.create_argument_driver(kind, cx.build.strict_paths);
        driver.add_arguments(target.name(), target.arguments())?;
        if let Some(options) = options {
            driver.merge_arguments(target.name(), &options.arguments)?;
        }
        driver
            .add_argument("Source", file)
            .add_argument("Object", object.as_path())
            .add_argument("SourceDependencies", object.with_extension("d"));
        if matches!(kind, FileKind::Cpp | FileKind::ObjCpp) {
            if let Some(header) = pch_include(cx.build, target) {
                driver.add_argument("PCHInclude", header);
            }
        }

        self.compiler.compile(cx, target, kind, file, &driver).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::depend::DependStore;

    #[test]
    fn test_object_paths_are_unique_per_source() {
        let build = BuildContext::new("/build", Arc::new(DependStore::in_memory()));
        let mut target = Target::new("Lib", "/project/lib");
        target.add_files(FileKind::Cpp, ["a/x.cpp", "b/x.cpp"]);
        target.add_files(FileKind::Header, ["x.h"]);

        let objects = target_objects(&build, &target);
        assert_eq!(objects.len(), 2);
        assert_ne!(objects[0], objects[1]);
        assert!(objects.iter().all(|o| o.starts_with("/build/Lib/obj")));
    }
}
