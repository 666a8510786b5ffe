//! Precompiled headers.
//!
//! A target that creates a precompiled header gets one umbrella header in
//! its generated directory, listing every requested header, and the
//! compiler turns it into `<umbrella>.gch` beside it. Sources of targets
//! that use it are compiled with `-include <umbrella>`, which the compiler
//! satisfies from the precompiled file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::builder::context::{BuildContext, EmitContext};
use crate::builder::emitter::{Artifact, TaskEmitter};
use crate::builder::toolchain::Compiler;
use crate::core::attribute::PchMode;
use crate::core::errors::TaskError;
use crate::core::file_list::FileKind;
use crate::core::target::Target;
use crate::util::fs::write_if_changed;

pub const PCH_EMITTER: &str = "Cpp.PCH";

/// Umbrella header `target` writes for `mode`.
pub fn pch_header_path(build: &BuildContext, target: &str, mode: PchMode) -> PathBuf {
    build.generated_dir(target).join(mode.header_name())
}

/// Precompiled form of `header`.
pub fn pch_object_path(header: &Path) -> PathBuf {
    let mut name = header.as_os_str().to_owned();
    name.push(".gch");
    PathBuf::from(name)
}

/// Umbrella header the C++ sources of `target` include, if any.
pub fn pch_include(build: &BuildContext, target: &Target) -> Option<PathBuf> {
    let used = target.attributes().use_pch()?;
    let provider = used.provider.as_deref().unwrap_or(target.name());
    Some(pch_header_path(build, provider, used.mode))
}

fn umbrella_source(headers: &[PathBuf]) -> String {
    let mut source = String::from("#ifdef __cplusplus\n");
    for header in headers {
        source.push_str(&format!("#include \"{}\"\n", header.display()));
    }
    source.push_str("#endif\n");
    source
}

/// Writes and precompiles the umbrella header of targets that create one.
pub struct PchEmitter {
    compiler: Arc<dyn Compiler>,
}

impl PchEmitter {
    pub fn new(compiler: Arc<dyn Compiler>) -> Self {
        PchEmitter { compiler }
    }
}

impl TaskEmitter for PchEmitter {
    fn enable_emitter(&self, target: &Target) -> bool {
        target.attributes().create_pch().is_some()
    }

    fn emit_target_task(&self, _target: &Target) -> bool {
        true
    }

    fn per_target_task(
        &self,
        cx: &EmitContext<'_>,
        target: &Target,
    ) -> Result<Option<Artifact>, TaskError> {
        let Some(create) = target.attributes().create_pch() else {
            return Ok(None);
        };
        let header = pch_header_path(cx.build, target.name(), create.mode);
        let object = pch_object_path(&header);

        if write_if_changed(&header, &umbrella_source(&create.headers))
            .map_err(|e| TaskError::fatal(format!("failed to write {}", header.display()), format!("{:#}", e)))?
        {
            tracing::debug!("{} rewrote {}", target.name(), header.display());
        }

        let mut driver = self.compiler.create_argument_driver(FileKind::Cpp, cx.build.strict_paths);
        driver.add_arguments(target.name(), target.arguments())?;
        driver
            .add_argument("PCHHeader", header.as_path())
            .add_argument("PCHObject", object.as_path())
            .add_argument("SourceDependencies", header.with_extension("h.d"));

        self.compiler
            .compile(cx, target, FileKind::Cpp, &header, &driver)
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::depend::DependStore;
    use crate::test_support::FakeToolchain;

    #[test]
    fn test_enabled_only_for_creators() {
        let emitter = PchEmitter::new(Arc::new(FakeToolchain::new()));
        let mut creator = Target::new("Core", "/p/core");
        creator.create_shared_pch(["core.h"]);
        assert!(emitter.enable_emitter(&creator));
        assert!(emitter.emit_target_task(&creator));

        let mut user = Target::new("App", "/p/app");
        user.use_shared_pch("Core");
        assert!(!emitter.enable_emitter(&user));
    }

    #[test]
    fn test_umbrella_source() {
        let headers = [PathBuf::from("/p/a.h"), PathBuf::from("/p/b.hpp")];
        assert_eq!(
            umbrella_source(&headers),
            "#ifdef __cplusplus\n#include \"/p/a.h\"\n#include \"/p/b.hpp\"\n#endif\n"
        );
    }

    #[test]
    fn test_include_follows_provider() {
        let build = BuildContext::new("/build", Arc::new(DependStore::in_memory()));

        let mut own = Target::new("App", "/p/app");
        own.use_private_pch(["pch.h"]);
        assert_eq!(
            pch_include(&build, &own),
            Some(PathBuf::from("/build/App/gen/PrivatePCH.h"))
        );

        let mut user = Target::new("Tool", "/p/tool");
        user.use_shared_pch("Core");
        assert_eq!(
            pch_include(&build, &user),
            Some(PathBuf::from("/build/Core/gen/SharedPCH.h"))
        );

        assert_eq!(pch_include(&build, &Target::new("Plain", "/p")), None);
        assert_eq!(
            pch_object_path(Path::new("/build/Core/gen/SharedPCH.h")),
            PathBuf::from("/build/Core/gen/SharedPCH.h.gch")
        );
    }
}
