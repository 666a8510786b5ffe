//! The C/C++ emitter pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use crate::builder::emitter::DependencyModel;
use crate::builder::system::BuildSystem;
use crate::builder::toolchain::Toolchain;
use crate::core::errors::ConfigError;

pub mod codegen;
pub mod compile;
pub mod link;
pub mod pch;

pub use codegen::{CodegenEmitter, CODEGEN_EMITTER};
pub use compile::{object_path, target_objects, CompileEmitter, COMPILE_EMITTER};
pub use link::{link_inputs, output_path, LinkEmitter, LINK_EMITTER};
pub use pch::{PchEmitter, PCH_EMITTER};

/// Register metadata generation (when a meta tool is given), precompiled
/// headers, compilation and linking. Each target compiles after its own
/// codegen and after its own and its dependencies' precompiled headers, and
/// links after its own objects and every dependency's binary.
pub fn register_cpp_emitters(
    system: &mut BuildSystem,
    toolchain: &Toolchain,
    meta_tool: Option<PathBuf>,
) -> Result<(), ConfigError> {
    let has_meta = meta_tool.is_some();
    if let Some(tool) = meta_tool {
        system.add_task_emitter(
            CODEGEN_EMITTER,
            Arc::new(CodegenEmitter::new(tool, Arc::clone(&toolchain.compiler))),
        )?;
    }

    system.add_task_emitter(
        PCH_EMITTER,
        Arc::new(PchEmitter::new(Arc::clone(&toolchain.compiler))),
    )?;

    let compile = system.add_task_emitter(
        COMPILE_EMITTER,
        Arc::new(CompileEmitter::new(Arc::clone(&toolchain.compiler))),
    )?;
    if has_meta {
        compile.add_dependency(CODEGEN_EMITTER, DependencyModel::PerTarget);
    }
    compile
        .add_dependency(PCH_EMITTER, DependencyModel::PerTarget)
        .add_dependency(PCH_EMITTER, DependencyModel::ExternalTarget);

    system
        .add_task_emitter(
            LINK_EMITTER,
            Arc::new(LinkEmitter::new(
                Arc::clone(&toolchain.linker),
                Arc::clone(&toolchain.archiver),
            )),
        )?
        .add_dependency(COMPILE_EMITTER, DependencyModel::PerTarget)
        .add_dependency(COMPILE_EMITTER, DependencyModel::ExternalTarget)
        .add_dependency(LINK_EMITTER, DependencyModel::ExternalTarget);
    Ok(())
}
