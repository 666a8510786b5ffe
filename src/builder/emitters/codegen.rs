//! Reflection metadata generation.
//!
//! All header files of a target are batched into one source file that
//! includes each of them. The meta tool parses that batch with the
//! target's compiler settings and writes generated sources into an output
//! directory. Generated `.cpp` files join the target's C++ file list, so
//! the compile emitter (registered later) builds them with the rest.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::builder::context::EmitContext;
use crate::builder::emitter::{Artifact, TaskEmitter};
use crate::builder::toolchain::Compiler;
use crate::core::errors::TaskError;
use crate::core::file_list::FileKind;
use crate::core::target::Target;
use crate::util::fs::{ensure_dir, files_under, remove_dir_all_if_exists, write_if_changed};
use crate::util::process::ProcessBuilder;

pub const CODEGEN_EMITTER: &str = "Cpp.Meta";

/// Compiler settings the meta tool needs to parse headers.
const PARSE_SETTINGS: &[&str] = &["CppVersion", "Defines", "IncludeDirs"];

fn io_error(message: String, err: anyhow::Error) -> TaskError {
    TaskError::fatal(message, format!("{:#}", err))
}

/// Runs the meta tool over every header of targets that ask for it.
pub struct CodegenEmitter {
    tool: PathBuf,
    compiler: Arc<dyn Compiler>,
}

impl CodegenEmitter {
    pub fn new(tool: impl Into<PathBuf>, compiler: Arc<dyn Compiler>) -> Self {
        CodegenEmitter {
            tool: tool.into(),
            compiler,
        }
    }

    fn batch_source(headers: &[PathBuf]) -> String {
        headers
            .iter()
            .map(|h| format!("#include \"{}\"\n", h.display()))
            .collect()
    }

    /// Rewrite the batch only when its contents change, so its stamp stays
    /// put across runs.
    fn write_batch(path: &Path, contents: &str) -> Result<(), TaskError> {
        write_if_changed(path, contents)
            .map(|_| ())
            .map_err(|e| io_error(format!("failed to write {}", path.display()), e))
    }

    fn parse_arguments(&self, cx: &EmitContext<'_>, target: &Target) -> Result<Vec<String>, TaskError> {
        let mut driver = self.compiler.create_argument_driver(FileKind::Cpp, cx.build.strict_paths);
        for name in PARSE_SETTINGS {
            if let Some(value) = target.arguments().get(*name) {
                driver.add_argument(*name, value.clone());
            }
        }
        Ok(driver
            .calculate_arguments()?
            .into_iter()
            .filter(|(name, _)| PARSE_SETTINGS.contains(name))
            .flat_map(|(_, tokens)| tokens)
            .collect())
    }
}

impl TaskEmitter for CodegenEmitter {
    fn enable_emitter(&self, target: &Target) -> bool {
        target.attributes().codegen_meta().is_some() && target.has_files(FileKind::Header)
    }

    fn emit_target_task(&self, _target: &Target) -> bool {
        true
    }

    fn per_target_task(
        &self,
        cx: &EmitContext<'_>,
        target: &Target,
    ) -> Result<Option<Artifact>, TaskError> {
        let Some(meta) = target.attributes().codegen_meta() else {
            return Ok(None);
        };
        let generated_dir = cx.build.generated_dir(target.name());
        let batch = generated_dir.join("meta_batch.cpp");
        let output_dir = generated_dir.join("meta");

        let headers = target.files(FileKind::Header);
        Self::write_batch(&batch, &Self::batch_source(&headers))?;

        let mut args = vec![
            batch.display().to_string(),
            format!("--output={}", output_dir.display()),
            format!("--root={}", meta.root.display()),
            "--".to_string(),
        ];
        args.extend(self.parse_arguments(cx, target)?);

        let mut tokens = args.clone();
        tokens.push(self.tool.display().to_string());

        let mut inputs = headers;
        inputs.push(batch.clone());

        let key = cx.key(target, batch.to_string_lossy());
        let changed = cx.on_changed(&key, inputs, tokens, |depend| {
            remove_dir_all_if_exists(&output_dir)
                .and_then(|_| ensure_dir(&output_dir))
                .map_err(|e| io_error(format!("failed to prepare {}", output_dir.display()), e))?;
            ProcessBuilder::new(&self.tool)
                .args(&args)
                .cwd(target.directory())
                .exec_checked(format!("failed to generate metadata for {}", target.name()))?;
            depend.add_external_files(files_under(&output_dir));
            Ok(())
        })?;

        let outputs = files_under(&output_dir);
        let sources: Vec<PathBuf> = outputs
            .iter()
            .filter(|p| p.extension().is_some_and(|e| e == "cpp"))
            .cloned()
            .collect();
        tracing::debug!("{} generated {} sources", target.name(), sources.len());
        target.add_generated_files(FileKind::Cpp, sources);

        Ok(Some(Artifact::new(outputs, !changed)))
    }
}
