//! `drydock build` command

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

use super::project_context;
use crate::cli::{BuildArgs, GlobalArgs, MessageFormat, StampModeArg};
use drydock::builder::emitters::register_cpp_emitters;
use drydock::builder::{
    detect_toolchain, BuildContext, BuildEvent, BuildSystem, DependStore, StampMode, Toolchain,
    UnitReport,
};
use drydock::util::diagnostic::{fatal_report, suggestions};
use drydock::util::Diagnostic;
use drydock::{ConfigError, Manifest};

pub fn execute(args: BuildArgs, global: GlobalArgs) -> Result<i32> {
    let ctx = project_context(args.manifest_path)?;
    let config = ctx.config();
    let json = args.message_format == MessageFormat::Json;

    let manifest = Manifest::load(ctx.manifest_path())?;
    let mut system = BuildSystem::new();
    if let Err(err) = manifest.register(&mut system) {
        return Ok(report_config_error(err, global));
    }

    if manifest.needs_toolchain() {
        let tools = detect_toolchain(&config.toolchain)?;
        let toolchain = Toolchain::from_tools(tools);
        if let Err(err) = register_cpp_emitters(&mut system, &toolchain, config.toolchain.meta.clone()) {
            return Ok(report_config_error(err, global));
        }
    }

    let stamp_mode = match args.stamp_mode {
        Some(StampModeArg::Mtime) => StampMode::Mtime,
        Some(StampModeArg::Content) => StampMode::Content,
        None => config.build.stamp_mode.unwrap_or_default(),
    };
    let depend = Arc::new(DependStore::open(&ctx.depend_store_path())?);
    let context = BuildContext::new(ctx.build_dir(), depend)
        .with_jobs(args.jobs.filter(|j| *j > 0).unwrap_or_else(|| config.jobs()))
        .with_stamp_mode(stamp_mode)
        .with_strict_paths(args.strict_paths || config.build.strict_paths.unwrap_or(false))
        .with_force(args.force);

    let bar = if global.verbose || json {
        None
    } else {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {pos} units {msg}") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(120));
        Some(pb)
    };

    {
        let bar = bar.clone();
        system.on_unit_finished(Arc::new(move |unit: &UnitReport| {
            if let Some(pb) = &bar {
                pb.inc(1);
                pb.set_message(unit.fingerprint.to_string());
            }
            if json {
                let outputs = unit
                    .artifact
                    .as_ref()
                    .map(|a| a.outputs.clone())
                    .unwrap_or_default();
                let fresh = unit.artifact.as_ref().map(|a| a.restored);
                println!("{}", BuildEvent::unit(&unit.fingerprint, unit.success, fresh, outputs).to_json());
            }
        }));
    }

    let result = system.run_build(context, &args.target);
    if let Some(pb) = &bar {
        pb.finish_and_clear();
    }

    let report = match result {
        Ok(report) => report,
        Err(err) => match err.downcast::<ConfigError>() {
            Ok(config_err) => return Ok(report_config_error(config_err, global)),
            Err(err) => return Err(err),
        },
    };

    let success = report.success();
    if json {
        for error in &report.fatal_errors {
            println!("{}", BuildEvent::fatal(error).to_json());
        }
        println!(
            "{}",
            BuildEvent::finished(
                success,
                report.elapsed.as_millis() as u64,
                report.executed_count(),
                report.restored_count(),
            )
            .to_json()
        );
    } else {
        for diagnostic in fatal_report(&report.fatal_errors) {
            eprintln!("{}", diagnostic.format(global.color));
        }
        if success {
            eprintln!(
                "    Finished {} units ({} up to date) in {:.2}s",
                report.units.len(),
                report.restored_count(),
                report.elapsed.as_secs_f64()
            );
        } else if report.fatal_errors.is_empty() {
            eprintln!(
                "{}",
                Diagnostic::error(format!("{} units failed", report.failed_count()))
                    .with_suggestion(suggestions::BUILD_FAILED)
                    .format(global.color)
            );
        }
    }

    Ok(if success { 0 } else { 1 })
}

fn report_config_error(err: ConfigError, global: GlobalArgs) -> i32 {
    if global.color {
        eprintln!("{:?}", miette::Report::new(err));
    } else {
        let mut diagnostic = Diagnostic::error(err.to_string());
        if matches!(err, ConfigError::NoSuchTarget { .. }) {
            diagnostic = diagnostic.with_suggestion(suggestions::TARGET_NOT_FOUND);
        }
        eprintln!("{}", diagnostic.format(false));
    }
    1
}
