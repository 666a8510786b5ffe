//! The build engine.
//!
//! This module holds the scheduler, the incremental cache, the emitter
//! pipeline and the toolchain drivers the pipeline runs.

pub mod context;
pub mod depend;
pub mod emitter;
pub mod emitters;
pub mod events;
pub mod progress;
pub mod scheduler;
pub mod system;
pub mod toolchain;

pub use context::{BuildContext, EmitContext};
pub use depend::{Depend, DependKey, DependOptions, DependStore, StampMode};
pub use emitter::{Artifact, DependencyModel, EmitterEntry, TaskEmitter};
pub use events::BuildEvent;
pub use progress::BuildProgress;
pub use scheduler::{TaskFingerprint, TaskManager};
pub use system::{BuildReport, BuildSystem, UnitReport};
pub use toolchain::{
    detect_toolchain, ArgumentDriver, GccToolchain, Language, Toolchain, ToolchainPlatform,
};
