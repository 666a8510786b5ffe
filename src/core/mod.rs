//! Core data structures for Drydock.
//!
//! This module contains the build model:
//! - Targets, their attributes, file lists and arguments
//! - Packages and member instantiation
//! - The target graph and its resolution passes
//! - The `Drydock.toml` manifest

pub mod argument;
pub mod attribute;
pub mod errors;
pub mod file_list;
pub mod graph;
pub mod manifest;
pub mod package;
pub mod target;

pub use argument::{ArgumentValue, Arguments, Visibility};
pub use attribute::{Attribute, AttributeKind, TargetType};
pub use errors::{ConfigError, FatalError, TaskError};
pub use file_list::{FileKind, FileOptions};
pub use graph::TargetGraph;
pub use manifest::Manifest;
pub use package::{Package, PackageConfig};
pub use target::{Target, TargetHook};
