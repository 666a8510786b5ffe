//! Argument drivers: translate a target's named settings into tool flags.
//!
//! A [`PropertyTable`] maps setting names to handlers. Each property
//! declares how it merges and whether its values are paths, as plain data
//! next to its handler. An [`ArgumentDriver`] collects the settings for one
//! invocation and renders them through its table.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::core::argument::{merge_arguments, ArgumentValue, Arguments, MergeBehavior};
use crate::core::errors::{ConfigError, TaskError};

/// Whether a property's values name files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    NotPath,
    /// Must exist when strict path checking is on.
    Existing,
    /// Produced by the tool; its parent directory is created before running.
    Output,
}

/// A rejected setting value.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PropertyError {
    #[error("unsupported value `{value}` for `{property}`")]
    InvalidValue { property: String, value: String },

    #[error("`{property}` expects {expected}")]
    WrongKind {
        property: String,
        expected: &'static str,
    },

    #[error("path `{path}` given to `{property}` does not exist")]
    MissingPath { property: String, path: String },
}

impl From<PropertyError> for TaskError {
    fn from(err: PropertyError) -> Self {
        TaskError::fatal(err.to_string(), "")
    }
}

type Handler = Arc<dyn Fn(&str) -> Option<Vec<String>> + Send + Sync>;

/// One named setting a tool understands.
#[derive(Clone)]
pub struct Property {
    name: &'static str,
    merge: MergeBehavior,
    paths: PathKind,
    handler: Handler,
}

impl Property {
    /// A single-valued setting. `handler` returns `None` for values it rejects.
    pub fn scalar<F>(name: &'static str, handler: F) -> Self
    where
        F: Fn(&str) -> Option<Vec<String>> + Send + Sync + 'static,
    {
        Property {
            name,
            merge: MergeBehavior::Override,
            paths: PathKind::NotPath,
            handler: Arc::new(handler),
        }
    }

    /// An accumulated setting. `handler` renders each item.
    pub fn list<F>(name: &'static str, handler: F) -> Self
    where
        F: Fn(&str) -> Option<Vec<String>> + Send + Sync + 'static,
    {
        Property {
            name,
            merge: MergeBehavior::Inherit,
            paths: PathKind::NotPath,
            handler: Arc::new(handler),
        }
    }

    /// A boolean switch rendered as `on` when true and `off` when false.
    pub fn switch(name: &'static str, on: &'static [&'static str], off: &'static [&'static str]) -> Self {
        Property::scalar(name, move |value| match value {
            "true" => Some(on.iter().map(|s| s.to_string()).collect()),
            "false" => Some(off.iter().map(|s| s.to_string()).collect()),
            _ => None,
        })
    }

    pub fn paths(mut self, kind: PathKind) -> Self {
        self.paths = kind;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn merge_behavior(&self) -> MergeBehavior {
        self.merge
    }

    pub fn path_kind(&self) -> PathKind {
        self.paths
    }

    fn render(&self, value: &ArgumentValue, strict_paths: bool) -> Result<Vec<String>, PropertyError> {
        let items: Vec<&str> = match (self.merge, value) {
            (MergeBehavior::Override, ArgumentValue::Scalar(v)) => vec![v.as_str()],
            (MergeBehavior::Inherit, ArgumentValue::List(list)) => list.iter().map(String::as_str).collect(),
            (MergeBehavior::Inherit, ArgumentValue::Scalar(v)) => vec![v.as_str()],
            (MergeBehavior::Override, ArgumentValue::List(_)) => {
                return Err(PropertyError::WrongKind {
                    property: self.name.to_string(),
                    expected: "a single value",
                })
            }
        };

        let mut tokens = Vec::new();
        for item in items {
            if strict_paths && self.paths == PathKind::Existing && !Path::new(item).exists() {
                return Err(PropertyError::MissingPath {
                    property: self.name.to_string(),
                    path: item.to_string(),
                });
            }
            let rendered = (self.handler)(item).ok_or_else(|| PropertyError::InvalidValue {
                property: self.name.to_string(),
                value: item.to_string(),
            })?;
            tokens.extend(rendered);
        }
        Ok(tokens)
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("name", &self.name)
            .field("merge", &self.merge)
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

/// The properties one tool understands, plus flags it always passes.
#[derive(Debug, Clone, Default)]
pub struct PropertyTable {
    properties: BTreeMap<&'static str, Property>,
    raw_flags: Vec<String>,
}

impl PropertyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property(mut self, property: Property) -> Self {
        self.properties.insert(property.name, property);
        self
    }

    pub fn raw_flag(mut self, flag: impl Into<String>) -> Self {
        self.raw_flags.push(flag.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    pub fn raw_flags(&self) -> &[String] {
        &self.raw_flags
    }

    /// Names of every output-path property.
    pub fn outputs(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.properties
            .values()
            .filter(|p| p.paths == PathKind::Output)
            .map(|p| p.name)
    }
}

/// Settings for a single tool invocation.
#[derive(Debug, Clone)]
pub struct ArgumentDriver {
    table: Arc<PropertyTable>,
    arguments: Arguments,
    raw: Vec<String>,
    strict_paths: bool,
}

impl ArgumentDriver {
    pub fn new(table: Arc<PropertyTable>) -> Self {
        ArgumentDriver {
            table,
            arguments: Arguments::new(),
            raw: Vec::new(),
            strict_paths: false,
        }
    }

    pub fn strict_paths(mut self, strict: bool) -> Self {
        self.strict_paths = strict;
        self
    }

    pub fn table(&self) -> &PropertyTable {
        &self.table
    }

    /// Add a target's resolved arguments. Conflicting single values fail.
    pub fn add_arguments(&mut self, target: &str, arguments: &Arguments) -> Result<(), ConfigError> {
        merge_arguments(&mut self.arguments, arguments, false, target, target)
    }

    /// Layer overrides on top (per-file options). Single values replace.
    pub fn merge_arguments(&mut self, target: &str, arguments: &Arguments) -> Result<(), ConfigError> {
        merge_arguments(&mut self.arguments, arguments, true, target, target)
    }

    /// Set one argument, replacing any previous value.
    pub fn add_argument(&mut self, name: impl Into<String>, value: impl Into<ArgumentValue>) -> &mut Self {
        self.arguments.insert(name.into(), value.into());
        self
    }

    /// Append a flag passed through untouched after the rendered settings.
    pub fn add_raw(&mut self, flag: impl Into<String>) -> &mut Self {
        self.raw.push(flag.into());
        self
    }

    pub fn argument(&self, name: &str) -> Option<&ArgumentValue> {
        self.arguments.get(name)
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }

    /// Render every known setting, keyed by property name.
    pub fn calculate_arguments(&self) -> Result<BTreeMap<&'static str, Vec<String>>, PropertyError> {
        let mut rendered = BTreeMap::new();
        for (name, value) in &self.arguments {
            let Some(property) = self.table.get(name) else {
                tracing::trace!("no property handles `{}`", name);
                continue;
            };
            rendered.insert(property.name, property.render(value, self.strict_paths)?);
        }
        Ok(rendered)
    }

    /// The full argument list: settings in property-name order, then the
    /// table's fixed flags, then raw flags.
    pub fn command_line(&self) -> Result<Vec<String>, PropertyError> {
        let mut tokens: Vec<String> = self.calculate_arguments()?.into_values().flatten().collect();
        tokens.extend(self.table.raw_flags.iter().cloned());
        tokens.extend(self.raw.iter().cloned());
        Ok(tokens)
    }

    /// Values of the output-path properties that are set.
    pub fn output_paths(&self) -> Vec<String> {
        let mut outputs = Vec::new();
        for name in self.table.outputs() {
            match self.arguments.get(name) {
                Some(ArgumentValue::Scalar(path)) => outputs.push(path.clone()),
                Some(ArgumentValue::List(list)) => outputs.extend(list.iter().cloned()),
                None => {}
            }
        }
        outputs
    }
}
