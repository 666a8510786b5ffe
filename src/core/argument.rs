//! Named build arguments and their visibility buckets.
//!
//! Arguments are stored by name. A scalar holds a single value and conflicts
//! when two sources disagree; a list accumulates unique values in insertion
//! order. Each target keeps three buckets (public, private, interface) and a
//! resolved view that the emitters read.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::errors::ConfigError;

/// Who sees an argument or a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// The target itself and everything that depends on it.
    Public,
    /// Only the target itself.
    Private,
    /// Only the targets that depend on it.
    Interface,
}

impl Visibility {
    pub const ALL: [Visibility; 3] = [Visibility::Public, Visibility::Private, Visibility::Interface];
}

/// How a value combines with a value of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeBehavior {
    /// Single value; the incoming value replaces or conflicts.
    Override,
    /// Accumulated list.
    Inherit,
}

/// Ordered list of unique values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArgumentList(Vec<String>);

impl ArgumentList {
    pub fn new() -> Self {
        ArgumentList(Vec::new())
    }

    /// Append `value` unless it is already present. Returns whether it was added.
    pub fn push(&mut self, value: impl Into<String>) -> bool {
        let value = value.into();
        if self.0.contains(&value) {
            false
        } else {
            self.0.push(value);
            true
        }
    }

    pub fn extend<I, S>(&mut self, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for value in values {
            self.push(value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, value: &str) -> bool {
        self.0.iter().any(|v| v == value)
    }
}

impl<S: Into<String>> FromIterator<S> for ArgumentList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = ArgumentList::new();
        list.extend(iter);
        list
    }
}

/// The value of a named argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgumentValue {
    Scalar(String),
    List(ArgumentList),
}

impl ArgumentValue {
    pub fn merge_behavior(&self) -> MergeBehavior {
        match self {
            ArgumentValue::Scalar(_) => MergeBehavior::Override,
            ArgumentValue::List(_) => MergeBehavior::Inherit,
        }
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            ArgumentValue::Scalar(s) => Some(s),
            ArgumentValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&ArgumentList> {
        match self {
            ArgumentValue::List(list) => Some(list),
            ArgumentValue::Scalar(_) => None,
        }
    }
}

impl fmt::Display for ArgumentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentValue::Scalar(s) => write!(f, "{}", s),
            ArgumentValue::List(list) => write!(f, "[{}]", list.as_slice().join(", ")),
        }
    }
}

impl From<&str> for ArgumentValue {
    fn from(value: &str) -> Self {
        ArgumentValue::Scalar(value.to_string())
    }
}

impl From<String> for ArgumentValue {
    fn from(value: String) -> Self {
        ArgumentValue::Scalar(value)
    }
}

impl From<bool> for ArgumentValue {
    fn from(value: bool) -> Self {
        ArgumentValue::Scalar(value.to_string())
    }
}

impl From<&std::path::Path> for ArgumentValue {
    fn from(value: &std::path::Path) -> Self {
        ArgumentValue::Scalar(value.to_string_lossy().into_owned())
    }
}

impl From<std::path::PathBuf> for ArgumentValue {
    fn from(value: std::path::PathBuf) -> Self {
        ArgumentValue::from(value.as_path())
    }
}

impl From<ArgumentList> for ArgumentValue {
    fn from(value: ArgumentList) -> Self {
        ArgumentValue::List(value)
    }
}

impl From<Vec<String>> for ArgumentValue {
    fn from(value: Vec<String>) -> Self {
        ArgumentValue::List(value.into_iter().collect())
    }
}

/// Arguments keyed by name.
pub type Arguments = BTreeMap<String, ArgumentValue>;

/// Merge `from` into `to`.
///
/// Lists are unioned. A scalar is copied when absent; an equal scalar is a
/// no-op. A differing scalar replaces the old value when `override_scalars`
/// is set and is a [`ConfigError::ConflictingArgument`] otherwise.
pub fn merge_arguments(
    to: &mut Arguments,
    from: &Arguments,
    override_scalars: bool,
    target: &str,
    source: &str,
) -> Result<(), ConfigError> {
    for (name, incoming) in from {
        let Some(existing) = to.get_mut(name) else {
            to.insert(name.clone(), incoming.clone());
            continue;
        };

        match (existing, incoming) {
            (ArgumentValue::List(existing), ArgumentValue::List(incoming)) => {
                existing.extend(incoming.iter().cloned());
            }
            (ArgumentValue::Scalar(existing), ArgumentValue::Scalar(incoming)) => {
                if existing != incoming {
                    if !override_scalars {
                        return Err(ConfigError::ConflictingArgument {
                            target: target.to_string(),
                            argument: name.clone(),
                            existing: existing.clone(),
                            incoming: incoming.clone(),
                            source_target: source.to_string(),
                        });
                    }
                    *existing = incoming.clone();
                }
            }
            _ => {
                return Err(ConfigError::ArgumentKindMismatch {
                    target: target.to_string(),
                    argument: name.clone(),
                })
            }
        }
    }
    Ok(())
}

/// Per-target argument buckets plus the resolved view.
#[derive(Debug, Clone, Default)]
pub struct ArgumentStore {
    public: Arguments,
    private: Arguments,
    interface: Arguments,
    resolved: Arguments,
}

impl ArgumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bucket(&self, visibility: Visibility) -> &Arguments {
        match visibility {
            Visibility::Public => &self.public,
            Visibility::Private => &self.private,
            Visibility::Interface => &self.interface,
        }
    }

    fn bucket_mut(&mut self, visibility: Visibility) -> &mut Arguments {
        match visibility {
            Visibility::Public => &mut self.public,
            Visibility::Private => &mut self.private,
            Visibility::Interface => &mut self.interface,
        }
    }

    /// Set an argument, replacing any previous value in the same bucket.
    pub fn set(&mut self, visibility: Visibility, name: impl Into<String>, value: impl Into<ArgumentValue>) {
        self.bucket_mut(visibility).insert(name.into(), value.into());
    }

    /// Append values to a list argument, creating it if needed.
    pub fn append<I, S>(
        &mut self,
        target: &str,
        visibility: Visibility,
        name: &str,
        values: I,
    ) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self
            .bucket_mut(visibility)
            .entry(name.to_string())
            .or_insert_with(|| ArgumentValue::List(ArgumentList::new()));
        match entry {
            ArgumentValue::List(list) => {
                list.extend(values);
                Ok(())
            }
            ArgumentValue::Scalar(_) => Err(ConfigError::ArgumentKindMismatch {
                target: target.to_string(),
                argument: name.to_string(),
            }),
        }
    }

    /// Replace the resolved view.
    pub fn set_resolved(&mut self, resolved: Arguments) {
        self.resolved = resolved;
    }

    /// The merged view the emitters read.
    pub fn resolved(&self) -> &Arguments {
        &self.resolved
    }

    /// Own public and private arguments merged together.
    pub fn own_arguments(&self, target: &str) -> Result<Arguments, ConfigError> {
        let mut merged = self.public.clone();
        merge_arguments(&mut merged, &self.private, false, target, target)?;
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(entries: &[(&str, ArgumentValue)]) -> Arguments {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_list_is_unique_and_ordered() {
        let mut list = ArgumentList::new();
        assert!(list.push("b"));
        assert!(list.push("a"));
        assert!(!list.push("b"));
        assert_eq!(list.as_slice(), ["b", "a"]);
    }

    #[test]
    fn test_merge_lists_accumulate() {
        let mut to = args(&[("Defines", vec!["A".to_string()].into())]);
        let from = args(&[("Defines", vec!["B".to_string(), "A".to_string()].into())]);

        merge_arguments(&mut to, &from, false, "App", "Lib").unwrap();
        assert_eq!(
            to["Defines"].as_list().unwrap().as_slice(),
            ["A", "B"]
        );
    }

    #[test]
    fn test_merge_equal_scalars() {
        let mut to = args(&[("CppVersion", "20".into())]);
        let from = args(&[("CppVersion", "20".into())]);
        merge_arguments(&mut to, &from, false, "App", "Lib").unwrap();
        assert_eq!(to["CppVersion"].as_scalar(), Some("20"));
    }

    #[test]
    fn test_merge_conflicting_scalars() {
        let mut to = args(&[("CppVersion", "17".into())]);
        let from = args(&[("CppVersion", "20".into())]);
        let err = merge_arguments(&mut to, &from, false, "App", "Lib").unwrap_err();
        match err {
            ConfigError::ConflictingArgument {
                argument,
                existing,
                incoming,
                source_target,
                ..
            } => {
                assert_eq!(argument, "CppVersion");
                assert_eq!(existing, "17");
                assert_eq!(incoming, "20");
                assert_eq!(source_target, "Lib");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_merge_override_scalars() {
        let mut to = args(&[("OptimizationLevel", "Fast".into())]);
        let from = args(&[("OptimizationLevel", "None".into())]);
        merge_arguments(&mut to, &from, true, "App", "a.cpp").unwrap();
        assert_eq!(to["OptimizationLevel"].as_scalar(), Some("None"));
    }

    #[test]
    fn test_merge_kind_mismatch() {
        let mut to = args(&[("Links", "m".into())]);
        let from = args(&[("Links", vec!["pthread".to_string()].into())]);
        assert!(matches!(
            merge_arguments(&mut to, &from, true, "App", "Lib"),
            Err(ConfigError::ArgumentKindMismatch { .. })
        ));
    }

    #[test]
    fn test_store_append_to_scalar_fails() {
        let mut store = ArgumentStore::new();
        store.set(Visibility::Public, "Defines", "X");
        assert!(store
            .append("Lib", Visibility::Public, "Defines", ["Y"])
            .is_err());
    }

    #[test]
    fn test_own_arguments_merges_public_and_private() {
        let mut store = ArgumentStore::new();
        store
            .append("Lib", Visibility::Public, "Defines", ["PUB"])
            .unwrap();
        store
            .append("Lib", Visibility::Private, "Defines", ["PRIV"])
            .unwrap();
        store
            .append("Lib", Visibility::Interface, "Defines", ["IFACE"])
            .unwrap();

        let own = store.own_arguments("Lib").unwrap();
        assert_eq!(own["Defines"].as_list().unwrap().as_slice(), ["PUB", "PRIV"]);
    }
}
