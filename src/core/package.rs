//! Packages: named sets of member targets created on demand.
//!
//! A member is materialized once per distinct configuration. Targets that
//! require the same package with the same configuration share one instance.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::core::errors::ConfigError;
use crate::core::target::Target;
use crate::util::hash::Fingerprint;

/// Factory that fills in a freshly created member target.
pub type MemberFactory = Arc<dyn Fn(&mut Target, &PackageConfig) -> Result<(), ConfigError> + Send + Sync>;

/// Version and options a target pins for a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageConfig {
    pub version: Version,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl PackageConfig {
    pub fn new(version: Version) -> Self {
        PackageConfig {
            version,
            options: BTreeMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Stable key used to memoize member instances.
    pub fn cache_key(&self) -> String {
        let mut fp = Fingerprint::new();
        fp.update_str(&self.version.to_string());
        for (key, value) in &self.options {
            fp.update_str(key).update_str(value);
        }
        fp.finish()
    }

    /// Name of the target created for `member` of `package`.
    pub fn member_target_name(&self, package: &str, member: &str) -> String {
        if self.options.is_empty() {
            format!("{}@{}@{}", package, member, self.version)
        } else {
            let mut hash = self.cache_key();
            hash.truncate(8);
            format!("{}@{}@{}-{}", package, member, self.version, hash)
        }
    }
}

/// Result of acquiring a package member.
pub enum Acquired {
    /// An instance with this configuration already exists.
    Existing(String),
    /// A new target that the caller must register.
    Created(Target),
}

/// A named set of member factories.
pub struct Package {
    name: String,
    location: PathBuf,
    members: BTreeMap<String, MemberFactory>,
    instances: BTreeMap<(String, String), String>,
}

impl fmt::Debug for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Package")
            .field("name", &self.name)
            .field("location", &self.location)
            .field("members", &self.members.keys().collect::<Vec<_>>())
            .field("instances", &self.instances)
            .finish()
    }
}

impl Package {
    pub fn new(name: impl Into<String>, location: impl Into<PathBuf>) -> Self {
        Package {
            name: name.into(),
            location: location.into(),
            members: BTreeMap::new(),
            instances: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Declare a member that dependents can reference as `package@member`.
    pub fn member(&mut self, name: impl Into<String>, factory: MemberFactory) -> &mut Self {
        self.members.insert(name.into(), factory);
        self
    }

    pub fn has_member(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    /// Get or create the instance of `member` for `config`.
    pub fn acquire(&mut self, member: &str, config: &PackageConfig) -> Result<Acquired, ConfigError> {
        let key = (member.to_string(), config.cache_key());
        if let Some(existing) = self.instances.get(&key) {
            return Ok(Acquired::Existing(existing.clone()));
        }

        let factory = self
            .members
            .get(member)
            .ok_or_else(|| ConfigError::UnknownPackageMember {
                package: self.name.clone(),
                member: member.to_string(),
            })?;

        let name = config.member_target_name(&self.name, member);
        let mut target = Target::new(name.clone(), self.location.clone());
        factory(&mut target, config)?;

        tracing::debug!("materialized package member `{}`", name);
        self.instances.insert(key, name);
        Ok(Acquired::Created(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::attribute::TargetType;

    fn zlib() -> Package {
        let mut package = Package::new("zlib", "/packages/zlib");
        package.member(
            "zlib",
            Arc::new(|target: &mut Target, config: &PackageConfig| -> Result<(), ConfigError> {
                target.set_target_type(TargetType::Static);
                if config.options.get("shared").map(String::as_str) == Some("true") {
                    target.set_target_type(TargetType::Dynamic);
                }
                Ok(())
            }),
        );
        package
    }

    #[test]
    fn test_member_target_name() {
        let config = PackageConfig::new(Version::new(1, 3, 0));
        assert_eq!(config.member_target_name("zlib", "zlib"), "zlib@zlib@1.3.0");

        let config = config.with_option("shared", "true");
        let name = config.member_target_name("zlib", "zlib");
        assert!(name.starts_with("zlib@zlib@1.3.0-"));
        assert_eq!(name.len(), "zlib@zlib@1.3.0-".len() + 8);
    }

    #[test]
    fn test_acquire_is_memoized() {
        let mut package = zlib();
        let config = PackageConfig::new(Version::new(1, 3, 0));

        let first = package.acquire("zlib", &config).unwrap();
        let Acquired::Created(target) = first else {
            panic!("expected a new target");
        };
        assert_eq!(target.target_type(), TargetType::Static);
        assert_eq!(target.directory(), Path::new("/packages/zlib"));

        match package.acquire("zlib", &config).unwrap() {
            Acquired::Existing(name) => assert_eq!(name, target.name()),
            Acquired::Created(_) => panic!("expected the memoized instance"),
        }
    }

    #[test]
    fn test_distinct_configs_create_distinct_instances() {
        let mut package = zlib();
        let plain = PackageConfig::new(Version::new(1, 3, 0));
        let shared = plain.clone().with_option("shared", "true");

        assert!(matches!(package.acquire("zlib", &plain).unwrap(), Acquired::Created(_)));
        match package.acquire("zlib", &shared).unwrap() {
            Acquired::Created(target) => assert_eq!(target.target_type(), TargetType::Dynamic),
            Acquired::Existing(_) => panic!("options must create a new instance"),
        }
    }

    #[test]
    fn test_unknown_member() {
        let mut package = zlib();
        let config = PackageConfig::new(Version::new(1, 3, 0));
        assert!(package.has_member("zlib"));
        assert!(!package.has_member("minizip"));
        assert!(matches!(
            package.acquire("minizip", &config),
            Err(ConfigError::UnknownPackageMember { .. })
        ));
    }
}
