//! The target graph and its resolution passes.
//!
//! Loading fills the graph with targets and packages. [`TargetGraph::resolve`]
//! then runs, in order: package reference resolution, dependency merging
//! (with cycle detection), `after_load` hooks, glob expansion and argument
//! merging, and finally `before_build` hooks. After that the graph is frozen
//! and shared read-only with the scheduler.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use rayon::prelude::*;

use crate::core::argument::{merge_arguments, Arguments, Visibility};
use crate::core::errors::ConfigError;
use crate::core::package::{Acquired, Package};
use crate::core::target::{Target, TargetHook};

/// Every target and package known to one build.
#[derive(Default)]
pub struct TargetGraph {
    targets: BTreeMap<String, Target>,
    packages: BTreeMap<String, Package>,
    defaults: Vec<TargetHook>,
    order: Vec<String>,
}

impl TargetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook applied to every target when it is added.
    pub fn target_default(&mut self, hook: TargetHook) {
        self.defaults.push(hook);
    }

    fn apply_defaults(&self, target: &mut Target) -> Result<(), ConfigError> {
        for hook in &self.defaults {
            hook(target)?;
        }
        Ok(())
    }

    pub fn add_target(&mut self, mut target: Target) -> Result<&mut Target, ConfigError> {
        if self.targets.contains_key(target.name()) {
            return Err(ConfigError::DuplicateTarget(target.name().to_string()));
        }
        self.apply_defaults(&mut target)?;
        let name = target.name().to_string();
        Ok(self.targets.entry(name).or_insert(target))
    }

    pub fn add_package(&mut self, package: Package) -> Result<&mut Package, ConfigError> {
        if self.packages.contains_key(package.name()) {
            return Err(ConfigError::DuplicatePackage(package.name().to_string()));
        }
        let name = package.name().to_string();
        Ok(self.packages.entry(name).or_insert(package))
    }

    pub fn get(&self, name: &str) -> Option<&Target> {
        self.targets.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Target> {
        self.targets.get_mut(name)
    }

    pub fn package_mut(&mut self, name: &str) -> Option<&mut Package> {
        self.packages.get_mut(name)
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.targets.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.targets.keys()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Target names with every dependency before its dependents.
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Run every resolution pass.
    pub fn resolve(&mut self) -> Result<(), ConfigError> {
        self.resolve_packages()?;
        self.resolve_dependencies()?;
        for target in self.targets.values_mut() {
            target.run_after_load()?;
        }
        self.resolve_arguments()?;
        for target in self.targets.values_mut() {
            target.run_before_build()?;
        }
        Ok(())
    }

    /// Replace `package@member` references with concrete member targets.
    pub fn resolve_packages(&mut self) -> Result<(), ConfigError> {
        let mut pending: Vec<String> = self.targets.keys().cloned().collect();

        while let Some(name) = pending.pop() {
            let mut resolved = Vec::new();
            let mut created = Vec::new();

            let Some(target) = self.targets.get(&name) else {
                continue;
            };
            for visibility in Visibility::ALL {
                for reference in target.package_dependencies(visibility) {
                    let (package_name, member) = reference
                        .split_once('@')
                        .filter(|(p, m)| !p.is_empty() && !m.is_empty() && !m.contains('@'))
                        .ok_or_else(|| ConfigError::InvalidPackageReference {
                            target: name.clone(),
                            reference: reference.clone(),
                        })?;
                    let config = target.requirement(package_name).ok_or_else(|| {
                        ConfigError::PackageNotRequired {
                            target: name.clone(),
                            package: package_name.to_string(),
                        }
                    })?;
                    let package = self.packages.get_mut(package_name).ok_or_else(|| {
                        ConfigError::UnknownPackage {
                            target: name.clone(),
                            package: package_name.to_string(),
                        }
                    })?;

                    match package.acquire(member, config)? {
                        Acquired::Existing(member_name) => resolved.push((visibility, member_name)),
                        Acquired::Created(member_target) => {
                            resolved.push((visibility, member_target.name().to_string()));
                            created.push(member_target);
                        }
                    }
                }
            }

            for member_target in created {
                let member_name = member_target.name().to_string();
                self.add_target(member_target)?;
                pending.push(member_name);
            }
            if let Some(target) = self.targets.get_mut(&name) {
                for (visibility, member_name) in resolved {
                    target.depend(visibility, [member_name]);
                }
            }
        }
        Ok(())
    }

    /// Compute the final dependency set of every target and the build order.
    pub fn resolve_dependencies(&mut self) -> Result<(), ConfigError> {
        for target in self.targets.values() {
            for dep in target.all_direct_dependencies() {
                if !self.targets.contains_key(dep) {
                    return Err(ConfigError::UnknownTarget {
                        target: target.name().to_string(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        let graph = self.direct_graph();
        self.order = match toposort(&graph, None) {
            Ok(sorted) => sorted.into_iter().rev().map(|n| graph[n].clone()).collect(),
            Err(_) => {
                return Err(ConfigError::DependencyCycle {
                    cycle: find_cycle(&graph),
                })
            }
        };

        let finals: Vec<(String, BTreeSet<String>)> = self
            .targets
            .values()
            .map(|target| (target.name().to_string(), self.final_dependencies(target)))
            .collect();
        for (name, deps) in finals {
            if let Some(target) = self.targets.get_mut(&name) {
                target.set_final_dependencies(deps);
            }
        }
        Ok(())
    }

    /// Edge `a -> b` means `a` depends on `b` directly.
    fn direct_graph(&self) -> DiGraph<String, ()> {
        let mut graph = DiGraph::new();
        let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
        for name in self.targets.keys() {
            nodes.insert(name.as_str(), graph.add_node(name.clone()));
        }
        for target in self.targets.values() {
            let from = nodes[target.name()];
            for dep in target.all_direct_dependencies() {
                let to = nodes[dep.as_str()];
                if !graph.contains_edge(from, to) {
                    graph.add_edge(from, to, ());
                }
            }
        }
        graph
    }

    /// Own public and private dependencies, plus the public and interface
    /// dependencies they export, recursively.
    fn final_dependencies(&self, target: &Target) -> BTreeSet<String> {
        let mut deps = BTreeSet::new();
        for visibility in [Visibility::Public, Visibility::Private] {
            for dep in target.direct_dependencies(visibility) {
                if deps.insert(dep.clone()) {
                    self.collect_exported(dep, &mut deps);
                }
            }
        }
        deps
    }

    fn collect_exported(&self, name: &str, into: &mut BTreeSet<String>) {
        let Some(target) = self.targets.get(name) else {
            return;
        };
        for visibility in [Visibility::Public, Visibility::Interface] {
            for dep in target.direct_dependencies(visibility) {
                if into.insert(dep.clone()) {
                    self.collect_exported(dep, into);
                }
            }
        }
    }

    /// Expand globs and build each target's resolved argument view.
    pub fn resolve_arguments(&mut self) -> Result<(), ConfigError> {
        self.targets
            .par_iter_mut()
            .try_for_each(|(_, target)| target.resolve_globs())?;

        let resolved: Vec<(String, Arguments)> = self
            .targets
            .par_iter()
            .map(|(name, target)| -> Result<(String, Arguments), ConfigError> {
                let mut arguments = target.argument_store().own_arguments(name)?;
                for dep_name in target.dependencies() {
                    let Some(dep) = self.targets.get(dep_name) else {
                        continue;
                    };
                    let store = dep.argument_store();
                    merge_arguments(&mut arguments, store.bucket(Visibility::Public), false, name, dep_name)?;
                    merge_arguments(&mut arguments, store.bucket(Visibility::Interface), false, name, dep_name)?;
                }
                Ok((name.clone(), arguments))
            })
            .collect::<Result<_, ConfigError>>()?;

        for (name, arguments) in resolved {
            if let Some(target) = self.targets.get_mut(&name) {
                target.argument_store_mut().set_resolved(arguments);
            }
        }
        Ok(())
    }

    /// The requested targets plus everything they depend on, in build order.
    /// An empty request selects every target.
    pub fn select(&self, requested: &[String]) -> Result<Vec<String>, ConfigError> {
        if requested.is_empty() {
            return Ok(self.order.clone());
        }

        let mut selected = BTreeSet::new();
        let mut pending: Vec<&String> = Vec::new();
        for name in requested {
            if !self.targets.contains_key(name) {
                return Err(ConfigError::NoSuchTarget {
                    name: name.clone(),
                    available: self.targets.keys().cloned().collect::<Vec<_>>().join(", "),
                });
            }
            pending.push(name);
        }

        // Every selected target waits on its own final deps, private ones
        // included, so the selection is closed over them.
        while let Some(name) = pending.pop() {
            if !selected.insert(name.clone()) {
                continue;
            }
            if let Some(target) = self.targets.get(name) {
                pending.extend(target.dependencies().iter());
            }
        }

        Ok(self
            .order
            .iter()
            .filter(|name| selected.contains(*name))
            .cloned()
            .collect())
    }
}

/// Names along one cycle, closed by repeating the first name.
fn find_cycle(graph: &DiGraph<String, ()>) -> Vec<String> {
    for component in tarjan_scc(graph) {
        let is_cycle = component.len() > 1
            || component
                .first()
                .is_some_and(|&n| graph.contains_edge(n, n));
        if is_cycle {
            let mut names: Vec<String> = component.iter().rev().map(|&n| graph[n].clone()).collect();
            if let Some(first) = names.first().cloned() {
                names.push(first);
            }
            return names;
        }
    }
    Vec::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::argument::ArgumentValue;
    use crate::core::package::PackageConfig;
    use std::sync::Arc;

    fn graph_with(targets: Vec<Target>) -> TargetGraph {
        let mut graph = TargetGraph::new();
        for target in targets {
            graph.add_target(target).unwrap();
        }
        graph
    }

    fn target(name: &str) -> Target {
        Target::new(name, "/project")
    }

    #[test]
    fn test_duplicate_target() {
        let mut graph = graph_with(vec![target("A")]);
        assert!(matches!(
            graph.add_target(target("A")),
            Err(ConfigError::DuplicateTarget(name)) if name == "A"
        ));
    }

    #[test]
    fn test_visibility_propagation() {
        // C -public-> A -private-> B, A -public-> D, D -interface-> E
        let mut a = target("A");
        a.depend(Visibility::Private, ["B"]);
        a.depend(Visibility::Public, ["D"]);
        let mut c = target("C");
        c.depend(Visibility::Public, ["A"]);
        let mut d = target("D");
        d.depend(Visibility::Interface, ["E"]);

        let mut graph = graph_with(vec![a, target("B"), c, d, target("E")]);
        graph.resolve_dependencies().unwrap();

        let deps = |name: &str| -> Vec<String> {
            graph.get(name).unwrap().dependencies().iter().cloned().collect()
        };
        assert_eq!(deps("A"), ["B", "D", "E"]);
        assert_eq!(deps("C"), ["A", "D", "E"]);
        assert_eq!(deps("D"), Vec::<String>::new());
    }

    #[test]
    fn test_order_is_deps_first() {
        let mut app = target("App");
        app.depend(Visibility::Private, ["Lib"]);
        let mut lib = target("Lib");
        lib.depend(Visibility::Public, ["Base"]);

        let mut graph = graph_with(vec![app, lib, target("Base")]);
        graph.resolve_dependencies().unwrap();

        let pos = |name: &str| graph.order().iter().position(|n| n == name).unwrap();
        assert!(pos("Base") < pos("Lib"));
        assert!(pos("Lib") < pos("App"));
    }

    #[test]
    fn test_cycle_is_rejected() {
        let mut a = target("A");
        a.depend(Visibility::Public, ["B"]);
        let mut b = target("B");
        b.depend(Visibility::Private, ["A"]);

        let mut graph = graph_with(vec![a, b]);
        match graph.resolve_dependencies() {
            Err(ConfigError::DependencyCycle { cycle }) => {
                assert_eq!(cycle.len(), 3);
                assert_eq!(cycle.first(), cycle.last());
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_dependency() {
        let mut a = target("A");
        a.depend(Visibility::Public, ["Missing"]);
        let mut graph = graph_with(vec![a]);
        assert!(matches!(
            graph.resolve_dependencies(),
            Err(ConfigError::UnknownTarget { dependency, .. }) if dependency == "Missing"
        ));
    }

    #[test]
    fn test_argument_resolution() {
        let mut lib = target("Lib");
        lib.defines(Visibility::Public, ["LIB_PUBLIC"]).unwrap();
        lib.defines(Visibility::Private, ["LIB_PRIVATE"]).unwrap();
        lib.defines(Visibility::Interface, ["USES_LIB"]).unwrap();
        lib.cpp_version(Visibility::Public, "20");
        let mut app = target("App");
        app.depend(Visibility::Private, ["Lib"]);
        app.defines(Visibility::Private, ["APP"]).unwrap();
        app.cpp_version(Visibility::Private, "20");

        let mut graph = graph_with(vec![lib, app]);
        graph.resolve().unwrap();

        let app = graph.get("App").unwrap();
        assert_eq!(
            app.arguments()["Defines"].as_list().unwrap().as_slice(),
            ["APP", "LIB_PUBLIC", "USES_LIB"]
        );
        assert_eq!(app.arguments()["CppVersion"], ArgumentValue::from("20"));

        let lib = graph.get("Lib").unwrap();
        assert_eq!(
            lib.arguments()["Defines"].as_list().unwrap().as_slice(),
            ["LIB_PUBLIC", "LIB_PRIVATE"]
        );
    }

    #[test]
    fn test_conflicting_public_scalars() {
        let mut lib = target("Lib");
        lib.cpp_version(Visibility::Public, "17");
        let mut app = target("App");
        app.depend(Visibility::Public, ["Lib"]);
        app.cpp_version(Visibility::Public, "20");

        let mut graph = graph_with(vec![lib, app]);
        assert!(matches!(
            graph.resolve(),
            Err(ConfigError::ConflictingArgument { .. })
        ));
    }

    #[test]
    fn test_package_resolution() {
        let mut graph = TargetGraph::new();
        let mut package = Package::new("zlib", "/packages/zlib");
        package.member(
            "zlib",
            Arc::new(|t: &mut Target, _: &PackageConfig| -> Result<(), ConfigError> {
                t.defines(Visibility::Public, ["HAVE_ZLIB"])?;
                Ok(())
            }),
        );
        graph.add_package(package).unwrap();

        let config = PackageConfig::new(semver::Version::new(1, 3, 0));
        for name in ["App", "Tool"] {
            let mut t = target(name);
            t.require("zlib", config.clone()).unwrap();
            t.depend_package(Visibility::Private, ["zlib@zlib"]);
            graph.add_target(t).unwrap();
        }

        graph.resolve().unwrap();
        assert_eq!(graph.len(), 3);
        let app = graph.get("App").unwrap();
        assert!(app.dependencies().contains("zlib@zlib@1.3.0"));
        assert_eq!(
            app.arguments()["Defines"].as_list().unwrap().as_slice(),
            ["HAVE_ZLIB"]
        );
    }

    #[test]
    fn test_package_reference_errors() {
        let mut graph = TargetGraph::new();
        let mut t = target("App");
        t.depend_package(Visibility::Private, ["zlib"]);
        graph.add_target(t).unwrap();
        assert!(matches!(
            graph.resolve_packages(),
            Err(ConfigError::InvalidPackageReference { .. })
        ));

        let mut graph = TargetGraph::new();
        let mut t = target("App");
        t.depend_package(Visibility::Private, ["zlib@zlib"]);
        graph.add_target(t).unwrap();
        assert!(matches!(
            graph.resolve_packages(),
            Err(ConfigError::PackageNotRequired { .. })
        ));

        let mut graph = TargetGraph::new();
        let mut t = target("App");
        t.require("zlib", PackageConfig::new(semver::Version::new(1, 0, 0)))
            .unwrap();
        t.depend_package(Visibility::Private, ["zlib@zlib"]);
        graph.add_target(t).unwrap();
        assert!(matches!(
            graph.resolve_packages(),
            Err(ConfigError::UnknownPackage { .. })
        ));
    }

    #[test]
    fn test_target_defaults_apply_to_every_target() {
        let mut graph = TargetGraph::new();
        graph.target_default(Arc::new(|t: &mut Target| -> Result<(), ConfigError> {
            t.debug_symbols(Visibility::Private, true);
            Ok(())
        }));
        graph.add_target(target("A")).unwrap();
        graph.resolve().unwrap();
        assert_eq!(
            graph.get("A").unwrap().arguments()["DebugSymbols"],
            ArgumentValue::from("true")
        );
    }

    #[test]
    fn test_select_includes_dependencies() {
        let mut app = target("App");
        app.depend(Visibility::Private, ["Lib"]);
        let mut graph = graph_with(vec![app, target("Lib"), target("Other")]);
        graph.resolve().unwrap();

        assert_eq!(graph.select(&["App".to_string()]).unwrap(), ["Lib", "App"]);
        assert_eq!(graph.select(&[]).unwrap().len(), 3);
        assert!(matches!(
            graph.select(&["Nope".to_string()]),
            Err(ConfigError::NoSuchTarget { .. })
        ));
    }

    #[test]
    fn test_select_follows_private_chains() {
        let mut app = target("App");
        app.depend(Visibility::Private, ["Lib"]);
        let mut lib = target("Lib");
        lib.depend(Visibility::Private, ["Base"]);
        let mut graph = graph_with(vec![app, lib, target("Base"), target("Other")]);
        graph.resolve().unwrap();

        assert!(!graph.get("App").unwrap().dependencies().contains("Base"));
        assert_eq!(
            graph.select(&["App".to_string()]).unwrap(),
            ["Base", "Lib", "App"]
        );
    }
}
