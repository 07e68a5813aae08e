// src/resolver/mod.rs

//! Dependency closure over a manifest
//!
//! Walks the manifest depth-first and emits products in post-order, so every
//! product appears after all of its transitive dependencies. A product reached
//! through several paths is emitted once, where its first walk completes.
//!
//! The walk uses an explicit stack and a "visiting" set instead of recursion,
//! so a cyclic manifest is reported as an error rather than overflowing.

pub mod deps;

use crate::error::{Error, Result};
use crate::manifest::{ComponentRecord, Manifest};
use std::collections::HashSet;
use tracing::debug;

pub use deps::{DepKind, DependencySplitter, MissingDepRule, MissingDependency, SplitDependencies};

/// Ordered closure of `requested` within `manifest`
pub fn resolve<'m, S: AsRef<str>>(
    manifest: &'m Manifest,
    requested: &[S],
) -> Result<Vec<&'m ComponentRecord>> {
    let mut order: Vec<&'m ComponentRecord> = Vec::new();
    let mut done: HashSet<&'m str> = HashSet::new();
    let mut visiting: HashSet<&'m str> = HashSet::new();

    for root in requested {
        let root = lookup(manifest, root.as_ref())?;
        if done.contains(root.id.as_str()) {
            continue;
        }

        // (record, index of the next dependency to visit)
        let mut stack: Vec<(&'m ComponentRecord, usize)> = vec![(root, 0)];
        visiting.insert(root.id.as_str());

        while let Some((record, next)) = stack.last_mut() {
            let record = *record;

            if let Some(dep) = record.dependencies.get(*next) {
                *next += 1;

                if done.contains(dep.as_str()) {
                    continue;
                }
                if visiting.contains(dep.as_str()) {
                    return Err(Error::DependencyCycle(describe_cycle(&stack, dep)));
                }

                let dep = lookup(manifest, dep)?;
                visiting.insert(dep.id.as_str());
                stack.push((dep, 0));
                continue;
            }

            stack.pop();
            visiting.remove(record.id.as_str());
            done.insert(record.id.as_str());
            order.push(record);
        }
    }

    debug!(
        "Resolved {} requested products into {} products",
        requested.len(),
        order.len()
    );
    Ok(order)
}

fn lookup<'m>(manifest: &'m Manifest, id: &str) -> Result<&'m ComponentRecord> {
    manifest
        .get(id)
        .ok_or_else(|| Error::UnknownComponent(id.to_string()))
}

fn describe_cycle(stack: &[(&ComponentRecord, usize)], closing: &str) -> String {
    let start = stack
        .iter()
        .position(|(record, _)| record.id == closing)
        .unwrap_or(0);

    let mut path: Vec<&str> = stack[start..]
        .iter()
        .map(|(record, _)| record.id.as_str())
        .collect();
    path.push(closing);
    path.join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(lines: &[&str]) -> Manifest {
        let text = format!("header\nBUILD=b1\n{}\n", lines.join("\n"));
        Manifest::parse(&text).unwrap()
    }

    fn ids(records: &[&ComponentRecord]) -> Vec<String> {
        records.iter().map(|r| r.id.clone()).collect()
    }

    #[test]
    fn test_linear_chain() {
        let m = manifest(&["a r 1.0 b", "b r 1.0 c", "c r 1.0"]);
        let order = resolve(&m, &["a"]).unwrap();
        assert_eq!(ids(&order), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_diamond_emits_shared_dependency_once() {
        let m = manifest(&["top r 1 left,right", "left r 1 base", "right r 1 base", "base r 1"]);
        let order = resolve(&m, &["top"]).unwrap();
        assert_eq!(ids(&order), vec!["base", "left", "right", "top"]);
    }

    #[test]
    fn test_multiple_roots_share_closure() {
        let m = manifest(&["a r 1 c", "b r 1 c", "c r 1", "unused r 1"]);
        let order = resolve(&m, &["a", "b", "a"]).unwrap();
        assert_eq!(ids(&order), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_dependencies_precede_dependents() {
        let m = manifest(&[
            "app r 1 lib,util",
            "lib r 1 util,core",
            "util r 1 core",
            "core r 1",
        ]);
        let order = ids(&resolve(&m, &["app"]).unwrap());
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();

        assert!(pos("core") < pos("util"));
        assert!(pos("util") < pos("lib"));
        assert!(pos("lib") < pos("app"));
        assert_eq!(order.len(), 4);
    }

    #[test]
    fn test_cycle_is_reported() {
        let m = manifest(&["a r 1 b", "b r 1 c", "c r 1 a"]);
        let err = resolve(&m, &["a"]).unwrap_err();
        match err {
            Error::DependencyCycle(path) => assert_eq!(path, "a -> b -> c -> a"),
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let m = manifest(&["a r 1 a"]);
        assert!(matches!(
            resolve(&m, &["a"]),
            Err(Error::DependencyCycle(_))
        ));
    }

    #[test]
    fn test_unknown_products() {
        let m = manifest(&["a r 1 ghost"]);
        assert!(matches!(
            resolve(&m, &["missing"]),
            Err(Error::UnknownComponent(id)) if id == "missing"
        ));
        assert!(matches!(
            resolve(&m, &["a"]),
            Err(Error::UnknownComponent(id)) if id == "ghost"
        ));
    }
}
