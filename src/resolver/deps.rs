// src/resolver/deps.rs

//! Build/run dependency splitting and injected dependencies
//!
//! EUPS tracks a single dependency list per product. Conda wants separate
//! build and run requirements, and some products need dependencies the
//! manifest never mentions (things that would otherwise come from pip).
//! Those are configured as glob rules on the target name:
//!
//! ```text
//! [kind/]name [version-spec] [#selector]
//! ```
//!
//! `kind` is `eups` (map the name like any product), `recipe` (materialize
//! the dependency from a static recipe), or anything else / nothing (use
//! the text verbatim).

use crate::config::{Config, PinnedVersion};
use crate::error::{Error, Result};
use crate::naming::NameMapper;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;

/// Kind of dependency in conda's metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DepKind {
    Build,
    Run,
}

impl DepKind {
    pub const ALL: [DepKind; 2] = [DepKind::Build, DepKind::Run];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Run => "run",
        }
    }
}

/// Dependency kind whose target has to be copied from a static recipe
pub const STATIC_RECIPE_KIND: &str = "recipe";

/// One injected dependency spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingDependency {
    pub kind: Option<String>,
    pub name: String,
    pub version_spec: Option<String>,
    pub selector: Option<String>,
    /// The requirement line as written into `meta.yaml`
    pub spec: String,
}

static SPEC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:(\w+)/)?((\S+)(?:\s+([^ ]+)(?:\s+(#.*))?)?)").unwrap());

impl MissingDependency {
    /// Parse `[kind/]name [version-spec] [#selector]`
    pub fn parse(
        raw: &str,
        dep_kind: DepKind,
        names: &NameMapper<'_>,
        pins: &HashMap<String, PinnedVersion>,
    ) -> Result<Self> {
        let caps = SPEC_RE
            .captures(raw.trim())
            .ok_or_else(|| Error::ConfigError(format!("Malformed dependency spec '{raw}'")))?;

        let kind = caps.get(1).map(|m| m.as_str().to_string());
        let mut name = caps[3].to_string();
        let mut version_spec = caps.get(4).map(|m| m.as_str().to_string());
        let selector = caps.get(5).map(|m| m.as_str().to_string());
        let mut spec = caps[2].to_string();

        if kind.as_deref() == Some("eups") {
            name = names.target_name(&name);
            spec = std::iter::once(name.as_str())
                .chain(version_spec.as_deref())
                .chain(selector.as_deref())
                .collect::<Vec<_>>()
                .join(" ");
        }

        if version_spec.is_none() && selector.is_none() {
            if let Some(pinned) = pins.get(&name).and_then(|p| p.get(dep_kind)) {
                version_spec = Some(pinned.to_string());
                spec = format!("{name} {pinned}");
            }
        }

        Ok(Self {
            kind,
            name,
            version_spec,
            selector,
            spec,
        })
    }

    /// Whether this dependency is satisfied by copying a static recipe
    pub fn needs_static_recipe(&self) -> bool {
        self.kind.as_deref() == Some(STATIC_RECIPE_KIND)
    }
}

/// Injected dependencies for every target name matching a glob
#[derive(Debug, Clone)]
pub struct MissingDepRule {
    pub pattern: glob::Pattern,
    pub build: Vec<MissingDependency>,
    pub run: Vec<MissingDependency>,
}

impl MissingDepRule {
    pub fn new(
        pattern: &str,
        build: Vec<MissingDependency>,
        run: Vec<MissingDependency>,
    ) -> Result<Self> {
        let pattern = glob::Pattern::new(pattern).map_err(|e| {
            Error::ConfigError(format!("Invalid dependency pattern '{pattern}': {e}"))
        })?;
        Ok(Self {
            pattern,
            build,
            run,
        })
    }

    pub fn deps(&self, kind: DepKind) -> &[MissingDependency] {
        match kind {
            DepKind::Build => &self.build,
            DepKind::Run => &self.run,
        }
    }
}

/// Dependencies of one product, split for conda
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitDependencies {
    pub build: Vec<String>,
    pub run: Vec<String>,
    /// Static recipes that must be materialized, in first-mention order
    pub static_recipes: Vec<String>,
    /// Whether any dependency is a pre-existing (internal) product
    pub depends_on_internal: bool,
}

impl SplitDependencies {
    pub fn push(&mut self, kind: DepKind, spec: String) {
        match kind {
            DepKind::Build => self.build.push(spec),
            DepKind::Run => self.run.push(spec),
        }
    }

    /// Push the same spec to both lists
    pub fn push_both(&mut self, spec: String) {
        self.build.push(spec.clone());
        self.run.push(spec);
    }

    fn request_static_recipe(&mut self, name: &str) {
        if !self.static_recipes.iter().any(|r| r == name) {
            self.static_recipes.push(name.to_string());
        }
    }
}

/// Splits manifest dependencies into conda build/run requirement specs
pub struct DependencySplitter<'a> {
    config: &'a Config,
    names: NameMapper<'a>,
}

impl<'a> DependencySplitter<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            names: config.name_mapper(),
        }
    }

    /// Split the manifest dependencies of a product whose conda name is
    /// `target_name`, then add the injected dependencies matching it
    pub fn split(&self, target_name: &str, dependencies: &[String]) -> SplitDependencies {
        let mut split = SplitDependencies::default();

        let wanted: BTreeSet<&str> = dependencies
            .iter()
            .map(String::as_str)
            .filter(|dep| !self.config.is_skipped(dep))
            .collect();

        for dep in wanted {
            let dep_name = self.names.target_name(dep);
            match self.config.internal_products.get(dep) {
                Some(internal) => {
                    split.depends_on_internal = true;
                    for kind in DepKind::ALL {
                        let spec = internal.spec(kind).unwrap_or(&dep_name).to_string();
                        split.push(kind, spec);
                    }
                }
                None => split.push_both(dep_name),
            }
        }

        for kind in DepKind::ALL {
            for missing in self.config.missing_deps_for(target_name, kind) {
                if missing.needs_static_recipe() {
                    split.request_static_recipe(&missing.name);
                }
                split.push(kind, missing.spec.clone());
            }
        }

        split
    }
}
