// src/recipe/plan.rs

//! Resolved products and the rebuild plan
//!
//! Every recipe placed in the output directory, generated or copied from a
//! static recipe, is registered here in dependency order. The plan is that
//! order written out as `rebuild` lines, plus marker files next to each
//! recipe telling the build driver what to skip.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

/// Marker for recipes whose exact build already exists
pub const DONE_MARKER: &str = ".done";
/// Prefix of per-platform skip markers (`.skip.<platform>`)
pub const SKIP_MARKER_PREFIX: &str = ".skip.";

/// One recipe in the output directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProduct {
    pub target_name: String,
    pub version: String,
    pub build_string: String,
    pub build_number: i64,
    /// Source component; `None` for static recipes
    pub component: Option<String>,
    /// Source version; `None` for static recipes
    pub source_version: Option<String>,
    pub already_built: bool,
    /// Generated here, as opposed to copied from a static recipe
    pub is_ours: bool,
}

impl ResolvedProduct {
    /// `<version>-<build string>`
    pub fn full_version(&self) -> String {
        format!("{}-{}", self.version, self.build_string)
    }

    /// Requirement spec pinning this product
    ///
    /// Our own products are pinned exactly; static recipes only set a floor.
    pub fn requirement(&self) -> String {
        let op = if self.is_ours { "==" } else { ">=" };
        format!("{} {}{}", self.target_name, op, self.version)
    }

    pub fn plan_line(&self) -> String {
        format!(
            "rebuild {} {} {} {}",
            self.target_name,
            self.full_version(),
            self.component.as_deref().unwrap_or("-"),
            self.source_version.as_deref().unwrap_or("-")
        )
    }
}

/// Resolved products keyed by target name, in registration order
#[derive(Debug, Clone, Default)]
pub struct ProductRegistry {
    products: IndexMap<String, ResolvedProduct>,
}

impl ProductRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a product; a target name may only be registered once
    pub fn register(&mut self, product: ResolvedProduct) -> Result<()> {
        if self.products.contains_key(&product.target_name) {
            return Err(Error::DuplicateProduct(product.target_name));
        }
        debug!(
            "Registered {}-{} (built: {})",
            product.target_name,
            product.full_version(),
            product.already_built
        );
        self.products.insert(product.target_name.clone(), product);
        Ok(())
    }

    pub fn get(&self, target_name: &str) -> Option<&ResolvedProduct> {
        self.products.get(target_name)
    }

    pub fn contains(&self, target_name: &str) -> bool {
        self.products.contains_key(target_name)
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedProduct> {
        self.products.values()
    }

    /// Render a requirement: registered products get a version constraint,
    /// anything else is passed through
    pub fn requirement_for(&self, spec: &str) -> String {
        match self.products.get(spec) {
            Some(product) => product.requirement(),
            None => spec.to_string(),
        }
    }
}

/// Ordered rebuild instructions for the build driver
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildPlan {
    pub lines: Vec<String>,
    /// `<name>-<version>-<build string>` of products that need building
    pub to_build: Vec<String>,
    /// Same, for products whose build already exists
    pub already_built: Vec<String>,
}

impl RebuildPlan {
    pub fn from_registry(registry: &ProductRegistry) -> Self {
        let mut plan = Self::default();
        for product in registry.iter() {
            plan.lines.push(product.plan_line());
            let label = format!("{}-{}", product.target_name, product.full_version());
            if product.already_built {
                plan.already_built.push(label);
            } else {
                plan.to_build.push(label);
            }
        }
        plan
    }

    /// Newline-joined `rebuild` lines
    pub fn script_body(&self) -> String {
        self.lines.join("\n")
    }
}

/// Create `.done` and `.skip.<platform>` markers in each recipe directory
pub fn write_markers(
    output_dir: &Path,
    registry: &ProductRegistry,
    skip_build: &HashMap<String, Vec<String>>,
) -> Result<()> {
    for product in registry.iter() {
        let dir = output_dir.join(&product.target_name);

        if product.already_built {
            touch(&dir.join(DONE_MARKER))?;
        }

        if let Some(platforms) = skip_build.get(&product.target_name) {
            for platform in platforms {
                touch(&dir.join(format!("{SKIP_MARKER_PREFIX}{platform}")))?;
            }
            info!(
                "{}: builds will always be skipped on {}",
                product.target_name,
                platforms.join(", ")
            );
        }
    }
    Ok(())
}

fn touch(path: &Path) -> Result<()> {
    File::create(path)
        .map(|_| ())
        .map_err(|e| Error::IoError(format!("Failed to create {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn generated(name: &str, built: bool) -> ResolvedProduct {
        ResolvedProduct {
            target_name: name.to_string(),
            version: "1.2.0.3".to_string(),
            build_string: "abcd123_0".to_string(),
            build_number: 0,
            component: Some(name.trim_start_matches("lsst-").to_string()),
            source_version: Some("1.2.0-3-gabcd123".to_string()),
            already_built: built,
            is_ours: true,
        }
    }

    fn copied(name: &str) -> ResolvedProduct {
        ResolvedProduct {
            target_name: name.to_string(),
            version: "3.11".to_string(),
            build_string: "0".to_string(),
            build_number: 0,
            component: None,
            source_version: None,
            already_built: false,
            is_ours: false,
        }
    }

    #[test]
    fn test_requirements() {
        let mut registry = ProductRegistry::new();
        registry.register(generated("lsst-foo", false)).unwrap();
        registry.register(copied("pyyaml")).unwrap();

        assert_eq!(registry.requirement_for("lsst-foo"), "lsst-foo ==1.2.0.3");
        assert_eq!(registry.requirement_for("pyyaml"), "pyyaml >=3.11");
        assert_eq!(registry.requirement_for("cmake >=3"), "cmake >=3");
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = ProductRegistry::new();
        registry.register(generated("lsst-foo", false)).unwrap();
        let err = registry.register(generated("lsst-foo", true)).unwrap_err();
        assert!(matches!(err, Error::DuplicateProduct(name) if name == "lsst-foo"));
    }

    #[test]
    fn test_plan_preserves_order() {
        let mut registry = ProductRegistry::new();
        registry.register(copied("pyyaml")).unwrap();
        registry.register(generated("lsst-foo", true)).unwrap();

        let plan = RebuildPlan::from_registry(&registry);
        assert_eq!(
            plan.lines,
            vec![
                "rebuild pyyaml 3.11-0 - -",
                "rebuild lsst-foo 1.2.0.3-abcd123_0 foo 1.2.0-3-gabcd123",
            ]
        );
        assert_eq!(plan.to_build, vec!["pyyaml-3.11-0"]);
        assert_eq!(plan.already_built, vec!["lsst-foo-1.2.0.3-abcd123_0"]);
    }

    #[test]
    fn test_markers() {
        let out = TempDir::new().unwrap();
        let mut registry = ProductRegistry::new();
        registry.register(generated("lsst-foo", true)).unwrap();
        registry.register(generated("lsst-bar", false)).unwrap();
        std::fs::create_dir(out.path().join("lsst-foo")).unwrap();
        std::fs::create_dir(out.path().join("lsst-bar")).unwrap();

        let skip = HashMap::from([(
            "lsst-bar".to_string(),
            vec!["osx-64".to_string(), "win-64".to_string()],
        )]);
        write_markers(out.path(), &registry, &skip).unwrap();

        assert!(out.path().join("lsst-foo/.done").exists());
        assert!(!out.path().join("lsst-bar/.done").exists());
        assert!(out.path().join("lsst-bar/.skip.osx-64").exists());
        assert!(out.path().join("lsst-bar/.skip.win-64").exists());
    }
}
