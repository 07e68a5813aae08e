// src/recipe/static_recipes.rs

//! Pre-authored recipes used to satisfy injected dependencies
//!
//! A static recipe is copied into the output directory as-is, together with
//! every other static recipe it requires. Its name, version and build
//! number come from its own `meta.yaml`; whether that build already exists
//! is asked of a [`BuildStatusOracle`].

use crate::error::{Error, Result};
use crate::oracle::BuildStatusOracle;
use crate::recipe::hasher::METADATA_FILE;
use crate::recipe::plan::{ProductRegistry, ResolvedProduct};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Deepest chain of static recipes requiring each other
pub const MAX_STATIC_RECIPE_DEPTH: usize = 32;

#[derive(Debug, Deserialize)]
struct MetaDocument {
    package: MetaPackage,
    #[serde(default)]
    build: Option<MetaBuild>,
    #[serde(default)]
    requirements: Option<MetaRequirements>,
}

#[derive(Debug, Deserialize)]
struct MetaPackage {
    name: String,
    version: serde_yaml::Value,
}

#[derive(Debug, Deserialize)]
struct MetaBuild {
    number: Option<i64>,
    string: Option<serde_yaml::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct MetaRequirements {
    #[serde(default)]
    build: Option<Vec<String>>,
    #[serde(default)]
    run: Option<Vec<String>>,
}

/// What a static recipe's `meta.yaml` says about itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticRecipeMeta {
    pub name: String,
    pub version: String,
    pub build_number: i64,
    pub build_string: String,
    /// Requirement specs, run first, then build
    pub requirements: Vec<String>,
}

impl StaticRecipeMeta {
    /// Read `<dir>/meta.yaml`
    pub fn read(dir: &Path) -> Result<Self> {
        let path = dir.join(METADATA_FILE);
        let text = fs::read_to_string(&path)
            .map_err(|e| Error::IoError(format!("Failed to read {}: {e}", path.display())))?;
        let doc: MetaDocument = serde_yaml::from_str(&text)
            .map_err(|e| Error::ParseError(format!("{}: {e}", path.display())))?;

        let build_number = doc.build.as_ref().and_then(|b| b.number).unwrap_or(0);
        let build_string = doc
            .build
            .as_ref()
            .and_then(|b| b.string.as_ref())
            .map(scalar_to_string)
            .unwrap_or_else(|| build_number.to_string());

        let requirements = doc
            .requirements
            .map(|r| {
                r.run
                    .unwrap_or_default()
                    .into_iter()
                    .chain(r.build.unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            name: doc.package.name,
            version: scalar_to_string(&doc.package.version),
            build_number,
            build_string,
            requirements,
        })
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> String {
    match value {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Copies static recipes (and the static recipes they need) into the
/// output directory
pub struct StaticRecipeCopier<'a> {
    source_dir: PathBuf,
    output_dir: PathBuf,
    available: BTreeSet<String>,
    oracle: &'a dyn BuildStatusOracle,
}

impl<'a> StaticRecipeCopier<'a> {
    pub fn new(
        source_dir: &Path,
        output_dir: &Path,
        oracle: &'a dyn BuildStatusOracle,
    ) -> Result<Self> {
        let mut available = BTreeSet::new();
        if source_dir.is_dir() {
            let entries = fs::read_dir(source_dir).map_err(|e| {
                Error::IoError(format!("Failed to list {}: {e}", source_dir.display()))
            })?;
            for entry in entries {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    available.insert(entry.file_name().to_string_lossy().into_owned());
                }
            }
        }

        Ok(Self {
            source_dir: source_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            available,
            oracle,
        })
    }

    pub fn has_recipe(&self, name: &str) -> bool {
        self.available.contains(name)
    }

    /// Copy the static recipe `name` (and its static dependencies) unless
    /// it is already in `registry`
    pub fn copy(&self, name: &str, registry: &mut ProductRegistry) -> Result<()> {
        if !self.has_recipe(name) {
            return Err(Error::MissingRecipe(format!(
                "A package depends on '{name}', but there is no recipe for it in {}",
                self.source_dir.display()
            )));
        }
        let mut in_progress = Vec::new();
        self.copy_recursive(name, &mut in_progress, registry)
    }

    fn copy_recursive(
        &self,
        name: &str,
        in_progress: &mut Vec<String>,
        registry: &mut ProductRegistry,
    ) -> Result<()> {
        if in_progress.iter().any(|n| n == name) {
            let mut chain = in_progress.clone();
            chain.push(name.to_string());
            return Err(Error::DependencyCycle(format!(
                "static recipes {}",
                chain.join(" -> ")
            )));
        }
        if registry.contains(name) {
            return Ok(());
        }
        if in_progress.len() >= MAX_STATIC_RECIPE_DEPTH {
            return Err(Error::DependencyCycle(format!(
                "static recipes nested deeper than {MAX_STATIC_RECIPE_DEPTH}: {} -> {name}",
                in_progress.join(" -> ")
            )));
        }

        let src = self.source_dir.join(name);
        let meta = StaticRecipeMeta::read(&src)?;
        if meta.name != name {
            return Err(Error::ParseError(format!(
                "static recipe {} declares package.name '{}'",
                src.display(),
                meta.name
            )));
        }

        in_progress.push(name.to_string());
        for requirement in &meta.requirements {
            let Some(dep) = requirement.split_whitespace().next() else {
                continue;
            };
            if self.has_recipe(dep) {
                self.copy_recursive(dep, in_progress, registry)?;
            }
        }
        in_progress.pop();

        copy_tree(&src, &self.output_dir.join(name))?;

        let already_built = self
            .oracle
            .is_already_built(&meta.name, &meta.version, meta.build_number)?;
        info!("  {}-{} (static recipe)", meta.name, meta.version);

        registry.register(ResolvedProduct {
            target_name: meta.name,
            version: meta.version,
            build_string: meta.build_string,
            build_number: meta.build_number,
            component: None,
            source_version: None,
            already_built,
            is_ours: false,
        })
    }
}

fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    debug!("Copying {} to {}", src.display(), dest.display());
    for entry in WalkDir::new(src) {
        let entry = entry
            .map_err(|e| Error::IoError(format!("Failed to walk {}: {e}", src.display())))?;
        let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
        let target = dest.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target).map_err(|e| {
                Error::IoError(format!("Failed to copy {}: {e}", entry.path().display()))
            })?;
        }
    }
    Ok(())
}
