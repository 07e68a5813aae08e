// src/recipe/maker.rs

//! Recipe generation
//!
//! For every component of the resolved closure, in dependency order:
//!
//! 1. translate the version and map the name
//! 2. split dependencies into build/run lists, pulling in static recipes
//!    for injected dependencies
//! 3. render `build.sh`, `pre-link.sh` and `meta.yaml`, copy patches
//! 4. hash the recipe and ask the build index for its build number
//! 5. render `meta.yaml` again with the final build number and string
//!
//! Afterwards the rebuild plan, the skip markers and `rebuild.sh` are
//! written. The output directory is wiped before anything else happens.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::{BuildIndex, assign_build_number};
use crate::manifest::{ComponentRecord, Manifest};
use crate::oracle::BuildStatusOracle;
use crate::recipe::hasher::{METADATA_FILE, RecipeHasher};
use crate::recipe::plan::{ProductRegistry, RebuildPlan, ResolvedProduct, write_markers};
use crate::recipe::static_recipes::StaticRecipeCopier;
use crate::recipe::template::{TemplateRenderer, TemplateVars, yaml_list};
use crate::resolver::{self, DependencySplitter};
use crate::version::{CondaVersionGrammar, RevisionResolver, VersionGrammar, VersionTranslator};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Build driver written next to the recipes
pub const REBUILD_SCRIPT: &str = "rebuild.sh";

/// Outcome of a generation run
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub products: ProductRegistry,
    pub plan: RebuildPlan,
}

/// Generates conda recipes for a manifest
pub struct RecipeMaker<'a> {
    config: &'a Config,
    index: &'a dyn BuildIndex,
    oracle: &'a dyn BuildStatusOracle,
    templates: &'a dyn TemplateRenderer,
    revisions: &'a dyn RevisionResolver,
    grammar: &'a dyn VersionGrammar,
    hasher: RecipeHasher,
}

/// Per-run state shared by all components
struct Run<'r> {
    tags: String,
    copier: StaticRecipeCopier<'r>,
    products: ProductRegistry,
}

impl<'a> RecipeMaker<'a> {
    pub fn new(
        config: &'a Config,
        index: &'a dyn BuildIndex,
        oracle: &'a dyn BuildStatusOracle,
        templates: &'a dyn TemplateRenderer,
        revisions: &'a dyn RevisionResolver,
    ) -> Self {
        Self {
            config,
            index,
            oracle,
            templates,
            revisions,
            grammar: &CondaVersionGrammar,
            hasher: RecipeHasher::from_config(config),
        }
    }

    /// Generate recipes for `requested` components and everything they
    /// depend on; an empty request means the whole manifest
    pub fn generate<S: AsRef<str>>(
        &self,
        manifest: &Manifest,
        requested: &[S],
    ) -> Result<GenerationReport> {
        let components = if requested.is_empty() {
            let all: Vec<&str> = manifest.iter().map(|c| c.id.as_str()).collect();
            resolver::resolve(manifest, all.as_slice())?
        } else {
            resolver::resolve(manifest, requested)?
        };
        debug!("{} components in the build closure", components.len());

        reset_output_dir(&self.config.output_dir)?;

        let mut tags = self.config.global_tags.clone();
        tags.extend(manifest.build_id.iter().cloned());

        let mut run = Run {
            tags: tags.join(" "),
            copier: StaticRecipeCopier::new(
                &self.config.static_recipes_dir,
                &self.config.output_dir,
                self.oracle,
            )?,
            products: ProductRegistry::new(),
        };

        info!("Generating recipes");
        for component in components {
            if self.config.is_internal(&component.id) {
                debug!("{} is provided by conda, skipping", component.id);
                continue;
            }
            if self.config.is_skipped(&component.id) {
                debug!("{} is configured to be skipped", component.id);
                continue;
            }
            self.make_recipe(component, &mut run)?;
        }

        let plan = RebuildPlan::from_registry(&run.products);
        for label in &plan.to_build {
            info!("will build:    {}", label);
        }
        for label in &plan.already_built {
            info!("already built: {}", label);
        }
        write_markers(&self.config.output_dir, &run.products, &self.config.skip_build)?;

        let output_dir = self.config.output_dir.display().to_string();
        self.templates.render_to(
            REBUILD_SCRIPT,
            &self.config.output_dir.join(REBUILD_SCRIPT),
            &TemplateVars::new()
                .with("output_dir", output_dir)
                .with("rebuilds", plan.script_body()),
        )?;

        Ok(GenerationReport {
            products: run.products,
            plan,
        })
    }

    fn make_recipe(&self, component: &ComponentRecord, run: &mut Run<'_>) -> Result<()> {
        let names = self.config.name_mapper();
        let target_name = names.target_name(&component.id);
        let revision = self
            .config
            .override_gitrev
            .get(&component.id)
            .unwrap_or(&component.revision);
        let giturl = self.config.git_url_for(&component.id);

        let translated = VersionTranslator::new(self.revisions, self.grammar).translate(
            &component.id,
            &component.version,
            giturl.as_deref(),
        )?;
        if translated.compliant {
            info!("  {}-{}", target_name, translated.version);
        } else {
            warn!(
                "  {}-{} [version format incompatible with conda]",
                target_name, translated.version
            );
        }

        let mut deps =
            DependencySplitter::new(self.config).split(&target_name, &component.dependencies);

        if deps.depends_on_internal {
            if let Some(config_recipe) = &self.config.internal_config_recipe {
                run.copier.copy(config_recipe, &mut run.products)?;
                let version = run
                    .products
                    .get(config_recipe)
                    .map(|p| p.version.clone())
                    .ok_or_else(|| Error::MissingRecipe(config_recipe.clone()))?;
                deps.push_both(format!("{config_recipe} =={version}"));
            }
        }
        for recipe in &deps.static_recipes {
            run.copier.copy(recipe, &mut run.products)?;
        }

        deps.build.sort();
        deps.run.sort();
        let build_req: Vec<String> = deps
            .build
            .iter()
            .map(|spec| run.products.requirement_for(spec))
            .collect();
        let run_req: Vec<String> = deps
            .run
            .iter()
            .map(|spec| run.products.requirement_for(spec))
            .collect();

        if run.products.contains(&target_name) {
            return Err(Error::DuplicateProduct(target_name));
        }
        let dir = self.config.output_dir.join(&target_name);
        fs::create_dir_all(&dir)
            .map_err(|e| Error::IoError(format!("Failed to create {}: {e}", dir.display())))?;

        let patches = self.copy_patches(&component.id, &dir)?;

        self.templates.render_to(
            "build.sh",
            &dir.join("build.sh"),
            &TemplateVars::new()
                .with("setups", "")
                .with("eups_version", &component.version)
                .with("eups_tags", &run.tags),
        )?;
        self.templates.render_to(
            "pre-link.sh",
            &dir.join("pre-link.sh"),
            &TemplateVars::new().with("product", &component.id),
        )?;

        let mut meta_vars = TemplateVars::new()
            .with("name", target_name.to_lowercase())
            .with("version", &translated.version)
            .with("gitrev", revision)
            .with("giturl", giturl.as_deref().unwrap_or(""))
            .with("build_req", yaml_list(&build_req))
            .with("run_req", yaml_list(&run_req))
            .with("patches", patches)
            .with("buildnum", translated.build_number)
            .with(
                "build_string",
                build_string(&translated.build_string_prefix, translated.build_number),
            );
        let meta_path = dir.join(METADATA_FILE);
        self.templates.render_to(METADATA_FILE, &meta_path, &meta_vars)?;

        // Only number: and string: may differ between this render and the
        // final one, and the hash ignores both
        let digest = self.hasher.hash_dir(&dir)?;
        let index_name = target_name.to_lowercase();
        let assignment =
            assign_build_number(self.index, &index_name, &translated.version, &digest.digest)?;
        let build_string = build_string(&translated.build_string_prefix, assignment.build_number);

        meta_vars.set("buildnum", assignment.build_number);
        meta_vars.set("build_string", &build_string);
        self.templates.render_to(METADATA_FILE, &meta_path, &meta_vars)?;

        run.products.register(ResolvedProduct {
            target_name,
            version: translated.version,
            build_string,
            build_number: assignment.build_number,
            component: Some(component.id.clone()),
            source_version: Some(component.version.clone()),
            already_built: assignment.already_built,
            is_ours: true,
        })
    }

    /// Copy `<patch_dir>/<product>/*.patch` into `dir`; returns the
    /// `patches:` fragment for `meta.yaml`
    fn copy_patches(&self, product: &str, dir: &Path) -> Result<String> {
        let patch_dir = self.config.patch_dir.join(product);
        if !patch_dir.is_dir() {
            return Ok(String::new());
        }

        let pattern = patch_dir.join("*.patch");
        let mut files: Vec<_> = glob::glob(&pattern.to_string_lossy())
            .map_err(|e| {
                Error::ConfigError(format!("Bad patch directory {}: {e}", patch_dir.display()))
            })?
            .filter_map(|entry| entry.ok())
            .collect();
        files.sort();

        let mut names = Vec::with_capacity(files.len());
        for file in &files {
            let Some(name) = file.file_name() else {
                continue;
            };
            fs::copy(file, dir.join(name)).map_err(|e| {
                Error::IoError(format!("Failed to copy {}: {e}", file.display()))
            })?;
            names.push(name.to_string_lossy().into_owned());
        }

        if names.is_empty() {
            return Ok(String::new());
        }
        debug!("{}: {} patches", product, names.len());
        Ok(format!("  patches:{}", yaml_list(&names)))
    }
}

/// `<prefix>_<n>`, or just `<n>` without a prefix
pub fn build_string(prefix: &str, build_number: i64) -> String {
    if prefix.is_empty() {
        build_number.to_string()
    } else {
        format!("{prefix}_{build_number}")
    }
}

/// Delete and recreate the output directory before any recipe is written
fn reset_output_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        info!("Clearing {}", dir.display());
        fs::remove_dir_all(dir)
            .map_err(|e| Error::IoError(format!("Failed to clear {}: {e}", dir.display())))?;
    }
    fs::create_dir_all(dir)
        .map_err(|e| Error::IoError(format!("Failed to create {}: {e}", dir.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_string() {
        assert_eq!(build_string("abcd123", 0), "abcd123_0");
        assert_eq!(build_string("", 4), "4");
    }
}
