// src/config.rs

//! Generator configuration
//!
//! The configuration is read once from a TOML file, resolved (paths made
//! absolute, name tables expanded, injected dependency specs parsed and
//! pinned) and then handed around by reference. Nothing mutates it after
//! [`Config::load`] returns.
//!
//! # Example recipegen.toml
//!
//! ```toml
//! output_dir = "recipes/generated"
//! build_index_dir = "cache"
//! static_recipes_dir = "recipes/static"
//! template_dir = "templates"
//! patch_dir = "patches"
//! prefix = "lsst-"
//! channels = ["file:///opt/conda/conda-bld/", "https://example.org/channel/"]
//! skip_products = ["afwdata"]
//!
//! [name_map]
//! sconsUtils = "{prefix}sconsutils"
//!
//! [internal_products]
//! numpy = {}
//! boost = { build = "boost ==1.59", run = "boost" }
//!
//! [pin_versions.numpy]
//! build = "1.10*"
//! run = ">=1.10"
//!
//! [dependencies."lsst-afw"]
//! build = ["recipe/lsst-product-configs", "swig ==3.0.2"]
//!
//! [[git_upstreams]]
//! url = "https://github.com/lsst/{product}.git"
//! products = ["*"]
//! ```

use crate::error::{Error, Result};
use crate::naming::NameMapper;
use crate::resolver::deps::{DepKind, MissingDepRule, MissingDependency};
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// File name of the build index database below `<build_index_dir>/<platform>`
pub const INDEX_DB_NAME: &str = "cache-db.sqlite";

/// Build/run spec overrides for a product that already exists in conda
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InternalProduct {
    pub build: Option<String>,
    pub run: Option<String>,
}

impl InternalProduct {
    pub fn spec(&self, kind: DepKind) -> Option<&str> {
        match kind {
            DepKind::Build => self.build.as_deref(),
            DepKind::Run => self.run.as_deref(),
        }
    }
}

/// Version constraints pinned per dependency kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinnedVersion {
    pub build: Option<String>,
    pub run: Option<String>,
}

impl PinnedVersion {
    pub fn get(&self, kind: DepKind) -> Option<&str> {
        match kind {
            DepKind::Build => self.build.as_deref(),
            DepKind::Run => self.run.as_deref(),
        }
    }
}

/// Where the source of a group of products lives
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitUpstream {
    /// Repository URL; `{product}` expands to the product name
    pub url: String,
    /// Product globs served by this upstream
    pub products: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDependencySet {
    #[serde(default)]
    build: Vec<String>,
    #[serde(default)]
    run: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    output_dir: PathBuf,
    build_index_dir: PathBuf,
    static_recipes_dir: PathBuf,
    template_dir: PathBuf,
    patch_dir: PathBuf,
    #[serde(default)]
    prefix: String,
    platform: Option<String>,
    #[serde(default)]
    channels: Vec<String>,
    #[serde(default)]
    name_map: HashMap<String, String>,
    #[serde(default)]
    internal_products: HashMap<String, InternalProduct>,
    #[serde(default)]
    dont_prefix_products: Vec<String>,
    #[serde(default)]
    pin_versions: HashMap<String, PinnedVersion>,
    #[serde(default)]
    skip_products: Vec<String>,
    #[serde(default)]
    skip_build: HashMap<String, Vec<String>>,
    #[serde(default)]
    dependencies: IndexMap<String, RawDependencySet>,
    #[serde(default)]
    git_upstreams: Vec<GitUpstream>,
    #[serde(default)]
    override_gitrev: HashMap<String, String>,
    #[serde(default = "default_global_tags")]
    global_tags: Vec<String>,
    internal_config_recipe: Option<String>,
    #[serde(default = "default_hash_suffixes")]
    hash_suffixes: Vec<String>,
    revision_helper: Option<PathBuf>,
    manifest_url: Option<String>,
    #[serde(default = "default_network_timeout")]
    network_timeout_secs: u64,
}

fn default_global_tags() -> Vec<String> {
    vec!["current".to_string(), "conda".to_string()]
}

fn default_hash_suffixes() -> Vec<String> {
    [".patch", ".diff", ".yaml", ".sh"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_network_timeout() -> u64 {
    30
}

/// Resolved, immutable configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Recipe output root. Cleared wholesale before every generation run.
    pub output_dir: PathBuf,
    pub build_index_dir: PathBuf,
    pub static_recipes_dir: PathBuf,
    pub template_dir: PathBuf,
    pub patch_dir: PathBuf,
    pub prefix: String,
    /// Conda platform subdir, e.g. `linux-64`
    pub platform: String,
    /// Channel locations, each with a trailing `/`
    pub channels: Vec<String>,
    pub name_map: HashMap<String, String>,
    /// Pre-existing products with pins applied to bare specs
    pub internal_products: HashMap<String, InternalProduct>,
    /// Names mapped without the prefix (includes every internal product)
    pub dont_prefix_products: HashSet<String>,
    pub pin_versions: HashMap<String, PinnedVersion>,
    pub skip_products: HashSet<String>,
    pub skip_build: HashMap<String, Vec<String>>,
    pub missing_deps: Vec<MissingDepRule>,
    pub git_upstreams: Vec<GitUpstream>,
    pub override_gitrev: HashMap<String, String>,
    pub global_tags: Vec<String>,
    pub internal_config_recipe: Option<String>,
    pub hash_suffixes: Vec<String>,
    pub revision_helper: Option<PathBuf>,
    pub manifest_url: Option<String>,
    pub network_timeout: Duration,
}

impl Config {
    /// Load and resolve a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read {}: {e}", path.display()))
        })?;
        let root = path.parent().unwrap_or(Path::new("."));
        Self::from_toml(&text, root)
    }

    /// Resolve configuration text; relative paths are taken against `root`
    pub fn from_toml(text: &str, root: &Path) -> Result<Self> {
        let raw: RawConfig =
            toml::from_str(text).map_err(|e| Error::ConfigError(format!("Invalid TOML: {e}")))?;
        Self::resolve(raw, root)
    }

    fn resolve(raw: RawConfig, root: &Path) -> Result<Self> {
        let output_dir = expand_path(root, &raw.output_dir);
        check_output_dir(&output_dir)?;

        let name_map: HashMap<String, String> = raw
            .name_map
            .into_iter()
            .map(|(k, v)| (k, v.replace("{prefix}", &raw.prefix)))
            .collect();

        let mut dont_prefix_products: HashSet<String> =
            raw.dont_prefix_products.into_iter().collect();
        dont_prefix_products.extend(raw.internal_products.keys().cloned());

        let internal_products = raw
            .internal_products
            .into_iter()
            .map(|(name, meta)| {
                let pinned = pin_internal(&name, meta, &raw.pin_versions);
                (name, pinned)
            })
            .collect();

        let names = NameMapper::new(&raw.prefix, &name_map, &dont_prefix_products);
        let missing_deps = raw
            .dependencies
            .iter()
            .map(|(key, deps)| parse_dependency_rule(key, deps, &names, &raw.pin_versions))
            .collect::<Result<Vec<_>>>()?;

        let channels = raw
            .channels
            .into_iter()
            .map(|c| if c.ends_with('/') { c } else { format!("{c}/") })
            .collect();

        let config = Self {
            output_dir,
            build_index_dir: expand_path(root, &raw.build_index_dir),
            static_recipes_dir: expand_path(root, &raw.static_recipes_dir),
            template_dir: expand_path(root, &raw.template_dir),
            patch_dir: expand_path(root, &raw.patch_dir),
            prefix: raw.prefix,
            platform: raw.platform.unwrap_or_else(host_platform),
            channels,
            name_map,
            internal_products,
            dont_prefix_products,
            pin_versions: raw.pin_versions,
            skip_products: raw.skip_products.into_iter().collect(),
            skip_build: raw.skip_build,
            missing_deps,
            git_upstreams: raw.git_upstreams,
            override_gitrev: raw.override_gitrev,
            global_tags: raw.global_tags,
            internal_config_recipe: raw.internal_config_recipe,
            hash_suffixes: raw.hash_suffixes,
            revision_helper: raw.revision_helper.map(|p| expand_path(root, &p)),
            manifest_url: raw.manifest_url,
            network_timeout: Duration::from_secs(raw.network_timeout_secs),
        };

        debug!(
            "Loaded configuration: platform={}, {} channels, {} injected dependency rules",
            config.platform,
            config.channels.len(),
            config.missing_deps.len()
        );
        Ok(config)
    }

    /// Name mapper over this configuration's tables
    pub fn name_mapper(&self) -> NameMapper<'_> {
        NameMapper::new(&self.prefix, &self.name_map, &self.dont_prefix_products)
    }

    /// Path of the build index database for the configured platform
    pub fn index_path(&self) -> PathBuf {
        self.build_index_dir.join(&self.platform).join(INDEX_DB_NAME)
    }

    /// Repository URL of the first upstream whose globs match `product`
    pub fn git_url_for(&self, product: &str) -> Option<String> {
        self.git_upstreams
            .iter()
            .find(|upstream| {
                upstream
                    .products
                    .iter()
                    .any(|g| glob::Pattern::new(g).is_ok_and(|p| p.matches(product)))
            })
            .map(|upstream| upstream.url.replace("{product}", product))
    }

    /// Injected dependencies of `kind` for every rule matching `target_name`
    pub fn missing_deps_for<'a>(
        &'a self,
        target_name: &'a str,
        kind: DepKind,
    ) -> impl Iterator<Item = &'a MissingDependency> + 'a {
        self.missing_deps
            .iter()
            .filter(move |rule| rule.pattern.matches(target_name))
            .flat_map(move |rule| rule.deps(kind).iter())
    }

    /// Whether `product` is neither generated nor used as a dependency
    pub fn is_skipped(&self, product: &str) -> bool {
        self.skip_products.contains(product)
    }

    pub fn is_internal(&self, product: &str) -> bool {
        self.internal_products.contains_key(product)
    }
}

fn expand_path(root: &Path, fragment: &Path) -> PathBuf {
    if fragment.is_absolute() {
        fragment.to_path_buf()
    } else {
        root.join(fragment)
    }
}

/// The output directory is removed recursively, so it must name something
/// below the filesystem root.
fn check_output_dir(dir: &Path) -> Result<()> {
    let depth = dir
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count();
    if depth == 0 {
        return Err(Error::ConfigError(format!(
            "output_dir '{}' would clear the filesystem root",
            dir.display()
        )));
    }
    Ok(())
}

/// Append pinned versions to internal product specs that carry a bare name
fn pin_internal(
    name: &str,
    meta: InternalProduct,
    pins: &HashMap<String, PinnedVersion>,
) -> InternalProduct {
    let Some(pin) = pins.get(name) else {
        return meta;
    };

    let pin_spec = |spec: Option<String>, kind: DepKind| -> Option<String> {
        let spec = spec.unwrap_or_else(|| name.to_string());
        match pin.get(kind) {
            Some(constraint) if spec.split_whitespace().count() == 1 => {
                Some(format!("{spec} {constraint}"))
            }
            _ => Some(spec),
        }
    };

    InternalProduct {
        build: pin_spec(meta.build, DepKind::Build),
        run: pin_spec(meta.run, DepKind::Run),
    }
}

/// Parse one `[dependencies."<name-type>/<glob>"]` table
fn parse_dependency_rule(
    key: &str,
    deps: &RawDependencySet,
    names: &NameMapper<'_>,
    pins: &HashMap<String, PinnedVersion>,
) -> Result<MissingDepRule> {
    let (name_type, product) = key.split_once('/').unwrap_or(("eups", key));
    let target = match name_type {
        "eups" => names.target_name(product),
        "conda" => product.to_string(),
        other => {
            return Err(Error::ConfigError(format!(
                "Unknown name type '{other}' in dependencies for '{product}'"
            )));
        }
    };

    let parse_all = |specs: &[String], kind: DepKind| -> Result<Vec<MissingDependency>> {
        specs
            .iter()
            .map(|spec| MissingDependency::parse(spec, kind, names, pins))
            .collect()
    };

    MissingDepRule::new(
        &target,
        parse_all(&deps.build, DepKind::Build)?,
        parse_all(&deps.run, DepKind::Run)?,
    )
}

/// Conda platform subdir of the running host
pub fn host_platform() -> String {
    let os = match std::env::consts::OS {
        "macos" => "osx",
        "windows" => "win",
        other => other,
    };
    let bits = if cfg!(target_pointer_width = "64") { "64" } else { "32" };
    format!("{os}-{bits}")
}
