// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use bzip2::Compression;
use bzip2::write::BzEncoder;
use recipegen::recipe::{DirTemplateRenderer, GenerationReport, RecipeMaker};
use recipegen::version::NoRevisionResolver;
use recipegen::{Config, LocalIndexOracle, Manifest, Result, SqliteBuildIndex};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use url::Url;
use walkdir::WalkDir;

pub const PLATFORM: &str = "linux-64";

/// A scratch generator setup: config, templates, static recipes and patches
/// under one temporary directory.
///
/// Keep the value alive for as long as the paths are used.
pub struct Workspace {
    pub root: TempDir,
}

impl Workspace {
    /// Create a workspace whose config carries `extra` (TOML) after the
    /// required keys
    pub fn new(extra: &str) -> Self {
        let root = tempfile::tempdir().unwrap();

        let templates = Path::new(env!("CARGO_MANIFEST_DIR")).join("templates");
        let dest = root.path().join("templates");
        fs::create_dir_all(&dest).unwrap();
        for entry in fs::read_dir(&templates).unwrap() {
            let entry = entry.unwrap();
            fs::copy(entry.path(), dest.join(entry.file_name())).unwrap();
        }
        fs::create_dir_all(root.path().join("static")).unwrap();
        fs::create_dir_all(root.path().join("patches")).unwrap();

        let config = format!(
            r#"
output_dir = "out"
build_index_dir = "cache"
static_recipes_dir = "static"
template_dir = "templates"
patch_dir = "patches"
prefix = "lsst-"
platform = "{PLATFORM}"
{extra}
"#
        );
        fs::write(root.path().join("recipegen.toml"), config).unwrap();

        Self { root }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    pub fn config(&self) -> Config {
        Config::load(&self.path().join("recipegen.toml")).unwrap()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path().join("out")
    }

    pub fn recipe_dir(&self, name: &str) -> PathBuf {
        self.output_dir().join(name)
    }

    pub fn read_recipe_file(&self, name: &str, file: &str) -> String {
        fs::read_to_string(self.recipe_dir(name).join(file)).unwrap()
    }

    /// Write a versiondb manifest with build id `b1`
    pub fn write_manifest(&self, lines: &[&str]) -> PathBuf {
        let path = self.path().join("manifest.txt");
        let text = format!("# versiondb manifest\nBUILD=b1\n{}\n", lines.join("\n"));
        fs::write(&path, text).unwrap();
        path
    }

    /// Add a static recipe directory with the given `meta.yaml`
    pub fn add_static_recipe(&self, name: &str, meta_yaml: &str) {
        let dir = self.path().join("static").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("meta.yaml"), meta_yaml).unwrap();
        fs::write(dir.join("build.sh"), "python setup.py install\n").unwrap();
    }

    pub fn add_patch(&self, product: &str, file: &str, body: &str) {
        let dir = self.path().join("patches").join(product);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), body).unwrap();
    }
}

/// Run the generator offline against `index`
pub fn generate(
    config: &Config,
    index: &SqliteBuildIndex,
    manifest: &Path,
    products: &[&str],
) -> Result<GenerationReport> {
    let manifest = Manifest::load(&manifest.to_string_lossy(), None, config.network_timeout)?;
    let oracle = LocalIndexOracle::new(index);
    let templates = DirTemplateRenderer::new(&config.template_dir);
    let revisions = NoRevisionResolver;
    RecipeMaker::new(config, index, &oracle, &templates, &revisions).generate(&manifest, products)
}

/// Package a recipe directory the way conda-build does: a `.tar.bz2` with
/// the recipe under `info/recipe/`
pub fn build_artifact(recipe_dir: &Path, dest: &Path) {
    let file = File::create(dest).unwrap();
    let mut builder = tar::Builder::new(BzEncoder::new(file, Compression::default()));

    for entry in WalkDir::new(recipe_dir) {
        let entry = entry.unwrap();
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(recipe_dir).unwrap();
        builder
            .append_path_with_name(entry.path(), Path::new("info/recipe").join(rel))
            .unwrap();
    }

    builder.into_inner().unwrap().finish().unwrap();
}

/// A `file://` channel directory
pub struct LocalChannel {
    pub dir: TempDir,
}

impl LocalChannel {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn url(&self) -> String {
        Url::from_directory_path(self.dir.path()).unwrap().to_string()
    }

    pub fn platform_dir(&self) -> PathBuf {
        let dir = self.dir.path().join(PLATFORM);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    pub fn artifact_path(&self, filename: &str) -> PathBuf {
        self.platform_dir().join(filename)
    }

    /// Write `repodata.json` listing `(filename, name, version, build number)`
    pub fn write_index(&self, packages: &[(&str, &str, &str, i64)]) {
        let listing: serde_json::Map<String, serde_json::Value> = packages
            .iter()
            .map(|(filename, name, version, build_number)| {
                (
                    filename.to_string(),
                    serde_json::json!({
                        "name": name,
                        "version": version,
                        "build_number": build_number,
                        "depends": [],
                    }),
                )
            })
            .collect();
        let repodata = serde_json::json!({
            "info": { "subdir": PLATFORM },
            "packages": listing,
        });
        fs::write(
            self.platform_dir().join("repodata.json"),
            serde_json::to_vec_pretty(&repodata).unwrap(),
        )
        .unwrap();
    }
}
