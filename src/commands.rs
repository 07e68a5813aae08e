// src/commands.rs
//! Command handlers for the recipegen CLI

use anyhow::{Context, Result};
use recipegen::channel::{self, ChannelClient, ChannelReconciler, ReconcileStats};
use recipegen::recipe::{DirTemplateRenderer, RecipeHasher, RecipeMaker};
use recipegen::version::{
    CommandRevisionResolver, CondaVersionGrammar, NoRevisionResolver, RevisionResolver,
    VersionTranslator,
};
use recipegen::{BuildIndex, Config, LocalIndexOracle, Manifest, SqliteBuildIndex};
use std::path::Path;
use tracing::info;

fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("Failed to load {}", path.display()))
}

fn open_index(config: &Config) -> Result<SqliteBuildIndex> {
    let path = config.index_path();
    SqliteBuildIndex::open(&path)
        .with_context(|| format!("Failed to open build index {}", path.display()))
}

fn revision_resolver(config: &Config) -> Box<dyn RevisionResolver> {
    match &config.revision_helper {
        Some(helper) => Box::new(CommandRevisionResolver::new(helper)),
        None => Box::new(NoRevisionResolver),
    }
}

fn reconcile(config: &Config, index: &SqliteBuildIndex) -> Result<ReconcileStats> {
    let client = ChannelClient::new(config.network_timeout)?;
    let hasher = RecipeHasher::from_config(config);
    let stats = ChannelReconciler::new(index, &client, &hasher, &config.platform)
        .with_progress(true)
        .reconcile(&config.channels)
        .context("Failed to reindex channels")?;

    info!(
        "Build index updated: {} hashed, {} mirrored, {} removed, {} unchanged",
        stats.hashed, stats.cloned, stats.removed, stats.unchanged
    );
    Ok(stats)
}

/// Generate recipes and the rebuild script
pub fn cmd_generate(
    config_path: &Path,
    manifest_ref: &str,
    products: &[String],
    offline: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let index = open_index(&config)?;

    if offline {
        info!("Offline: using the build index as is");
    } else {
        reconcile(&config, &index)?;
    }

    let manifest = Manifest::load(
        manifest_ref,
        config.manifest_url.as_deref(),
        config.network_timeout,
    )
    .with_context(|| format!("Failed to load manifest {manifest_ref}"))?;

    let oracle = LocalIndexOracle::new(&index);
    let templates = DirTemplateRenderer::new(&config.template_dir);
    let revisions = revision_resolver(&config);
    let maker = RecipeMaker::new(&config, &index, &oracle, &templates, revisions.as_ref());

    let report = maker.generate(&manifest, products)?;

    println!(
        "Generated {} recipes in {}: {} to build, {} already built",
        report.products.len(),
        config.output_dir.display(),
        report.plan.to_build.len(),
        report.plan.already_built.len()
    );
    Ok(())
}

/// Refresh the build index
pub fn cmd_reindex(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let index = open_index(&config)?;
    let stats = reconcile(&config, &index)?;

    println!(
        "Indexed {} channels ({} not yet populated), purged {}",
        stats.indexed, stats.uninitialized, stats.purged_channels
    );
    Ok(())
}

/// Print locally built artifacts missing from every remote channel
pub fn cmd_uploads(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let index = open_index(&config)?;

    for path in channel::local_only_artifacts(&index, &config.platform)? {
        println!("{}", path.display());
    }
    Ok(())
}

/// Print a recipe directory's hash
pub fn cmd_hash(config_path: &Path, dir: &Path, show_files: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let digest = RecipeHasher::from_config(&config)
        .hash_dir(dir)
        .with_context(|| format!("Failed to hash {}", dir.display()))?;

    if show_files {
        for line in &digest.files {
            println!("{line}");
        }
    }
    println!("{}", digest.digest);
    Ok(())
}

/// Print the conda version of an EUPS version
pub fn cmd_translate(config_path: &Path, product: &str, version: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let revisions = revision_resolver(&config);
    let giturl = config.git_url_for(product);

    let translated = VersionTranslator::new(revisions.as_ref(), &CondaVersionGrammar)
        .translate(product, version, giturl.as_deref())?;

    println!("name:                {}", config.name_mapper().target_name(product));
    println!("version:             {}", translated.version);
    println!("build string prefix: {}", translated.build_string_prefix);
    println!("conda compliant:     {}", translated.compliant);
    Ok(())
}

/// Print the next build number of a package version
pub fn cmd_next_build(config_path: &Path, name: &str, version: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let index = open_index(&config)?;
    println!("{}", index.next_build_number(name, version)?);
    Ok(())
}
