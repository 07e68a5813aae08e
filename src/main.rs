// src/main.rs

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // -v wins over RUST_LOG
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Generate {
            manifest,
            products,
            offline,
        } => commands::cmd_generate(&cli.config, &manifest, &products, offline),
        Commands::Reindex => commands::cmd_reindex(&cli.config),
        Commands::Uploads => commands::cmd_uploads(&cli.config),
        Commands::Hash { dir, files } => commands::cmd_hash(&cli.config, &dir, files),
        Commands::Translate { product, version } => {
            commands::cmd_translate(&cli.config, &product, &version)
        }
        Commands::NextBuild { name, version } => {
            commands::cmd_next_build(&cli.config, &name, &version)
        }
    }
}
