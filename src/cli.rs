// src/cli.rs
//! CLI definitions for recipegen
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default configuration file, looked up in the working directory
pub const DEFAULT_CONFIG: &str = "recipegen.toml";

#[derive(Parser)]
#[command(name = "recipegen")]
#[command(version)]
#[command(about = "Generate conda recipes from EUPS manifests", long_about = None)]
pub struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Log debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate recipes for a manifest and write the rebuild script
    Generate {
        /// Manifest file, or build:<id> to fetch a published manifest
        manifest: String,

        /// Top-level products (default: everything in the manifest)
        products: Vec<String>,

        /// Do not refresh the build index from the channels first
        #[arg(long)]
        offline: bool,
    },

    /// Refresh the build index from the configured channels
    Reindex,

    /// List locally built packages that no remote channel has
    Uploads,

    /// Print the content hash of a recipe directory
    Hash {
        /// Recipe directory
        dir: PathBuf,

        /// Also print the per-file hashes
        #[arg(long)]
        files: bool,
    },

    /// Translate an EUPS version to a conda version
    Translate {
        /// EUPS product name
        product: String,

        /// EUPS version string
        version: String,
    },

    /// Print the next free build number for a conda package version
    NextBuild {
        /// Conda package name
        name: String,

        /// Conda version
        version: String,
    },
}
