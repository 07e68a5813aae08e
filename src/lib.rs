// src/lib.rs

//! recipegen: EUPS → conda recipe generator
//!
//! Turns a versiondb manifest into one conda recipe per product, reusing
//! build numbers for recipes that have already been built.
//!
//! # Architecture
//!
//! - Manifest → closure resolution → one recipe per product, in dependency order
//! - Build index: SQLite, keyed by (name, version, recipe hash)
//! - Channel reconciliation keeps the index in step with what channels hold
//! - Configuration is read once and passed around by reference

pub mod channel;
pub mod compression;
pub mod config;
pub mod db;
mod error;
pub mod index;
pub mod manifest;
pub mod naming;
pub mod oracle;
pub mod recipe;
pub mod resolver;
pub mod version;

pub use channel::{ChannelClient, ChannelFetcher, ChannelReconciler, ReconcileStats};
pub use config::Config;
pub use error::{Error, Result};
pub use index::{BuildAssignment, BuildIndex, SqliteBuildIndex};
pub use manifest::{ComponentRecord, Manifest};
pub use naming::NameMapper;
pub use oracle::{BuildStatusOracle, LocalIndexOracle};
pub use recipe::{GenerationReport, RecipeHasher, RecipeMaker};
pub use version::{TranslatedVersion, VersionTranslator};
