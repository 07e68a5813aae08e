// src/index.rs

//! Build index: which recipe hashes were already built, and under which
//! build numbers
//!
//! The index answers two questions for the recipe maker:
//!
//! - was a recipe with this exact content already built for (name, version)?
//!   If so its build number is reused and the package is not rebuilt.
//! - otherwise, which build number comes next? Always one above the highest
//!   number seen for (name, version) in *any* channel, so a fresh build can
//!   never collide with an artifact that exists somewhere else.
//!
//! Records only enter the index through channel reconciliation, which reads
//! what channels actually contain. Generation itself never writes.

use crate::config::Config;
use crate::db;
use crate::db::models::{Channel, PackageRecord};
use crate::error::{Error, Result};
use rusqlite::Connection;
use std::path::Path;
use tracing::debug;

/// Storage contract for build numbers and recipe hashes
pub trait BuildIndex {
    /// Build number previously recorded for this exact recipe hash
    ///
    /// Returns [`Error::NotFound`] when no record matches.
    fn lookup(&self, name: &str, version: &str, recipe_hash: &str) -> Result<i64>;

    /// `1 + max` build number of (name, version) over all channels, or 0
    fn next_build_number(&self, name: &str, version: &str) -> Result<i64>;

    /// Record an artifact listed by a channel
    fn insert(&self, record: &PackageRecord) -> Result<i64>;

    fn records_for_channel(&self, channel_id: i64) -> Result<Vec<PackageRecord>>;

    fn all_records(&self) -> Result<Vec<PackageRecord>>;

    /// Any record of (name, version, build number), whatever the channel
    fn find_key(
        &self,
        name: &str,
        version: &str,
        build_number: i64,
    ) -> Result<Option<PackageRecord>>;

    fn delete_record(&self, id: i64) -> Result<()>;

    /// Channel for `url`, created on first reference
    fn ensure_channel(&self, url: &str) -> Result<Channel>;

    fn channels(&self) -> Result<Vec<Channel>>;

    /// Mark a channel as freshly indexed
    fn touch_channel(&self, channel_id: i64) -> Result<()>;

    /// Drop a channel together with all of its records
    fn delete_channel(&self, channel_id: i64) -> Result<()>;
}

/// SQLite-backed build index
pub struct SqliteBuildIndex {
    conn: Connection,
}

impl SqliteBuildIndex {
    /// Open (or create) the index database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            conn: db::open(path)?,
        })
    }

    /// Open the index for the configured platform
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::open(&config.index_path())
    }

    /// Throwaway index that forgets everything on drop
    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            conn: db::open_in_memory()?,
        })
    }
}

impl BuildIndex for SqliteBuildIndex {
    fn lookup(&self, name: &str, version: &str, recipe_hash: &str) -> Result<i64> {
        PackageRecord::find_build_number(&self.conn, name, version, recipe_hash)?.ok_or_else(
            || Error::NotFound(format!("{name}-{version} with recipe hash {recipe_hash}")),
        )
    }

    fn next_build_number(&self, name: &str, version: &str) -> Result<i64> {
        let next = PackageRecord::max_build_number(&self.conn, name, version)?
            .map(|max| max + 1)
            .unwrap_or(0);
        debug!("Next build number for {}-{}: {}", name, version, next);
        Ok(next)
    }

    fn insert(&self, record: &PackageRecord) -> Result<i64> {
        let mut record = record.clone();
        record.id = None;
        record.insert(&self.conn)
    }

    fn records_for_channel(&self, channel_id: i64) -> Result<Vec<PackageRecord>> {
        PackageRecord::list_by_channel(&self.conn, channel_id)
    }

    fn all_records(&self) -> Result<Vec<PackageRecord>> {
        PackageRecord::list_all(&self.conn)
    }

    fn find_key(
        &self,
        name: &str,
        version: &str,
        build_number: i64,
    ) -> Result<Option<PackageRecord>> {
        PackageRecord::find_by_key(&self.conn, name, version, build_number)
    }

    fn delete_record(&self, id: i64) -> Result<()> {
        PackageRecord::delete(&self.conn, id)
    }

    fn ensure_channel(&self, url: &str) -> Result<Channel> {
        Channel::find_or_create(&self.conn, url)
    }

    fn channels(&self) -> Result<Vec<Channel>> {
        Channel::list_all(&self.conn)
    }

    fn touch_channel(&self, channel_id: i64) -> Result<()> {
        Channel::touch(&self.conn, channel_id)
    }

    fn delete_channel(&self, channel_id: i64) -> Result<()> {
        Channel::delete(&self.conn, channel_id)
    }
}

/// Build number decision for one generated recipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildAssignment {
    pub build_number: i64,
    /// The same recipe content was built before under `build_number`
    pub already_built: bool,
}

/// Reuse the build number of an identical recipe, or mint the next one
pub fn assign_build_number(
    index: &dyn BuildIndex,
    name: &str,
    version: &str,
    recipe_hash: &str,
) -> Result<BuildAssignment> {
    match index.lookup(name, version, recipe_hash) {
        Ok(build_number) => Ok(BuildAssignment {
            build_number,
            already_built: true,
        }),
        Err(e) if e.is_not_found() => Ok(BuildAssignment {
            build_number: index.next_build_number(name, version)?,
            already_built: false,
        }),
        Err(e) => Err(e),
    }
}
