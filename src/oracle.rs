// src/oracle.rs

//! Build status of static recipes
//!
//! Generated recipes learn whether they were built from the recipe hash.
//! Static recipes are copied verbatim and carry their own build number, so
//! for them the only question is whether that exact build already exists
//! locally.

use crate::error::Result;
use crate::index::BuildIndex;
use std::collections::HashSet;

/// Answers "has this exact build been produced already?"
pub trait BuildStatusOracle {
    fn is_already_built(&self, name: &str, version: &str, build_number: i64) -> Result<bool>;
}

/// Looks the build up in the `file://` channels of a build index
pub struct LocalIndexOracle<'a> {
    index: &'a dyn BuildIndex,
}

impl<'a> LocalIndexOracle<'a> {
    pub fn new(index: &'a dyn BuildIndex) -> Self {
        Self { index }
    }
}

impl BuildStatusOracle for LocalIndexOracle<'_> {
    fn is_already_built(&self, name: &str, version: &str, build_number: i64) -> Result<bool> {
        let local: HashSet<i64> = self
            .index
            .channels()?
            .into_iter()
            .filter(|c| c.is_local())
            .filter_map(|c| c.id)
            .collect();

        for channel_id in local {
            let built = self
                .index
                .records_for_channel(channel_id)?
                .iter()
                .any(|r| r.key() == (name, version, build_number));
            if built {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
