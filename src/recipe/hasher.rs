// src/recipe/hasher.rs

//! Content hash over a recipe directory
//!
//! The hash decides whether a freshly generated recipe matches one that was
//! already built, so it must only depend on what the recipe *says*, never on
//! the build number this tool assigns to it:
//!
//! - only files on a suffix allow-list take part (patches, YAML, shell),
//!   plus `meta.yaml.template`, which conda-build stores inside built
//!   packages in place of the rendered `meta.yaml`
//! - `number:` and `string:` entries of the `build:` section of `meta.yaml`
//!   are dropped before hashing
//!
//! Each file is hashed on its own; the final digest is the SHA-256 of the
//! `<file digest>  <relative path>\n` lines in sorted path order.

use crate::config::Config;
use crate::error::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Rendered recipe metadata document
pub const METADATA_FILE: &str = "meta.yaml";
/// Name conda-build gives the metadata document inside built packages
pub const METADATA_TEMPLATE_FILE: &str = "meta.yaml.template";

/// Result of hashing a recipe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipeDigest {
    pub digest: String,
    /// One `<digest>  <path>` line per hashed file, in hashing order
    pub files: Vec<String>,
}

/// Hashes recipe files
#[derive(Debug, Clone)]
pub struct RecipeHasher {
    suffixes: Vec<String>,
}

impl RecipeHasher {
    pub fn new(suffixes: Vec<String>) -> Self {
        Self { suffixes }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.hash_suffixes.clone())
    }

    /// Whether a file (by relative path) takes part in the hash
    pub fn participates(&self, rel_path: &str) -> bool {
        is_metadata_template(rel_path)
            || self.suffixes.iter().any(|s| rel_path.ends_with(s.as_str()))
    }

    /// Hash every file below `dir`
    pub fn hash_dir(&self, dir: &Path) -> Result<RecipeDigest> {
        let mut files = Vec::new();
        for entry in WalkDir::new(dir) {
            let entry = entry.map_err(|e| {
                Error::IoError(format!("Failed to walk {}: {e}", dir.display()))
            })?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }
        self.hash_files(&files, dir)
    }

    /// Hash `files`, naming each by its path relative to `prefix`
    pub fn hash_files(&self, files: &[PathBuf], prefix: &Path) -> Result<RecipeDigest> {
        let mut entries = Vec::new();
        for path in files {
            let rel = path.strip_prefix(prefix).unwrap_or(path);
            let rel = rel.to_string_lossy().replace('\\', "/");
            if !self.participates(&rel) {
                continue;
            }
            let contents = fs::read(path).map_err(|e| {
                Error::IoError(format!("Failed to read {}: {e}", path.display()))
            })?;
            entries.push((rel, contents));
        }
        Ok(self.hash_entries(entries))
    }

    /// Hash in-memory `(relative path, contents)` pairs
    pub fn hash_entries<I>(&self, entries: I) -> RecipeDigest
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        // Order by the name that gets hashed, so a packaged recipe sorts like
        // the rendered one
        let mut entries: Vec<(String, Vec<u8>)> = entries
            .into_iter()
            .filter(|(rel, _)| self.participates(rel))
            .map(|(rel, contents)| {
                let name = if is_metadata_template(&rel) {
                    rel[..rel.len() - ".template".len()].to_string()
                } else {
                    rel
                };
                (name, contents)
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let mut listing = Sha256::new();
        let mut files = Vec::with_capacity(entries.len());

        for (name, contents) in entries {
            let file_digest = if name == METADATA_FILE || name.ends_with("/meta.yaml") {
                hex::encode(Sha256::digest(strip_build_counters(&contents)))
            } else {
                hex::encode(Sha256::digest(&contents))
            };

            let line = format!("{file_digest}  {name}\n");
            listing.update(line.as_bytes());
            files.push(line.trim_end().to_string());
        }

        RecipeDigest {
            digest: hex::encode(listing.finalize()),
            files,
        }
    }
}

fn is_metadata_template(rel_path: &str) -> bool {
    rel_path == METADATA_TEMPLATE_FILE || rel_path.ends_with("/meta.yaml.template")
}

/// Drop `number:` and `string:` lines from the `build:` section
///
/// The section ends at the first blank line or the next top-level key.
pub fn strip_build_counters(contents: &[u8]) -> Vec<u8> {
    #[derive(PartialEq)]
    enum State {
        Searching,
        InBuild,
        Done,
    }

    let mut state = State::Searching;
    let mut out = Vec::with_capacity(contents.len());

    for line in contents.split_inclusive(|b| *b == b'\n') {
        let trimmed = line.trim_ascii();
        match state {
            State::Searching => {
                if trimmed == b"build:" && !line.starts_with(b" ") {
                    state = State::InBuild;
                }
            }
            State::InBuild => {
                if trimmed.is_empty() || !(line.starts_with(b" ") || line.starts_with(b"\t")) {
                    state = State::Done;
                } else if trimmed.starts_with(b"number:") || trimmed.starts_with(b"string:") {
                    continue;
                }
            }
            State::Done => {}
        }
        out.extend_from_slice(line);
    }

    out
}
