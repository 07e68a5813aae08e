// src/manifest.rs

//! EUPS build manifests
//!
//! A manifest is a flat listing of every product in a release:
//!
//! ```text
//! # versiondb manifest
//! BUILD=b1497
//! afw         4c0b3f1  10.1-1-g4c0b3f1    base,daf_base,utils
//! base        7d3a1f2  10.1-3-g7d3a1f2
//! ```
//!
//! The first line is a header, the second optionally carries the build id.
//! Every following non-blank, non-comment line is
//! `<product> <revision> <version> [<dep1>,<dep2>,...]`.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Prefix selecting a published manifest by build id instead of a file
pub const BUILD_REFERENCE_PREFIX: &str = "build:";

/// One manifest line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRecord {
    pub id: String,
    pub revision: String,
    pub version: String,
    pub dependencies: Vec<String>,
}

/// A parsed manifest, keyed by product id in file order
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub build_id: Option<String>,
    components: IndexMap<String, ComponentRecord>,
}

impl Manifest {
    /// Parse manifest text
    pub fn parse(text: &str) -> Result<Self> {
        let lines: Vec<&str> = text.lines().collect();

        let build_id = lines
            .get(1)
            .and_then(|line| line.trim().strip_prefix("BUILD="))
            .map(|id| id.trim().to_string());

        let mut components = IndexMap::new();
        for (idx, raw) in lines.iter().enumerate().skip(2) {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let record = parse_line(line).ok_or_else(|| {
                Error::ManifestError(format!("line {}: malformed entry '{}'", idx + 1, line))
            })?;
            components.insert(record.id.clone(), record);
        }

        Ok(Self {
            build_id,
            components,
        })
    }

    /// Load a manifest from a file, or from `manifest_url` for a
    /// `build:<id>` reference
    pub fn load(reference: &str, manifest_url: Option<&str>, timeout: Duration) -> Result<Self> {
        let text = match reference.strip_prefix(BUILD_REFERENCE_PREFIX) {
            Some(build) => {
                let template = manifest_url.ok_or_else(|| {
                    Error::ConfigError(format!(
                        "'{reference}' needs manifest_url to be configured"
                    ))
                })?;
                fetch_manifest(&template.replace("{build}", build), timeout)?
            }
            None => fs::read_to_string(Path::new(reference)).map_err(|e| {
                Error::IoError(format!("Failed to read manifest {reference}: {e}"))
            })?,
        };

        Self::parse(&text)
    }

    pub fn get(&self, id: &str) -> Option<&ComponentRecord> {
        self.components.get(id)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentRecord> {
        self.components.values()
    }
}

fn parse_line(line: &str) -> Option<ComponentRecord> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let (id, revision, version, deps) = match fields.as_slice() {
        [id, revision, version] => (id, revision, version, None),
        [id, revision, version, deps] => (id, revision, version, Some(deps)),
        _ => return None,
    };

    let dependencies = deps
        .map(|d| {
            d.split(',')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(ComponentRecord {
        id: id.to_string(),
        revision: revision.to_string(),
        version: version.to_string(),
        dependencies,
    })
}

fn fetch_manifest(url: &str, timeout: Duration) -> Result<String> {
    info!("Fetching manifest from {}", url);

    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::InitError(format!("Failed to create HTTP client: {e}")))?;

    let response = client
        .get(url)
        .send()
        .map_err(|e| Error::DownloadError(format!("Failed to fetch {url}: {e}")))?;

    if !response.status().is_success() {
        return Err(Error::DownloadError(format!(
            "HTTP {} from {}",
            response.status(),
            url
        )));
    }

    response
        .text()
        .map_err(|e| Error::DownloadError(format!("Failed to read manifest body: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = "\
# versiondb manifest
BUILD=b1497
base     7d3a1f2  10.1-3-g7d3a1f2

# comment
utils    9ab01c2  10.1+2    base
afw      4c0b3f1  10.1-1-g4c0b3f1    base,utils
";

    #[test]
    fn test_parse_manifest() {
        let manifest = Manifest::parse(MANIFEST).unwrap();

        assert_eq!(manifest.build_id.as_deref(), Some("b1497"));
        assert_eq!(manifest.len(), 3);

        let afw = manifest.get("afw").unwrap();
        assert_eq!(afw.revision, "4c0b3f1");
        assert_eq!(afw.version, "10.1-1-g4c0b3f1");
        assert_eq!(afw.dependencies, vec!["base", "utils"]);

        assert!(manifest.get("base").unwrap().dependencies.is_empty());

        let order: Vec<&str> = manifest.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(order, vec!["base", "utils", "afw"]);
    }

    #[test]
    fn test_second_line_without_build_id_is_skipped() {
        let manifest = Manifest::parse("header\nsomething\nfoo abc 1.0\n").unwrap();
        assert!(manifest.build_id.is_none());
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn test_malformed_line_is_fatal() {
        let err = Manifest::parse("header\nBUILD=b1\nfoo abc\n").unwrap_err();
        assert!(matches!(err, Error::ManifestError(_)));
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_build_reference_requires_url() {
        let err = Manifest::load("build:b1", None, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }
}
