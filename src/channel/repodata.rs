// src/channel/repodata.rs

//! Channel index (`<channel>/<platform>/repodata.json`)

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

/// Index document file name inside a platform directory
pub const REPODATA_FILE: &str = "repodata.json";

/// The parts of a package entry the build index cares about
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    pub version: String,
    pub build_number: i64,
}

impl PackageInfo {
    pub fn key(&self) -> (&str, &str, i64) {
        (&self.name, &self.version, self.build_number)
    }
}

/// A platform's package listing: artifact file name → package info
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepoData {
    #[serde(default)]
    pub packages: BTreeMap<String, PackageInfo>,
    /// Newer channels list `.conda` artifacts separately
    #[serde(default, rename = "packages.conda")]
    pub conda_packages: BTreeMap<String, PackageInfo>,
}

impl RepoData {
    pub fn parse(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// One artifact per (name, version, build number), keyed by that triple
    ///
    /// When both a `.tar.bz2` and a `.conda` build exist, the first listed
    /// (`packages`, then `packages.conda`) wins.
    pub fn by_key(&self) -> HashMap<(String, String, i64), (&str, &PackageInfo)> {
        let mut keyed = HashMap::new();
        for (filename, info) in self.packages.iter().chain(self.conda_packages.iter()) {
            keyed
                .entry((info.name.clone(), info.version.clone(), info.build_number))
                .or_insert((filename.as_str(), info));
        }
        keyed
    }

    pub fn len(&self) -> usize {
        self.packages.len() + self.conda_packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_listing() {
        let json = br#"{
            "info": {"subdir": "linux-64"},
            "packages": {
                "lsst-foo-1.2.0.3-abc_0.tar.bz2": {
                    "name": "lsst-foo", "version": "1.2.0.3", "build_number": 0,
                    "build": "abc_0", "depends": ["lsst-base"]
                }
            },
            "packages.conda": {
                "lsst-foo-1.2.0.3-abc_0.conda": {
                    "name": "lsst-foo", "version": "1.2.0.3", "build_number": 0
                },
                "lsst-bar-2.0-1.conda": {
                    "name": "lsst-bar", "version": "2.0", "build_number": 1
                }
            }
        }"#;

        let repodata = RepoData::parse(json).unwrap();
        assert_eq!(repodata.len(), 3);

        let keyed = repodata.by_key();
        assert_eq!(keyed.len(), 2);
        let (filename, _) = keyed[&("lsst-foo".to_string(), "1.2.0.3".to_string(), 0)];
        assert_eq!(filename, "lsst-foo-1.2.0.3-abc_0.tar.bz2");
    }

    #[test]
    fn test_empty_document() {
        let repodata = RepoData::parse(b"{}").unwrap();
        assert!(repodata.is_empty());
    }
}
