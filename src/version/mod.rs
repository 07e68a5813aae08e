// src/version/mod.rs

//! EUPS → conda version translation
//!
//! A conda version has three parts: the version proper (ordered by conda),
//! a build string (free-form, never compared) and a build number (tie
//! breaker for equal versions). EUPS versions are mapped onto that shape,
//! trying these forms in order:
//!
//! - `<tag>-<N>-g<sha>` → `<tag>.<N>`, build string prefix `<sha>`
//! - `<X.Y.Z>[._-]lsst<K>` (or `<X.Y.Z>lsst<K>`) → `<X.Y.Z>.<K>`
//! - `<branch>-g<sha>` → `<branch>.<commit timestamp>`, build string prefix `<sha>`
//! - anything else passes through unchanged
//!
//! The translation is lossy and never fails for a version that merely looks
//! unusual: the result carries a `compliant` flag instead. Only the branch
//! form can fail, when the commit timestamp cannot be resolved.

pub mod grammar;
pub mod revision;

use crate::error::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

pub use grammar::{CondaVersionGrammar, VersionGrammar, is_conda_version};
pub use revision::{CommandRevisionResolver, NoRevisionResolver, RevisionResolver};

static TAGGED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^-]+)-([0-9]+)-g([0-9a-z]+)$").unwrap());
static PATCHLEVEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)[._-]?lsst([0-9]+)$").unwrap());
static BRANCH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^-]+)-g([0-9a-z]+)$").unwrap());
// Historical release numbers (10.x ... 19.x) that should sort below 1.0
static LARGE_RELEASE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^1[0-9]\.[0-9]+").unwrap());

/// A translated version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedVersion {
    pub version: String,
    /// Non-ordering prefix of the build string (usually a commit sha)
    pub build_string_prefix: String,
    /// Base build number; always 0 until forced bumps are supported
    pub build_number: i64,
    /// Whether conda accepts `version`
    pub compliant: bool,
}

/// Translates EUPS versions into conda versions
pub struct VersionTranslator<'a> {
    revisions: &'a dyn RevisionResolver,
    grammar: &'a dyn VersionGrammar,
}

impl<'a> VersionTranslator<'a> {
    pub fn new(revisions: &'a dyn RevisionResolver, grammar: &'a dyn VersionGrammar) -> Self {
        Self { revisions, grammar }
    }

    /// Translate `eups_version` of `product`, whose source lives at `repository`
    pub fn translate(
        &self,
        product: &str,
        eups_version: &str,
        repository: Option<&str>,
    ) -> Result<TranslatedVersion> {
        let (raw, patch_counter) = split_patch_counter(eups_version);

        let (mut version, build_string_prefix) = if let Some(parsed) = parse_tagged(raw) {
            parsed
        } else if let Some(version) = parse_patchlevel(raw) {
            (version, String::new())
        } else if let Some((branch, sha)) = parse_branch(raw) {
            let repository = repository.ok_or_else(|| {
                Error::RevisionLookup(format!(
                    "{product}: version {eups_version} needs a source repository to resolve {sha}"
                ))
            })?;
            let timestamp = self.revisions.timestamp(repository, sha)?;
            (format!("{branch}.{timestamp}"), sha.to_string())
        } else {
            (raw.to_string(), String::new())
        };

        if LARGE_RELEASE_RE.is_match(&version) {
            version.insert_str(0, "0.");
        }

        if let Some(counter) = patch_counter.filter(|n| *n > 0) {
            version.push_str(&format!(".post{counter}"));
        }

        if version.contains('-') {
            version = version.replace('-', "_");
        }

        let compliant = self.grammar.is_valid(&version);
        if !compliant {
            warn!(
                "{}: version {} (from {}) is not a valid conda version",
                product, version, eups_version
            );
        }

        Ok(TranslatedVersion {
            version,
            build_string_prefix,
            build_number: 0,
            compliant,
        })
    }
}

/// Split off a trailing `+<N>` EUPS rebuild counter
fn split_patch_counter(version: &str) -> (&str, Option<u64>) {
    match version.split_once('+') {
        Some((raw, counter)) => match counter.parse::<u64>() {
            Ok(n) => (raw, Some(n)),
            Err(_) => (version, None),
        },
        None => (version, None),
    }
}

fn parse_tagged(version: &str) -> Option<(String, String)> {
    let caps = TAGGED_RE.captures(version)?;
    let tag = &caps[1];
    let tag = parse_patchlevel(tag).unwrap_or_else(|| tag.to_string());
    Some((format!("{}.{}", tag, &caps[2]), caps[3].to_string()))
}

fn parse_patchlevel(version: &str) -> Option<String> {
    let caps = PATCHLEVEL_RE.captures(version)?;
    Some(format!("{}.{}", &caps[1], &caps[2]))
}

fn parse_branch(version: &str) -> Option<(&str, &str)> {
    let caps = BRANCH_RE.captures(version)?;
    let branch = caps.get(1)?.as_str();
    let sha = caps.get(2)?.as_str();
    Some((branch, sha))
}
