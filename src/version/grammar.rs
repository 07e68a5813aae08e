// src/version/grammar.rs

//! Target version grammar
//!
//! Conda orders versions by splitting them into components on `.` and `_`,
//! with an optional `<epoch>!` prefix and an optional `+<local>` suffix.
//! This module only answers "would conda accept this string"; the ordering
//! itself belongs to conda.

/// Something that can tell whether a version string is valid for the target
pub trait VersionGrammar {
    fn is_valid(&self, version: &str) -> bool;
}

/// Conda's `VersionOrder` acceptance rules
#[derive(Debug, Clone, Copy, Default)]
pub struct CondaVersionGrammar;

impl VersionGrammar for CondaVersionGrammar {
    fn is_valid(&self, version: &str) -> bool {
        is_conda_version(version)
    }
}

/// Check a version string against conda's version syntax
pub fn is_conda_version(version: &str) -> bool {
    let version = version.trim().to_lowercase();
    if version.is_empty() {
        return false;
    }
    if !version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '+' | '!' | '*'))
    {
        return false;
    }

    let (epoch, rest) = match version.split_once('!') {
        Some((epoch, rest)) => (Some(epoch), rest),
        None => (None, version.as_str()),
    };
    if let Some(epoch) = epoch {
        if epoch.is_empty() || !epoch.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
    }
    if rest.contains('!') {
        return false;
    }

    let (main, local) = match rest.split_once('+') {
        Some((main, local)) => (main, Some(local)),
        None => (rest, None),
    };
    if local.is_some_and(|l| l.contains('+')) {
        return false;
    }

    std::iter::once(main)
        .chain(local)
        .all(components_are_well_formed)
}

fn components_are_well_formed(part: &str) -> bool {
    !part.is_empty() && part.split(['.', '_']).all(|component| !component.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_common_versions() {
        for v in ["1.2.3", "0.10.1.3", "10.1.post2", "1!2.0", "1.0+local.1", "master.20150801", "2.0_rc1"] {
            assert!(is_conda_version(v), "{v} should be valid");
        }
    }

    #[test]
    fn test_rejects_malformed_versions() {
        for v in ["", "1.2-3", "1..2", ".1", "1.", "a!1", "1+2+3", "1.0+", "1 0", "x!1!2"] {
            assert!(!is_conda_version(v), "{v:?} should be invalid");
        }
    }
}
