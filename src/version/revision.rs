// src/version/revision.rs

//! Revision → timestamp lookup for branch builds
//!
//! A `<branch>-g<sha>` version carries no ordering information of its own,
//! so the commit timestamp of `<sha>` is used as the trailing version
//! component. How that timestamp is obtained (and formatted) belongs to an
//! external helper; this crate only runs it.

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Resolves a revision in a repository to an orderable timestamp string
pub trait RevisionResolver {
    fn timestamp(&self, repository: &str, revision: &str) -> Result<String>;
}

/// Runs `<program> <repository> <revision>` and uses its trimmed stdout
#[derive(Debug, Clone)]
pub struct CommandRevisionResolver {
    program: PathBuf,
}

impl CommandRevisionResolver {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl RevisionResolver for CommandRevisionResolver {
    fn timestamp(&self, repository: &str, revision: &str) -> Result<String> {
        debug!(
            "Resolving {} in {} via {}",
            revision,
            repository,
            self.program.display()
        );

        let output = Command::new(&self.program)
            .arg(repository)
            .arg(revision)
            .output()
            .map_err(|e| {
                Error::RevisionLookup(format!(
                    "failed to run {}: {e}",
                    self.program.display()
                ))
            })?;

        if !output.status.success() {
            return Err(Error::RevisionLookup(format!(
                "{} {} {} exited with {}: {}",
                self.program.display(),
                repository,
                revision,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let timestamp = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if timestamp.is_empty() {
            return Err(Error::RevisionLookup(format!(
                "no timestamp for {revision} in {repository}"
            )));
        }
        Ok(timestamp)
    }
}

/// Resolver for setups without a helper; every lookup fails
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRevisionResolver;

impl RevisionResolver for NoRevisionResolver {
    fn timestamp(&self, repository: &str, revision: &str) -> Result<String> {
        Err(Error::RevisionLookup(format!(
            "cannot resolve {revision} in {repository}: no revision_helper configured"
        )))
    }
}
