// src/error.rs

//! Crate-wide error type

use crate::compression::CompressionError;
use thiserror::Error;

/// Errors raised while generating recipes or maintaining the build index
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Compression(#[from] CompressionError),

    #[error("Initialization error: {0}")]
    InitError(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Download error: {0}")]
    DownloadError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid manifest: {0}")]
    ManifestError(String),

    #[error("Unknown component '{0}' (not listed in the manifest)")]
    UnknownComponent(String),

    #[error("Dependency cycle detected: {0}")]
    DependencyCycle(String),

    #[error("{0}")]
    MissingRecipe(String),

    #[error("Product '{0}' was registered twice")]
    DuplicateProduct(String),

    #[error("Revision lookup failed: {0}")]
    RevisionLookup(String),

    #[error("Template error: {0}")]
    TemplateError(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for an index miss, which callers treat as "mint a new build number"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
