//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.

use std::io;

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key not found in cache
    #[error("key not found: {0}")]
    NotFound(String),

    /// Key pattern failed to compile
    #[error("invalid key pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// Backup/restore path escapes its base via `..`
    #[error("path traversal detected: {0}")]
    PathTraversal(String),

    /// Backup/restore path points into a protected system directory
    #[error("access to system directories not allowed: {0}")]
    SystemDirectory(String),

    /// Filesystem failure, with what was being attempted
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    /// Cache file could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Stored value could not be decompressed or decoded
    #[error("compression error: {0}")]
    Compression(String),

    /// Configuration rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Aggregated entry diagnostics
    #[error("cache validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

impl CacheError {
    /// Wraps an I/O error with a short description of the failed step.
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        CacheError::Io {
            context: context.into(),
            source,
        }
    }
}

// == I/O Context Extension ==
/// Attaches context to `std::io` results.
pub trait IoResultExt<T> {
    fn context(self, context: &str) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, io::Error> {
    fn context(self, context: &str) -> Result<T> {
        self.map_err(|source| CacheError::io(context, source))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
