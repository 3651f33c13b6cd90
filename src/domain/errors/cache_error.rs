//! Cache I/O error types.

use std::path::PathBuf;

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Errors raised inside the cache tiers.
///
/// These never reach a load caller: the tiered cache logs them and degrades
/// to a miss.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Reading, writing or deleting a cache file failed.
    #[error("IO error at {}: {source}", path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    /// Creates an I/O error for `path`.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
