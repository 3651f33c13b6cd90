//! Cache key type.

use sha2::{Digest, Sha256};

/// File extension used for entries in the disk tier.
pub const DISK_ENTRY_EXTENSION: &str = "img";

/// Key identifying one slot in both cache tiers.
///
/// Usually the resource URL, optionally rewritten by a
/// [`CacheKeyFilter`](crate::domain::ports::CacheKeyFilter). Two equal keys
/// always address the same memory slot and the same disk file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Creates a new `CacheKey` from any string-like input.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the key is the empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the file name this key is stored under on disk.
    ///
    /// The name is a truncated SHA-256 of the key, so the same key always maps
    /// to the same file and arbitrary URLs never leak path separators.
    #[must_use]
    pub fn file_name(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let digest = hasher.finalize();
        format!("{}.{DISK_ENTRY_EXTENSION}", hex::encode(&digest[..16]))
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
