//! URLs whose last download failed permanently.

use std::collections::HashSet;

use parking_lot::RwLock;
use tracing::debug;

/// Set of blacklisted URLs. Loads for these fail fast unless the caller asks
/// to retry.
#[derive(Debug, Default)]
pub struct FailureRegistry {
    urls: RwLock<HashSet<String>>,
}

impl FailureRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `url` is blacklisted.
    pub fn contains(&self, url: &str) -> bool {
        self.urls.read().contains(url)
    }

    /// Blacklists `url`. Returns false if it already was.
    pub fn insert(&self, url: &str) -> bool {
        let added = self.urls.write().insert(url.to_string());
        if added {
            debug!(url = %url, "URL added to failure registry");
        }
        added
    }

    /// Forgets `url`. Returns true if it was blacklisted.
    pub fn remove(&self, url: &str) -> bool {
        let removed = self.urls.write().remove(url);
        if removed {
            debug!(url = %url, "URL removed from failure registry");
        }
        removed
    }

    /// Forgets every URL.
    pub fn clear(&self) {
        self.urls.write().clear();
    }

    /// Number of blacklisted URLs.
    pub fn len(&self) -> usize {
        self.urls.read().len()
    }

    /// Returns true if nothing is blacklisted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
