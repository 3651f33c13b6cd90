//! Per-loader hooks and cache key filters.

use regex::Regex;

/// Hooks an [`ImageLoader`](crate::infrastructure::loader::ImageLoader)
/// consults around the network stage.
///
/// Every method has a no-op default, so implementors override only what they
/// need.
#[cfg_attr(test, mockall::automock)]
pub trait LoaderHooks: Send + Sync {
    /// Decides whether a cache miss for `url` may go to the network.
    fn should_download(&self, _url: &str) -> bool {
        true
    }

    /// Transforms a freshly downloaded image before it is cached.
    ///
    /// Returning `None` keeps the image unchanged. Runs on the blocking pool.
    fn transform(&self, _image: &image::DynamicImage, _url: &str) -> Option<image::DynamicImage> {
        None
    }
}

/// Hooks that keep the default behaviour.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl LoaderHooks for DefaultHooks {}

/// Maps a resource URL to the string used as its cache key.
///
/// Must be deterministic: the same URL always yields the same key.
pub trait CacheKeyFilter: Send + Sync {
    /// Returns the key string for `url`.
    fn filter(&self, url: &str) -> String;
}

impl<F> CacheKeyFilter for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn filter(&self, url: &str) -> String {
        self(url)
    }
}

/// Drops the query string and fragment, keeping scheme, host and path.
#[derive(Debug, Clone, Copy, Default)]
pub struct StripQuery;

impl CacheKeyFilter for StripQuery {
    fn filter(&self, url: &str) -> String {
        let end = url.find(['?', '#']).unwrap_or(url.len());
        url[..end].to_string()
    }
}

/// Removes every match of a pattern, e.g. volatile signature parameters.
#[derive(Debug, Clone)]
pub struct RemovePattern(Regex);

impl RemovePattern {
    /// Compiles `pattern`.
    ///
    /// # Errors
    /// Returns error if the pattern is not a valid regular expression.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self)
    }
}

impl CacheKeyFilter for RemovePattern {
    fn filter(&self, url: &str) -> String {
        self.0.replace_all(url, "").into_owned()
    }
}
