//! webimage - asynchronous image loading with a two-tier cache.
//!
//! This crate fetches remote images by URL, keeps them in an LRU memory cache
//! and an on-disk cache with age and size retention, and deduplicates
//! concurrent downloads of the same resource.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing caches, downloads and the loader.
pub mod infrastructure;

pub use domain::{CacheKey, ImageSource, LoadError, LoadEvent, LoadOutcome, LoadedImage};
pub use infrastructure::{
    DownloadCoordinator, ImageLoader, LoadHandle, LoadOptions, TieredCache, WebImageConfig,
};

/// Current version of the library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = "webimage";
