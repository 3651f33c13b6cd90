//! Domain entity definitions.

mod cache_key;
mod entry;
mod format;

pub use cache_key::{CacheKey, DISK_ENTRY_EXTENSION};
pub use entry::{CacheEntry, ImageSource, LoadEvent, LoadOutcome, LoadedImage};
pub use format::ImageFormat;
