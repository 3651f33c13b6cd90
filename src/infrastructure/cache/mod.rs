//! Two-tier image cache.
//!
//! This module provides:
//! - Memory caching with LRU eviction under cost and count budgets
//! - Disk caching with read-only search paths and age/size retention
//! - The tiered facade used by the loader

pub mod disk_cache;
pub mod memory_cache;
pub mod tiered;

pub use disk_cache::{DiskImageCache, RetentionPolicy, SweepReport};
pub use memory_cache::{CacheStats, MemoryImageCache};
pub use tiered::{DiskWrite, TieredCache};
