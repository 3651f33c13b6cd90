//! Domain error types.

mod cache_error;
mod load_error;

pub use cache_error::{CacheError, CacheResult};
pub use load_error::{LoadError, NetworkErrorKind};
