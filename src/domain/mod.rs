//! Domain layer with core entities, errors and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{
    CacheEntry, CacheKey, ImageFormat, ImageSource, LoadEvent, LoadOutcome, LoadedImage,
};
pub use errors::{CacheError, LoadError, NetworkErrorKind};
pub use ports::{CacheKeyFilter, LoaderHooks, NetworkClient};
