//! Load orchestration: cache lookup, failure tracking, download and hooks.

mod failure_registry;
mod image_loader;
mod options;

pub use failure_registry::FailureRegistry;
pub use image_loader::{ImageLoader, ImageLoaderBuilder, LoadHandle, SetupError};
pub use options::LoadOptions;
