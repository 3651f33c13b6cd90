//! Infrastructure layer: caches, downloads, loading and configuration.

/// Memory and disk image caches.
pub mod cache;
/// Image decoding helpers.
pub mod codec;
/// Library configuration.
pub mod config;
/// Download scheduling and HTTP transport.
pub mod download;
/// Load orchestration.
pub mod loader;

pub use cache::{CacheStats, DiskImageCache, MemoryImageCache, SweepReport, TieredCache};
pub use config::{
    CacheConfig, CliArgs, ConfigStore, DownloaderConfig, ExecutionOrder, LoaderConfig, LogLevel,
    WebImageConfig,
};
pub use download::{
    DownloadCoordinator, DownloadEvent, DownloadHandle, DownloadOptions, DownloadOutcome,
    DownloadPriority, DownloadToken, ReqwestNetworkClient,
};
pub use loader::{FailureRegistry, ImageLoader, LoadHandle, LoadOptions};
