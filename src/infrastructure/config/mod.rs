//! Library configuration.

pub mod app_config;
#[allow(missing_docs)]
pub mod args;
pub mod storage;

pub use app_config::{
    CacheConfig, DEFAULT_MAX_CACHE_AGE_SECS, DownloaderConfig, ExecutionOrder, LoaderConfig,
    LogLevel, WebImageConfig,
};
pub use args::{CliArgs, Command};
pub use storage::{ConfigError, ConfigStore};
