//! Library configuration.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::ports::Credentials;

pub(crate) const APP_NAME: &str = "webimage";
pub(crate) const APP_QUALIFIER: &str = "com";
pub(crate) const APP_ORGANIZATION: &str = "linuxmobile";

/// One week.
pub const DEFAULT_MAX_CACHE_AGE_SECS: u64 = 60 * 60 * 24 * 7;

/// One hour.
pub const DEFAULT_MAINTENANCE_INTERVAL_SECS: u64 = 60 * 60;

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Order in which queued downloads of equal priority are started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionOrder {
    /// First in, first out.
    #[default]
    Fifo,
    /// Last in, first out.
    Lifo,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebImageConfig {
    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Downloader configuration.
    #[serde(default)]
    pub downloader: DownloaderConfig,

    /// Loader configuration.
    #[serde(default)]
    pub loader: LoaderConfig,
}

/// Cache configuration.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Sub-directory of the root used by this cache.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Root directory holding namespaces. Defaults to the platform cache dir.
    #[serde(default)]
    pub root_dir: Option<PathBuf>,

    /// Maximum total cost (decoded pixels) of the memory tier. 0 disables the limit.
    #[serde(default)]
    pub max_memory_cost: u64,

    /// Maximum number of entries in the memory tier. 0 disables the limit.
    #[serde(default)]
    pub max_memory_count: usize,

    /// Maximum age of a disk entry in seconds. 0 disables expiry.
    #[serde(default = "default_max_cache_age")]
    pub max_cache_age_seconds: u64,

    /// Maximum total size of the writable disk path in bytes. 0 disables the limit.
    #[serde(default)]
    pub max_cache_size_bytes: u64,

    /// Persist downloaded images to disk.
    #[serde(default = "default_true")]
    pub should_cache_to_disk: bool,

    /// Keep images in the memory tier.
    #[serde(default = "default_true")]
    pub should_cache_in_memory: bool,

    /// Keep a decoded representation next to the encoded bytes.
    #[serde(default = "default_true")]
    pub decode_images: bool,

    /// Tag the cache directory so backup tools skip it.
    #[serde(default = "default_true")]
    pub disable_backup: bool,

    /// Seconds between background retention sweeps. 0 disables them.
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_seconds: u64,
}

impl CacheConfig {
    /// Returns the effective root directory.
    #[must_use]
    pub fn effective_root_dir(&self) -> PathBuf {
        self.root_dir.clone().unwrap_or_else(Self::default_root_dir)
    }

    /// Returns the writable directory for this namespace.
    #[must_use]
    pub fn disk_cache_path(&self) -> PathBuf {
        self.effective_root_dir().join(&self.namespace)
    }

    /// Returns the platform cache directory (~/.cache/webimage/ on Linux).
    #[must_use]
    pub fn default_root_dir() -> PathBuf {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME).map_or_else(
            || std::env::temp_dir().join(APP_NAME).join("cache"),
            |dirs| dirs.cache_dir().to_path_buf(),
        )
    }

    /// Maximum entry age, or `None` when expiry is disabled.
    #[must_use]
    pub const fn max_age(&self) -> Option<Duration> {
        if self.max_cache_age_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.max_cache_age_seconds))
        }
    }

    /// Period of background sweeps, or `None` when they are disabled.
    #[must_use]
    pub const fn maintenance_interval(&self) -> Option<Duration> {
        if self.maintenance_interval_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.maintenance_interval_seconds))
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            root_dir: None,
            max_memory_cost: 0,
            max_memory_count: 0,
            max_cache_age_seconds: DEFAULT_MAX_CACHE_AGE_SECS,
            max_cache_size_bytes: 0,
            should_cache_to_disk: true,
            should_cache_in_memory: true,
            decode_images: true,
            disable_backup: true,
            maintenance_interval_seconds: DEFAULT_MAINTENANCE_INTERVAL_SECS,
        }
    }
}

/// Downloader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloaderConfig {
    /// Maximum number of downloads in flight at once.
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,

    /// Whole-request timeout in seconds.
    #[serde(default = "default_download_timeout")]
    pub download_timeout_seconds: u64,

    /// Start order for queued downloads.
    #[serde(default)]
    pub execution_order: ExecutionOrder,

    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Headers added to every request.
    #[serde(default = "default_headers")]
    pub headers: BTreeMap<String, String>,

    /// Basic-auth user name.
    #[serde(default)]
    pub username: Option<String>,

    /// Basic-auth password.
    #[serde(default)]
    pub password: Option<String>,
}

impl DownloaderConfig {
    /// Download timeout as a duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_seconds)
    }

    /// Configured credentials, if a user name is set.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials> {
        self.username
            .as_ref()
            .map(|user| Credentials::new(user.clone(), self.password.clone()))
    }
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: default_max_concurrent_downloads(),
            download_timeout_seconds: default_download_timeout(),
            execution_order: ExecutionOrder::default(),
            user_agent: default_user_agent(),
            headers: default_headers(),
            username: None,
            password: None,
        }
    }
}

/// Loader configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Longest side, in pixels, images are scaled down to when a request
    /// asks for it.
    #[serde(default = "default_scale_down_dimension")]
    pub scale_down_max_dimension: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            scale_down_max_dimension: default_scale_down_dimension(),
        }
    }
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_max_cache_age() -> u64 {
    DEFAULT_MAX_CACHE_AGE_SECS
}

fn default_maintenance_interval() -> u64 {
    DEFAULT_MAINTENANCE_INTERVAL_SECS
}

fn default_max_concurrent_downloads() -> usize {
    6
}

fn default_download_timeout() -> u64 {
    15
}

fn default_user_agent() -> String {
    format!("{APP_NAME}/{}", env!("CARGO_PKG_VERSION"))
}

fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([("Accept".to_string(), "image/*,*/*;q=0.8".to_string())])
}

fn default_scale_down_dimension() -> u32 {
    2048
}

fn default_true() -> bool {
    true
}
