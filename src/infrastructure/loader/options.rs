//! Per-request load options.

use crate::infrastructure::download::{DownloadOptions, DownloadPriority};

/// Options for one [`ImageLoader::load`](super::ImageLoader::load) call.
///
/// The default loads memory, then disk, then network, and caches the result
/// in both tiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct LoadOptions {
    /// Skip both cache tiers and go straight to the network.
    pub bypass_cache: bool,
    /// Deliver a cached hit, then download again and deliver the fresh copy.
    pub refresh_if_stale: bool,
    /// Ignore the failure registry and do not add to it.
    pub retry_failed: bool,
    /// Cache the download in memory only.
    pub memory_only: bool,
    /// Download queue priority.
    pub priority: DownloadPriority,
    /// Emit partial data while downloading.
    pub progressive: bool,
    /// Send and store cookies.
    pub handle_cookies: bool,
    /// Accept invalid TLS certificates.
    pub allow_invalid_certificates: bool,
    /// Shrink images larger than the configured dimension.
    pub scale_down_large_images: bool,
}

impl LoadOptions {
    /// Options forwarded to the download coordinator.
    #[must_use]
    pub const fn download_options(&self) -> DownloadOptions {
        DownloadOptions {
            progressive: self.progressive,
            handle_cookies: self.handle_cookies,
            allow_invalid_certificates: self.allow_invalid_certificates,
        }
    }
}
