//! Domain types for cached images and load results.

use std::sync::Arc;

use bytes::Bytes;

use super::{CacheKey, ImageFormat};
use crate::domain::errors::LoadError;

/// Tier an image was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageSource {
    /// Served from the in-memory tier.
    MemoryCache,
    /// Served from the disk tier (writable or read-only path).
    DiskCache,
    /// Freshly downloaded.
    Network,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemoryCache => write!(f, "memory"),
            Self::DiskCache => write!(f, "disk"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// One cached image.
///
/// `data` is the authoritative encoded form written to disk. `decoded` is an
/// optional in-memory-only representation kept to avoid decoding again.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Key the entry is stored under.
    pub key: CacheKey,
    /// Encoded bytes exactly as fetched or stored.
    pub data: Bytes,
    /// Decoded pixels, if decoding is enabled.
    pub decoded: Option<Arc<image::DynamicImage>>,
    /// Encoded format of `data`.
    pub format: ImageFormat,
}

impl CacheEntry {
    /// Creates an entry from encoded bytes without a decoded representation.
    #[must_use]
    pub fn new(key: CacheKey, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let format = ImageFormat::detect(&data);
        Self {
            key,
            data,
            decoded: None,
            format,
        }
    }

    /// Attaches a decoded representation.
    #[must_use]
    pub fn with_decoded(mut self, decoded: Arc<image::DynamicImage>) -> Self {
        self.decoded = Some(decoded);
        self
    }

    /// Size of the encoded bytes.
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Cost of keeping this entry in the memory tier.
    ///
    /// Pixel count of the decoded image, falling back to the encoded size
    /// when nothing is decoded. Never zero.
    #[must_use]
    pub fn cost(&self) -> u64 {
        let cost = self.decoded.as_ref().map_or_else(
            || self.byte_size(),
            |img| u64::from(img.width()) * u64::from(img.height()),
        );
        cost.max(1)
    }

    /// Pixel dimensions of the decoded image, if any.
    #[must_use]
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.decoded.as_ref().map(|img| (img.width(), img.height()))
    }
}

/// A successfully loaded image together with the tier it came from.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// Resource URL the caller asked for.
    pub url: String,
    /// The cached entry.
    pub entry: CacheEntry,
    /// Where the entry was found.
    pub source: ImageSource,
}

/// Terminal result of a load request, delivered exactly once.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// The image is available.
    Success(LoadedImage),
    /// The load failed.
    Failure(LoadError),
    /// The caller cancelled the request. Not an error.
    Cancelled,
}

impl LoadOutcome {
    /// Returns true for [`LoadOutcome::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns true for [`LoadOutcome::Cancelled`].
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns the loaded image if the load succeeded.
    #[must_use]
    pub fn image(&self) -> Option<&LoadedImage> {
        match self {
            Self::Success(img) => Some(img),
            _ => None,
        }
    }

    /// Returns the error if the load failed.
    #[must_use]
    pub fn error(&self) -> Option<&LoadError> {
        match self {
            Self::Failure(err) => Some(err),
            _ => None,
        }
    }
}

/// Event delivered on a load handle's stream.
#[derive(Debug, Clone)]
pub enum LoadEvent {
    /// Bytes received so far and the expected total, if known.
    Progress {
        /// Bytes received.
        received: u64,
        /// Expected total, from the response length.
        expected: Option<u64>,
    },
    /// Partial data for progressive display. Never terminal.
    Partial {
        /// Everything received so far.
        data: Bytes,
        /// `data` decoded, when the received prefix already decodes.
        image: Option<Arc<image::DynamicImage>>,
    },
    /// Cached image served before a refresh download. Never terminal.
    Cached(LoadedImage),
    /// The single terminal event.
    Finished(LoadOutcome),
}

impl LoadEvent {
    /// Returns true for the terminal event.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished(_))
    }
}
