//! Public types exchanged with download subscribers.

use bytes::Bytes;

use crate::domain::errors::LoadError;

/// Queue priority of a download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DownloadPriority {
    /// Started after every normal and high priority job.
    Low,
    /// Default priority.
    #[default]
    Normal,
    /// Started before every other queued job.
    High,
}

/// Per-fetch options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct DownloadOptions {
    /// Deliver the accumulated bytes after every chunk.
    pub progressive: bool,
    /// Send and store cookies.
    pub handle_cookies: bool,
    /// Accept invalid TLS certificates.
    pub allow_invalid_certificates: bool,
}

/// Terminal result delivered once to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The whole body was received.
    Completed(Bytes),
    /// The transfer failed.
    Failed(LoadError),
    /// The subscriber detached, or the job was cancelled.
    Cancelled,
}

impl DownloadOutcome {
    /// Returns true for [`DownloadOutcome::Completed`].
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Event delivered to one subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    /// Bytes received so far.
    Progress {
        /// Bytes received.
        received: u64,
        /// Announced total, if known.
        expected: Option<u64>,
    },
    /// Everything received so far. Only sent to progressive subscribers.
    Partial(Bytes),
    /// Terminal event; nothing follows it.
    Finished(DownloadOutcome),
}
