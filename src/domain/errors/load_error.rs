//! Errors surfaced to load and download subscribers.

use thiserror::Error;

/// Classification of a network failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// Connection, DNS, TLS or body read failure.
    Transport,
    /// The request did not finish within the download timeout.
    Timeout,
    /// The server answered with a non-success status.
    Status(u16),
}

/// Error variants a load or download can finish with.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum LoadError {
    #[error("network error: {message}")]
    Network {
        kind: NetworkErrorKind,
        message: String,
    },

    #[error("invalid image data: {message}")]
    InvalidData { message: String },

    #[error("resource previously failed and retry was not requested: {url}")]
    Blacklisted { url: String },

    #[error("invalid resource URL")]
    InvalidUrl,

    #[error("download declined for {url}")]
    DownloadDeclined { url: String },
}

impl LoadError {
    /// Creates a transport error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            kind: NetworkErrorKind::Transport,
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Network {
            kind: NetworkErrorKind::Timeout,
            message: message.into(),
        }
    }

    /// Creates an HTTP status error.
    #[must_use]
    pub fn status(code: u16, message: impl Into<String>) -> Self {
        Self::Network {
            kind: NetworkErrorKind::Status(code),
            message: message.into(),
        }
    }

    /// Creates an invalid data error.
    #[must_use]
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Returns true if retrying the same request may succeed.
    ///
    /// Transport failures, timeouts, 408, 429 and 5xx are transient. Other
    /// statuses and undecodable data are permanent.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network { kind, .. } => match kind {
                NetworkErrorKind::Transport | NetworkErrorKind::Timeout => true,
                NetworkErrorKind::Status(code) => *code == 408 || *code == 429 || *code >= 500,
            },
            Self::InvalidData { .. }
            | Self::Blacklisted { .. }
            | Self::InvalidUrl
            | Self::DownloadDeclined { .. } => false,
        }
    }

    /// Returns true if a failure of this kind should put the URL in the
    /// failure registry.
    #[must_use]
    pub const fn should_blacklist(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::InvalidData { .. }) && !self.is_retryable()
    }
}
