//! Network side: job scheduling and the default HTTP transport.

pub mod coordinator;
pub mod http_client;
pub mod job;
pub mod queue;

pub use coordinator::{DownloadCoordinator, DownloadHandle, DownloadToken};
pub use http_client::ReqwestNetworkClient;
pub use job::{DownloadEvent, DownloadOptions, DownloadOutcome, DownloadPriority};
pub use queue::JobQueue;
