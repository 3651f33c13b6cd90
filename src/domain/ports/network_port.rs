//! Port for the transport used by the download coordinator.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;

use crate::domain::errors::LoadError;

/// Outgoing header set, keyed by header name.
pub type Headers = BTreeMap<String, String>;

/// Rewrites the header set of one outgoing request.
///
/// Called once per request with the resource URL and the default headers;
/// the returned map is sent as-is.
pub type HeadersFilter = Arc<dyn Fn(&str, Headers) -> Headers + Send + Sync>;

/// Body chunks of a response.
pub type ByteStream = BoxStream<'static, Result<Bytes, LoadError>>;

/// Basic authentication credentials.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password, if any.
    pub password: Option<String>,
}

impl Credentials {
    /// Creates credentials from a user name and optional password.
    #[must_use]
    pub fn new(username: impl Into<String>, password: Option<String>) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// One request handed to a [`NetworkClient`].
#[derive(Debug, Clone)]
pub struct NetworkRequest {
    /// Resource URL.
    pub url: String,
    /// Headers after the headers filter ran.
    pub headers: Headers,
    /// Basic-auth credentials, passed through unmodified.
    pub credentials: Option<Credentials>,
    /// Whole-request timeout.
    pub timeout: Duration,
    /// Send and store cookies for this request.
    pub handle_cookies: bool,
    /// Accept invalid TLS certificates.
    pub allow_invalid_certificates: bool,
}

/// A response whose body is still streaming.
pub struct NetworkResponse {
    /// Total body length announced by the server.
    pub expected_length: Option<u64>,
    /// Body chunks in order. A chunk error ends the transfer.
    pub body: ByteStream,
}

impl std::fmt::Debug for NetworkResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkResponse")
            .field("expected_length", &self.expected_length)
            .finish_non_exhaustive()
    }
}

/// Transport abstraction injected into the download coordinator.
/// Implementations must be thread-safe.
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Starts a request and returns once response headers are available.
    ///
    /// A non-success HTTP status must be reported as
    /// [`LoadError::Network`] with [`NetworkErrorKind::Status`](crate::domain::errors::NetworkErrorKind::Status).
    async fn request(&self, request: NetworkRequest) -> Result<NetworkResponse, LoadError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;

    use futures_util::StreamExt;
    use parking_lot::Mutex;
    use tokio::sync::Semaphore;

    /// Scripted response for one URL.
    #[derive(Debug, Clone)]
    pub enum MockResponse {
        /// Successful body delivered in these chunks.
        Body(Vec<Bytes>),
        /// Delivers these chunks, then never finishes the body.
        Stalled(Vec<Bytes>),
        /// Fails before any byte is delivered.
        Error(LoadError),
        /// Never answers.
        Hang,
    }

    /// Scriptable in-memory transport for testing.
    pub struct MockNetworkClient {
        responses: Mutex<HashMap<String, MockResponse>>,
        requests: Mutex<Vec<NetworkRequest>>,
        gate: Option<Arc<Semaphore>>,
    }

    impl MockNetworkClient {
        /// Creates a client that answers immediately.
        pub fn new() -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
                requests: Mutex::new(Vec::new()),
                gate: None,
            }
        }

        /// Creates a client whose responses wait for a permit on the returned
        /// semaphore. Each permit releases exactly one request.
        pub fn gated() -> (Self, Arc<Semaphore>) {
            let gate = Arc::new(Semaphore::new(0));
            let client = Self {
                gate: Some(gate.clone()),
                ..Self::new()
            };
            (client, gate)
        }

        /// Answers `url` with `data` in a single chunk.
        pub fn respond(&self, url: &str, data: impl Into<Bytes>) {
            self.respond_chunked(url, vec![data.into()]);
        }

        /// Answers `url` with the given chunks.
        pub fn respond_chunked(&self, url: &str, chunks: Vec<Bytes>) {
            self.responses
                .lock()
                .insert(url.to_string(), MockResponse::Body(chunks));
        }

        /// Answers `url` with `chunks` and then stalls before the body ends.
        pub fn respond_stalled(&self, url: &str, chunks: Vec<Bytes>) {
            self.responses
                .lock()
                .insert(url.to_string(), MockResponse::Stalled(chunks));
        }

        /// Fails `url` with `error`.
        pub fn fail(&self, url: &str, error: LoadError) {
            self.responses
                .lock()
                .insert(url.to_string(), MockResponse::Error(error));
        }

        /// Makes `url` hang forever.
        pub fn hang(&self, url: &str) {
            self.responses
                .lock()
                .insert(url.to_string(), MockResponse::Hang);
        }

        /// Number of requests issued for `url`.
        pub fn request_count(&self, url: &str) -> usize {
            self.requests.lock().iter().filter(|r| r.url == url).count()
        }

        /// All requests issued so far, in order.
        pub fn requests(&self) -> Vec<NetworkRequest> {
            self.requests.lock().clone()
        }
    }

    impl Default for MockNetworkClient {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl NetworkClient for MockNetworkClient {
        async fn request(&self, request: NetworkRequest) -> Result<NetworkResponse, LoadError> {
            let url = request.url.clone();
            self.requests.lock().push(request);

            if let Some(gate) = &self.gate {
                let permit = gate
                    .acquire()
                    .await
                    .map_err(|e| LoadError::network(e.to_string()))?;
                permit.forget();
            }

            let response = self.responses.lock().get(&url).cloned();
            match response {
                Some(MockResponse::Body(chunks)) => {
                    let total = chunks.iter().map(|c| c.len() as u64).sum();
                    Ok(NetworkResponse {
                        expected_length: Some(total),
                        body: futures_util::stream::iter(chunks.into_iter().map(Ok)).boxed(),
                    })
                }
                Some(MockResponse::Stalled(chunks)) => Ok(NetworkResponse {
                    expected_length: None,
                    body: futures_util::stream::iter(chunks.into_iter().map(Ok))
                        .chain(futures_util::stream::pending())
                        .boxed(),
                }),
                Some(MockResponse::Error(err)) => Err(err),
                Some(MockResponse::Hang) => {
                    futures_util::future::pending::<()>().await;
                    Err(LoadError::network("unreachable"))
                }
                None => Err(LoadError::status(404, format!("HTTP 404 Not Found: {url}"))),
            }
        }
    }
}
