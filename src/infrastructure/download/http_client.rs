//! Default [`NetworkClient`] backed by `reqwest`.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};

use crate::domain::errors::LoadError;
use crate::domain::ports::{Headers, NetworkClient, NetworkRequest, NetworkResponse};

/// Streaming HTTP client.
///
/// Cookie handling and certificate validation are client-level settings in
/// `reqwest`, so one client is kept per combination.
#[derive(Debug, Clone)]
pub struct ReqwestNetworkClient {
    clients: [Client; 4],
}

impl ReqwestNetworkClient {
    /// Builds the underlying clients.
    ///
    /// # Errors
    /// Returns error if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, LoadError> {
        let build = |cookies: bool, insecure: bool| {
            Client::builder()
                .cookie_store(cookies)
                .danger_accept_invalid_certs(insecure)
                .build()
                .map_err(|e| LoadError::network(format!("Failed to create HTTP client: {e}")))
        };
        Ok(Self {
            clients: [
                build(false, false)?,
                build(true, false)?,
                build(false, true)?,
                build(true, true)?,
            ],
        })
    }

    fn client_for(&self, request: &NetworkRequest) -> &Client {
        let index = usize::from(request.handle_cookies) + 2 * usize::from(request.allow_invalid_certificates);
        &self.clients[index]
    }
}

fn header_map(headers: &Headers) -> HeaderMap {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => warn!(header = %name, "Skipping invalid request header"),
        }
    }
    map
}

fn map_reqwest_error(e: &reqwest::Error) -> LoadError {
    if e.is_timeout() {
        LoadError::timeout(e.to_string())
    } else if e.is_builder() {
        LoadError::InvalidUrl
    } else {
        LoadError::network(e.to_string())
    }
}

#[async_trait]
impl NetworkClient for ReqwestNetworkClient {
    async fn request(&self, request: NetworkRequest) -> Result<NetworkResponse, LoadError> {
        debug!(url = %request.url, "Fetching image");

        let mut builder = self
            .client_for(&request)
            .get(&request.url)
            .headers(header_map(&request.headers))
            .timeout(request.timeout);
        if let Some(credentials) = &request.credentials {
            builder = builder.basic_auth(&credentials.username, credentials.password.as_ref());
        }

        let response = builder.send().await.map_err(|e| map_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LoadError::status(
                status.as_u16(),
                format!(
                    "HTTP {} {}: {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown"),
                    request.url
                ),
            ));
        }

        let expected_length = response.content_length();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| map_reqwest_error(&e)))
            .boxed();
        Ok(NetworkResponse {
            expected_length,
            body,
        })
    }
}
