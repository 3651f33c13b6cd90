mod hooks_port;
mod network_port;

pub use hooks_port::{CacheKeyFilter, DefaultHooks, LoaderHooks, RemovePattern, StripQuery};
pub use network_port::{
    ByteStream, Credentials, Headers, HeadersFilter, NetworkClient, NetworkRequest,
    NetworkResponse,
};

#[cfg(test)]
pub mod mocks {
    pub use super::hooks_port::MockLoaderHooks;
    pub use super::network_port::mock::{MockNetworkClient, MockResponse};
}
