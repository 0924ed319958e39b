//! Upstream SOCKS5 proxy registry

pub mod endpoint;
pub mod registry;

pub use endpoint::{EndpointHost, ProxyEndpoint};
pub use registry::{Protocol, ProxyConfig, ProxyHandle, ProxyRegistry, SupportedProtocols};
