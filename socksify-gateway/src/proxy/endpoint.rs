//! Upstream proxy endpoint parsing

use crate::error::ValidationError;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EndpointHost {
    Ip(IpAddr),
    Domain(String),
}

/// `host:port` of an upstream SOCKS5 server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyEndpoint {
    host: EndpointHost,
    port: u16,
}

impl ProxyEndpoint {
    pub fn host(&self) -> &EndpointHost {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl FromStr for ProxyEndpoint {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidEndpoint {
            endpoint: s.to_string(),
        };

        let trimmed = s.trim();

        // Literal IPv4 or bracketed IPv6
        if let Ok(addr) = trimmed.parse::<SocketAddr>() {
            if addr.port() == 0 {
                return Err(invalid());
            }
            return Ok(Self {
                host: EndpointHost::Ip(addr.ip()),
                port: addr.port(),
            });
        }

        let (host, port) = trimmed.rsplit_once(':').ok_or_else(invalid)?;
        let port: u16 = port.parse().map_err(|_| invalid())?;
        if port == 0 || !is_valid_hostname(host) {
            return Err(invalid());
        }

        Ok(Self {
            host: EndpointHost::Domain(host.to_ascii_lowercase()),
            port,
        })
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            EndpointHost::Ip(IpAddr::V6(ip)) => write!(f, "[{}]:{}", ip, self.port),
            EndpointHost::Ip(ip) => write!(f, "{}:{}", ip, self.port),
            EndpointHost::Domain(name) => write!(f, "{}:{}", name, self.port),
        }
    }
}

/// RFC 1123 host name. All-numeric names are rejected so that a mistyped
/// IPv4 literal such as `300.1.1.1` is not taken for a host name.
fn is_valid_hostname(host: &str) -> bool {
    if host.is_empty() || host.len() > 253 {
        return false;
    }

    let labels_ok = host.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });

    labels_ok && !host.split('.').all(|label| label.chars().all(|c| c.is_ascii_digit()))
}
