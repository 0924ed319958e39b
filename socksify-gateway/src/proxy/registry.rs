//! Registered upstream SOCKS5 proxies

use super::endpoint::ProxyEndpoint;
use crate::error::{Result, ValidationError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of a registered proxy. Zero is the null handle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProxyHandle(u64);

impl ProxyHandle {
    pub const NULL: ProxyHandle = ProxyHandle(0);

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ProxyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Transport of a single flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

/// Transports a proxy is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SupportedProtocols {
    Tcp,
    Udp,
    Both,
}

impl SupportedProtocols {
    pub fn supports(self, protocol: Protocol) -> bool {
        matches!(
            (self, protocol),
            (SupportedProtocols::Both, _)
                | (SupportedProtocols::Tcp, Protocol::Tcp)
                | (SupportedProtocols::Udp, Protocol::Udp)
        )
    }
}

/// Immutable description of one upstream proxy
#[derive(Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    pub endpoint: ProxyEndpoint,
    pub login: Option<String>,
    pub password: Option<String>,
    pub protocols: SupportedProtocols,
    pub autostart: bool,
}

impl ProxyConfig {
    /// Validate raw inputs. Empty credential strings count as absent; a
    /// password without a login is rejected (username/password auth needs
    /// both).
    pub fn new(
        endpoint: &str,
        login: Option<&str>,
        password: Option<&str>,
        protocols: SupportedProtocols,
        autostart: bool,
    ) -> Result<Self> {
        let endpoint: ProxyEndpoint = endpoint.parse()?;
        let login = login.filter(|s| !s.is_empty()).map(str::to_string);
        let password = password.filter(|s| !s.is_empty()).map(str::to_string);

        if login.is_none() && password.is_some() {
            return Err(ValidationError::InvalidCredentials {
                reason: "password given without login".to_string(),
            }
            .into());
        }

        Ok(Self {
            endpoint,
            login,
            password,
            protocols,
            autostart,
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.login.is_some()
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("endpoint", &self.endpoint)
            .field("login", &self.login)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("protocols", &self.protocols)
            .field("autostart", &self.autostart)
            .finish()
    }
}

/// Append-mostly table of proxies in registration order.
///
/// Handles come from a counter that only moves forward, so a removed
/// handle is never issued again.
#[derive(Debug, Default)]
pub struct ProxyRegistry {
    proxies: IndexMap<ProxyHandle, ProxyConfig>,
    last_issued: u64,
}

impl ProxyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `config` under a fresh handle; `NULL` once the counter is spent
    pub fn register(&mut self, config: ProxyConfig) -> ProxyHandle {
        let Some(next) = self.last_issued.checked_add(1) else {
            return ProxyHandle::NULL;
        };

        self.last_issued = next;
        let handle = ProxyHandle(next);
        self.proxies.insert(handle, config);
        handle
    }

    pub fn lookup(&self, handle: ProxyHandle) -> Option<&ProxyConfig> {
        self.proxies.get(&handle)
    }

    pub fn contains(&self, handle: ProxyHandle) -> bool {
        self.proxies.contains_key(&handle)
    }

    /// Caller must have checked that no association still refers to `handle`
    pub fn remove(&mut self, handle: ProxyHandle) -> Option<ProxyConfig> {
        self.proxies.shift_remove(&handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProxyHandle, &ProxyConfig)> {
        self.proxies.iter().map(|(handle, config)| (*handle, config))
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: &str) -> ProxyConfig {
        ProxyConfig::new(endpoint, None, None, SupportedProtocols::Tcp, false).unwrap()
    }

    #[test]
    fn test_handles_are_distinct_and_non_null() {
        let mut registry = ProxyRegistry::new();
        let handles: Vec<ProxyHandle> = (0..50)
            .map(|i| registry.register(config(&format!("10.0.0.{}:1080", i % 250 + 1))))
            .collect();

        assert!(handles.iter().all(|h| !h.is_null()));
        let mut unique = handles.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), handles.len());
    }

    #[test]
    fn test_handles_not_reused_after_remove() {
        let mut registry = ProxyRegistry::new();
        let first = registry.register(config("10.0.0.1:1080"));
        assert!(registry.remove(first).is_some());

        let second = registry.register(config("10.0.0.1:1080"));
        assert_ne!(first, second);
        assert!(registry.lookup(first).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_iteration_follows_registration_order() {
        let mut registry = ProxyRegistry::new();
        let a = registry.register(config("10.0.0.1:1080"));
        let b = registry.register(config("10.0.0.2:1080"));
        let c = registry.register(config("10.0.0.3:1080"));
        registry.remove(b);

        let order: Vec<ProxyHandle> = registry.iter().map(|(h, _)| h).collect();
        assert_eq!(order, vec![a, c]);
    }

    #[test]
    fn test_credentials_normalized() {
        let both = SupportedProtocols::Both;
        let cfg = ProxyConfig::new("proxy.local:1080", Some(""), Some(""), both, true).unwrap();
        assert!(!cfg.has_credentials());

        let cfg =
            ProxyConfig::new("proxy.local:1080", Some("user"), Some("secret"), both, true).unwrap();
        assert!(cfg.has_credentials());
        assert!(!format!("{cfg:?}").contains("secret"));

        let orphan = ProxyConfig::new("proxy.local:1080", None, Some("secret"), both, false);
        assert!(orphan.is_err());
    }

    #[test]
    fn test_protocol_support() {
        assert!(SupportedProtocols::Both.supports(Protocol::Udp));
        assert!(SupportedProtocols::Tcp.supports(Protocol::Tcp));
        assert!(!SupportedProtocols::Tcp.supports(Protocol::Udp));
        assert!(!SupportedProtocols::Udp.supports(Protocol::Tcp));
    }
}
