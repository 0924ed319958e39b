//! Per-process routing policy

use crate::error::ValidationError;
use crate::proxy::ProxyHandle;
use ipnet::IpNet;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Normalized process name: file name only, lowercase
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessName(String);

impl ProcessName {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let file_name = raw
            .trim()
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .trim();

        if file_name.is_empty() || file_name.contains('\0') {
            return Err(ValidationError::InvalidProcessName {
                name: raw.to_string(),
            });
        }

        Ok(Self(file_name.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ProcessName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse a destination CIDR, normalized to its network address
pub fn parse_cidr(raw: &str) -> Result<IpNet, ValidationError> {
    raw.trim()
        .parse::<IpNet>()
        .map(|net| net.trunc())
        .map_err(|_| ValidationError::InvalidCidr {
            cidr: raw.to_string(),
        })
}

/// What a process's traffic is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessBinding {
    Proxy(ProxyHandle),
    /// Always connects directly, whatever the CIDR lists say
    Excluded,
}

/// The single policy entry of one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessPolicy {
    pub binding: ProcessBinding,
    /// When non-empty, only these destinations go through the proxy
    pub include_cidrs: BTreeSet<IpNet>,
}

impl ProcessPolicy {
    pub fn new(binding: ProcessBinding) -> Self {
        Self {
            binding,
            include_cidrs: BTreeSet::new(),
        }
    }

    pub fn proxy(&self) -> Option<ProxyHandle> {
        match self.binding {
            ProcessBinding::Proxy(handle) => Some(handle),
            ProcessBinding::Excluded => None,
        }
    }

    pub fn is_excluded(&self) -> bool {
        self.binding == ProcessBinding::Excluded
    }
}
