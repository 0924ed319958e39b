//! Process routing table

use super::process::{ProcessBinding, ProcessName, ProcessPolicy};
use crate::error::{GatewayError, Result};
use crate::proxy::ProxyHandle;
use indexmap::IndexMap;
use ipnet::IpNet;

/// One policy entry per normalized process name, in insertion order.
///
/// Binding, exclusion and destination filters are attributes of that single
/// entry; rebinding or excluding keeps the include list.
#[derive(Debug, Default)]
pub struct RoutingTable {
    entries: IndexMap<ProcessName, ProcessPolicy>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name` to `proxy`, replacing any earlier binding or exclusion
    pub fn bind(&mut self, name: &ProcessName, proxy: ProxyHandle) {
        self.upsert(name, ProcessBinding::Proxy(proxy));
    }

    /// Mark `name` as always-direct, superseding any proxy binding
    pub fn exclude(&mut self, name: &ProcessName) {
        self.upsert(name, ProcessBinding::Excluded);
    }

    fn upsert(&mut self, name: &ProcessName, binding: ProcessBinding) {
        self.entries
            .entry(name.clone())
            .and_modify(|policy| policy.binding = binding)
            .or_insert_with(|| ProcessPolicy::new(binding));
    }

    /// Whether `cidr` is already in the include list of `name`.
    /// Fails when `name` has no entry.
    pub fn has_cidr(&self, name: &ProcessName, cidr: &IpNet) -> Result<bool> {
        self.entries
            .get(name)
            .map(|policy| policy.include_cidrs.contains(cidr))
            .ok_or_else(|| GatewayError::NoAssociation {
                process: name.to_string(),
            })
    }

    /// Returns false if `cidr` was already present
    pub fn include_cidr(&mut self, name: &ProcessName, cidr: IpNet) -> Result<bool> {
        let policy = self.entry_mut(name)?;
        Ok(policy.include_cidrs.insert(cidr))
    }

    /// Returns false if `cidr` was not present
    pub fn remove_cidr(&mut self, name: &ProcessName, cidr: &IpNet) -> Result<bool> {
        let policy = self.entry_mut(name)?;
        Ok(policy.include_cidrs.remove(cidr))
    }

    fn entry_mut(&mut self, name: &ProcessName) -> Result<&mut ProcessPolicy> {
        self.entries
            .get_mut(name)
            .ok_or_else(|| GatewayError::NoAssociation {
                process: name.to_string(),
            })
    }

    pub fn get(&self, name: &ProcessName) -> Option<&ProcessPolicy> {
        self.entries.get(name)
    }

    /// First process still bound to `proxy`, if any
    pub fn bound_to(&self, proxy: ProxyHandle) -> Option<&ProcessName> {
        self.entries
            .iter()
            .find(|(_, policy)| policy.proxy() == Some(proxy))
            .map(|(name, _)| name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProcessName, &ProcessPolicy)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
