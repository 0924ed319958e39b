//! Routing decision for a single flow

use super::matcher::CidrMatcher;
use crate::proxy::{Protocol, ProxyHandle, SupportedProtocols};
use crate::routing::ProcessPolicy;
use ipnet::IpNet;
use std::net::IpAddr;

/// Where a flow goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Direct,
    Proxy(ProxyHandle),
}

/// Evaluates whether a flow of a process should be proxied
#[derive(Debug, Clone, Default)]
pub struct RoutePolicy {
    bypass: CidrMatcher,
}

impl RoutePolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the set of always-direct destination ranges
    pub fn set_bypass(&mut self, ranges: &[IpNet]) {
        self.bypass = CidrMatcher::from_ranges(ranges);
    }

    /// Decide the route of one flow.
    ///
    /// `proxy_protocols` are the transports of the proxy the process is
    /// bound to, `None` when that proxy is unknown to the caller.
    pub fn evaluate(
        &self,
        process: Option<&ProcessPolicy>,
        proxy_protocols: Option<SupportedProtocols>,
        destination: IpAddr,
        protocol: Protocol,
    ) -> Route {
        // Unassociated and excluded processes are never proxied
        let Some(handle) = process.and_then(ProcessPolicy::proxy) else {
            return Route::Direct;
        };

        if self.bypass.matches(destination) {
            return Route::Direct;
        }

        let includes = process.map(|p| &p.include_cidrs);
        if let Some(includes) = includes.filter(|set| !set.is_empty()) {
            if !includes.iter().any(|net| net.contains(&destination)) {
                return Route::Direct;
            }
        }

        match proxy_protocols {
            Some(protocols) if protocols.supports(protocol) => Route::Proxy(handle),
            _ => Route::Direct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::matcher::lan_bypass_ranges;
    use crate::routing::{parse_cidr, ProcessBinding};

    const BOTH: Option<SupportedProtocols> = Some(SupportedProtocols::Both);

    fn ip(raw: &str) -> IpAddr {
        raw.parse().unwrap()
    }

    fn bound(handle: u64) -> ProcessPolicy {
        ProcessPolicy::new(ProcessBinding::Proxy(ProxyHandle::from_raw(handle)))
    }

    #[test]
    fn test_unassociated_is_direct() {
        let policy = RoutePolicy::new();
        let route = policy.evaluate(None, BOTH, ip("8.8.8.8"), Protocol::Tcp);
        assert_eq!(route, Route::Direct);
    }

    #[test]
    fn test_bound_process_is_proxied() {
        let policy = RoutePolicy::new();
        let process = bound(1);
        let tcp_only = Some(SupportedProtocols::Tcp);
        let route = policy.evaluate(Some(&process), tcp_only, ip("8.8.8.8"), Protocol::Tcp);
        assert_eq!(route, Route::Proxy(ProxyHandle::from_raw(1)));
    }

    #[test]
    fn test_excluded_ignores_cidrs() {
        let policy = RoutePolicy::new();
        let mut process = ProcessPolicy::new(ProcessBinding::Excluded);
        process.include_cidrs.insert(parse_cidr("8.8.8.0/24").unwrap());

        let route = policy.evaluate(Some(&process), BOTH, ip("8.8.8.8"), Protocol::Tcp);
        assert_eq!(route, Route::Direct);
    }

    #[test]
    fn test_lan_bypass() {
        let mut policy = RoutePolicy::new();
        let process = bound(1);
        assert_eq!(
            policy.evaluate(Some(&process), BOTH, ip("192.168.1.1"), Protocol::Tcp),
            Route::Proxy(ProxyHandle::from_raw(1))
        );

        policy.set_bypass(&lan_bypass_ranges());
        assert_eq!(
            policy.evaluate(Some(&process), BOTH, ip("192.168.1.1"), Protocol::Tcp),
            Route::Direct
        );
        assert_eq!(
            policy.evaluate(Some(&process), BOTH, ip("8.8.8.8"), Protocol::Tcp),
            Route::Proxy(ProxyHandle::from_raw(1))
        );
    }

    #[test]
    fn test_include_list_restricts_proxying() {
        let policy = RoutePolicy::new();
        let mut process = bound(4);
        process.include_cidrs.insert(parse_cidr("93.184.0.0/16").unwrap());

        assert_eq!(
            policy.evaluate(Some(&process), BOTH, ip("93.184.216.34"), Protocol::Tcp),
            Route::Proxy(ProxyHandle::from_raw(4))
        );
        assert_eq!(
            policy.evaluate(Some(&process), BOTH, ip("1.1.1.1"), Protocol::Tcp),
            Route::Direct
        );
    }

    #[test]
    fn test_protocol_mismatch_is_direct() {
        let policy = RoutePolicy::new();
        let process = bound(2);
        let tcp_only = Some(SupportedProtocols::Tcp);
        assert_eq!(
            policy.evaluate(Some(&process), tcp_only, ip("8.8.8.8"), Protocol::Udp),
            Route::Direct
        );
        assert_eq!(
            policy.evaluate(Some(&process), None, ip("8.8.8.8"), Protocol::Tcp),
            Route::Direct
        );
    }
}
