//! Destination address range matching

use ipnet::{IpNet, Ipv4Net, Ipv6Net};
use std::net::IpAddr;

/// Ranges exempt from proxying when LAN bypass is enabled
pub const LAN_BYPASS_RANGES: [&str; 5] = [
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "224.0.0.0/4",
    "169.254.0.0/16",
];

pub fn lan_bypass_ranges() -> Vec<IpNet> {
    LAN_BYPASS_RANGES
        .iter()
        .filter_map(|range| range.parse().ok())
        .collect()
}

/// Matcher for IP addresses against CIDR ranges
#[derive(Debug, Clone, Default)]
pub struct CidrMatcher {
    ipv4_ranges: Vec<Ipv4Net>,
    ipv6_ranges: Vec<Ipv6Net>,
}

impl CidrMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ranges<'a>(ranges: impl IntoIterator<Item = &'a IpNet>) -> Self {
        let mut matcher = Self::new();
        for range in ranges {
            matcher.add(*range);
        }
        matcher
    }

    pub fn add(&mut self, range: IpNet) {
        match range {
            IpNet::V4(net) => self.ipv4_ranges.push(net),
            IpNet::V6(net) => self.ipv6_ranges.push(net),
        }
    }

    /// Check if an IP address matches any range
    pub fn matches(&self, ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(ipv4) => self.ipv4_ranges.iter().any(|net| net.contains(&ipv4)),
            IpAddr::V6(ipv6) => {
                // v4-mapped destinations are checked against the v4 ranges too
                if let Some(ipv4) = ipv6.to_ipv4_mapped() {
                    if self.ipv4_ranges.iter().any(|net| net.contains(&ipv4)) {
                        return true;
                    }
                }
                self.ipv6_ranges.iter().any(|net| net.contains(&ipv6))
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ipv4_ranges.is_empty() && self.ipv6_ranges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_lan_ranges_complete() {
        let ranges = lan_bypass_ranges();
        assert_eq!(ranges.len(), LAN_BYPASS_RANGES.len());
    }

    #[test]
    fn test_lan_matching() {
        let matcher = CidrMatcher::from_ranges(&lan_bypass_ranges());

        let inside = [
            "10.1.2.3",
            "172.31.255.1",
            "192.168.1.100",
            "239.255.255.250",
            "169.254.10.1",
        ];
        for inside in inside {
            let ip: IpAddr = inside.parse().unwrap();
            assert!(matcher.matches(ip), "{inside} should bypass");
        }

        for outside in ["8.8.8.8", "172.32.0.1", "192.169.0.1", "127.0.0.1"] {
            let ip: IpAddr = outside.parse().unwrap();
            assert!(!matcher.matches(ip), "{outside} should not bypass");
        }
    }

    #[test]
    fn test_ipv6_matching() {
        let mut matcher = CidrMatcher::new();
        matcher.add("fd00::/8".parse().unwrap());

        assert!(matcher.matches(IpAddr::V6("fd12::1".parse::<Ipv6Addr>().unwrap())));
        assert!(!matcher.matches(IpAddr::V6(Ipv6Addr::LOCALHOST)));
    }

    #[test]
    fn test_v4_mapped_destination() {
        let matcher = CidrMatcher::from_ranges(&lan_bypass_ranges());
        let mapped = IpAddr::V6(Ipv4Addr::new(192, 168, 0, 1).to_ipv6_mapped());
        assert!(matcher.matches(mapped));
    }

    #[test]
    fn test_empty_matcher() {
        assert!(!CidrMatcher::from_ranges(&lan_bypass_ranges()).is_empty());

        let matcher = CidrMatcher::new();
        assert!(matcher.is_empty());
        assert!(!matcher.matches(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1))));
    }
}
