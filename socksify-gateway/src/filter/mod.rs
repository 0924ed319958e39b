//! Destination filtering logic

pub mod matcher;
pub mod policy;

pub use matcher::{lan_bypass_ranges, CidrMatcher, LAN_BYPASS_RANGES};
pub use policy::{Route, RoutePolicy};
