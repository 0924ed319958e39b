//! Per-process routing policy table

pub mod process;
pub mod table;

pub use process::{parse_cidr, ProcessBinding, ProcessName, ProcessPolicy};
pub use table::RoutingTable;
