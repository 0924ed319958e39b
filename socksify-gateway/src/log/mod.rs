//! Gateway activity log: entries, the bounded ring, and batch delivery

pub mod aggregator;
pub mod buffer;
pub mod entry;

pub use aggregator::{LogAggregator, LogFeed, LogSubscriber, SubscriberSlot};
pub use buffer::LogBuffer;
pub use entry::{GatewayEvent, LogEntry, LogPayload};
