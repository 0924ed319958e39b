//! Bounded log ring shared between producers and the aggregator

use super::entry::LogEntry;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Ordered, bounded sequence of log entries.
///
/// Appends never wait on a consumer: when the limit is exceeded the oldest
/// entries are discarded. Every append stores a wake permit that the
/// aggregator consumes.
#[derive(Debug)]
pub struct LogBuffer {
    ring: Mutex<Ring>,
    dropped: AtomicU64,
    wake: Notify,
}

#[derive(Debug)]
struct Ring {
    entries: VecDeque<LogEntry>,
    limit: usize,
}

impl Ring {
    /// Discard from the front until the ring fits, returning the count
    fn trim(&mut self) -> u64 {
        let excess = self.entries.len().saturating_sub(self.limit);
        self.entries.drain(..excess);
        excess as u64
    }
}

impl LogBuffer {
    pub fn new(limit: u32) -> Self {
        Self {
            ring: Mutex::new(Ring {
                entries: VecDeque::new(),
                limit: limit as usize,
            }),
            dropped: AtomicU64::new(0),
            wake: Notify::new(),
        }
    }

    fn ring(&self) -> MutexGuard<'_, Ring> {
        self.ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, entry: LogEntry) {
        let discarded = {
            let mut ring = self.ring();
            ring.entries.push_back(entry);
            ring.trim()
        };

        if discarded > 0 {
            self.dropped.fetch_add(discarded, Ordering::Relaxed);
        }
        self.wake.notify_one();
    }

    /// Remove and return everything buffered, oldest first
    pub fn drain(&self) -> Vec<LogEntry> {
        let mut ring = self.ring();
        ring.entries.drain(..).collect()
    }

    pub fn limit(&self) -> u32 {
        u32::try_from(self.ring().limit).unwrap_or(u32::MAX)
    }

    /// Change capacity; shrinking discards the oldest excess at once
    pub fn set_limit(&self, limit: u32) {
        let discarded = {
            let mut ring = self.ring();
            ring.limit = limit as usize;
            ring.trim()
        };

        if discarded > 0 {
            self.dropped.fetch_add(discarded, Ordering::Relaxed);
        }
    }

    pub fn len(&self) -> usize {
        self.ring().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring().entries.is_empty()
    }

    /// Entries discarded by ring overflow since creation
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Resolves after the next append (or immediately if one is pending)
    pub async fn appended(&self) {
        self.wake.notified().await;
    }
}
