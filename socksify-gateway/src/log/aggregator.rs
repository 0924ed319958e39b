//! Background batching of log entries to an external subscriber
//!
//! One dedicated thread per running session drives a current-thread tokio
//! runtime. It wakes when an entry is appended or when the polling interval
//! elapses, drains the buffer and hands the batch to the subscriber. Shutdown
//! performs one last drain so nothing buffered before `stop()` is lost.

use super::buffer::LogBuffer;
use super::entry::LogEntry;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Receiver of log batches.
///
/// Called on the aggregator thread, never on the caller's thread. Calling
/// back into the `Gateway` lifecycle from here is not supported.
pub trait LogSubscriber: Send + Sync {
    fn on_batch(&self, batch: Vec<LogEntry>);
}

impl<F> LogSubscriber for F
where
    F: Fn(Vec<LogEntry>) + Send + Sync,
{
    fn on_batch(&self, batch: Vec<LogEntry>) {
        self(batch)
    }
}

/// The currently registered subscriber, if any
#[derive(Default)]
pub struct SubscriberSlot {
    inner: RwLock<Option<Arc<dyn LogSubscriber>>>,
}

impl SubscriberSlot {
    pub fn set(&self, subscriber: Arc<dyn LogSubscriber>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(subscriber);
    }

    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn get(&self) -> Option<Arc<dyn LogSubscriber>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Everything the worker reads on each wake
#[derive(Clone)]
pub struct LogFeed {
    pub buffer: Arc<LogBuffer>,
    pub subscriber: Arc<SubscriberSlot>,
    /// Polling interval in milliseconds, re-read every cycle
    pub interval_ms: Arc<AtomicU64>,
}

impl LogFeed {
    fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Relaxed).max(1))
    }

    /// Drain and deliver one batch. Without a subscriber entries stay
    /// buffered for on-demand reads.
    fn deliver(&self) -> usize {
        let Some(subscriber) = self.subscriber.get() else {
            return 0;
        };

        let batch = self.buffer.drain();
        if batch.is_empty() {
            return 0;
        }

        let count = batch.len();
        if panic::catch_unwind(AssertUnwindSafe(|| subscriber.on_batch(batch))).is_err() {
            warn!(count, "Log subscriber panicked; batch discarded");
        }
        count
    }
}

/// Handle to the running aggregator thread
pub struct LogAggregator {
    shutdown_tx: watch::Sender<bool>,
    worker: Option<JoinHandle<()>>,
}

impl LogAggregator {
    pub fn spawn(feed: LogFeed) -> io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_time().build()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = thread::Builder::new()
            .name("socksify-log".to_string())
            .spawn(move || run(runtime, feed, shutdown_rx))?;

        debug!("Log aggregator started");
        Ok(Self {
            shutdown_tx,
            worker: Some(worker),
        })
    }

    /// Request exit and wait for the final flush
    pub fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        let _ = self.shutdown_tx.send(true);

        // A subscriber that stops the gateway from its own callback would
        // otherwise join itself.
        if worker.thread().id() == thread::current().id() {
            return;
        }

        if worker.join().is_err() {
            warn!("Log aggregator thread panicked");
        }
    }
}

impl Drop for LogAggregator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(runtime: Runtime, feed: LogFeed, mut shutdown_rx: watch::Receiver<bool>) {
    runtime.block_on(async move {
        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = feed.buffer.appended() => {}
                _ = tokio::time::sleep(feed.interval()) => {}
            }

            feed.deliver();
        }

        let flushed = feed.deliver();
        debug!(flushed, "Log aggregator stopped");
    });
}
