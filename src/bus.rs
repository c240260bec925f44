//! Fan-in event bus merging every watcher's transitions into one stream.
//!
//! The bus is an unbounded multi-producer single-consumer FIFO. Publishing
//! never waits on the consumer, so a slow dispatcher can never stall a
//! watcher. Ordering is per producer: events from one watcher come out in the
//! order that watcher published them; across watchers the order is arrival
//! order.

use crate::entry::TransitionEvent;
use crate::error::{MonitorError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

/// Create a new bus, returning the producer and consumer halves.
///
/// # Examples
///
/// ```rust
/// use camhook::bus::EventBus;
/// use camhook::entry::{EntryId, TransitionEvent};
///
/// # async fn example() -> camhook::error::Result<()> {
/// let (publisher, mut stream) = EventBus::new();
/// publisher.publish(TransitionEvent {
///     entry_id: EntryId::new("A"),
///     active: true,
///     observed_at: chrono::Utc::now(),
/// })?;
///
/// let event = stream.recv().await.unwrap();
/// assert!(event.active);
/// # Ok(())
/// # }
/// ```
pub struct EventBus;

impl EventBus {
    /// Create a new bus.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (EventPublisher, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let published = Arc::new(AtomicU64::new(0));
        (
            EventPublisher {
                tx,
                published: Arc::clone(&published),
            },
            EventStream { rx, published },
        )
    }
}

/// Producer half of the bus. Clone one per watcher.
#[derive(Clone)]
pub struct EventPublisher {
    tx: mpsc::UnboundedSender<TransitionEvent>,
    published: Arc<AtomicU64>,
}

impl EventPublisher {
    /// Push an event onto the bus. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::BusClosed`] once the consumer half has been dropped.
    pub fn publish(&self, event: TransitionEvent) -> Result<()> {
        self.tx.send(event).map_err(|_| MonitorError::BusClosed)?;
        self.published.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Whether the consumer half has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half of the bus.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<TransitionEvent>,
    published: Arc<AtomicU64>,
}

impl EventStream {
    /// Wait for the next event.
    ///
    /// Returns `None` once every publisher has been dropped and the queue is
    /// empty.
    pub async fn recv(&mut self) -> Option<TransitionEvent> {
        self.rx.recv().await
    }

    /// Take the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<TransitionEvent> {
        self.rx.try_recv().ok()
    }

    /// Number of events queued but not yet received.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Total number of events ever published to this bus.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Stop accepting new events; already queued events can still be received.
    pub fn close(&mut self) {
        self.rx.close();
    }
}
