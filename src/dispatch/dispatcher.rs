//! The single consumer of the event bus.

use super::NotificationSink;
use crate::bus::EventStream;
use crate::entry::TransitionEvent;
#[cfg(feature = "metrics")]
use crate::metrics::MonitorMetrics;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Running counts of dispatch outcomes. Clones share the same counters.
#[derive(Debug, Clone, Default)]
pub struct DispatchStats {
    inner: Arc<StatsInner>,
}

#[derive(Debug, Default)]
struct StatsInner {
    delivered: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Events the sink accepted.
    pub delivered: u64,
    /// Events whose delivery failed and were dropped.
    pub failed: u64,
}

impl StatsSnapshot {
    /// Events attempted in total.
    pub fn attempted(&self) -> u64 {
        self.delivered + self.failed
    }
}

impl DispatchStats {
    /// Read the current counts.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
        }
    }

    fn record(&self, ok: bool) {
        let counter = if ok {
            &self.inner.delivered
        } else {
            &self.inner.failed
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Drains the event bus and hands each event to a [`NotificationSink`].
///
/// Calls are serialized; a failed call is logged and the next event is
/// processed. Publishing onto the bus never waits for this consumer.
pub struct Dispatcher {
    sink: Arc<dyn NotificationSink>,
    stats: DispatchStats,
    #[cfg(feature = "metrics")]
    metrics: Option<MonitorMetrics>,
}

impl Dispatcher {
    /// Create a dispatcher delivering to `sink`.
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sink,
            stats: DispatchStats::default(),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Also record delivery outcomes through OpenTelemetry.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: MonitorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Handle to this dispatcher's counters.
    pub fn stats(&self) -> DispatchStats {
        self.stats.clone()
    }

    /// Drain `stream` until every publisher is gone and the queue is empty.
    pub async fn run(self, mut stream: EventStream) -> StatsSnapshot {
        tracing::debug!(sink = %self.sink.name(), "Dispatcher started");
        while let Some(event) = stream.recv().await {
            self.dispatch(&event).await;
        }
        let summary = self.stats.snapshot();
        tracing::debug!(
            delivered = summary.delivered,
            failed = summary.failed,
            "Dispatcher stopped"
        );
        summary
    }

    /// Log one event and deliver it. Never fails.
    pub async fn dispatch(&self, event: &TransitionEvent) {
        let name = event.entry_id.display_name();
        if event.active {
            tracing::info!(entry = %event.entry_id, "Camera in use by {}", name);
        } else {
            tracing::info!(entry = %event.entry_id, "Camera no longer in use by {}", name);
        }

        let started = Instant::now();
        let outcome = self.sink.deliver(event).await;
        self.record(event, started, outcome.is_ok());

        match outcome {
            Ok(()) => {
                tracing::debug!(
                    entry = %event.entry_id,
                    status = %event.status(),
                    sink = %self.sink.name(),
                    "Notification delivered"
                );
            }
            Err(e) => {
                tracing::error!(
                    entry = %event.entry_id,
                    status = %event.status(),
                    sink = %self.sink.name(),
                    error = %e,
                    "Error calling webhook"
                );
            }
        }
    }

    #[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
    fn record(&self, event: &TransitionEvent, started: Instant, ok: bool) {
        self.stats.record(ok);
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_delivery(event.status(), started, ok);
        }
    }
}
