//! Monitor metrics tracking using OpenTelemetry.

use crate::entry::Status;
use crate::watch::WatcherExit;
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use std::time::Instant;

/// Metrics collector for watch and dispatch activity.
///
/// Tracks notification outcomes, delivery latency, watcher exits and the
/// number of entries being watched.
///
/// # Examples
///
/// ```rust,no_run
/// use camhook::entry::Status;
/// use camhook::metrics::MonitorMetrics;
/// use opentelemetry::global;
///
/// let meter = global::meter("camhook");
/// let metrics = MonitorMetrics::new(meter);
///
/// let timer = metrics.start_delivery();
/// // ... call the webhook ...
/// metrics.record_delivery(Status::On, timer, true);
/// ```
#[derive(Clone)]
pub struct MonitorMetrics {
    delivered: Counter<u64>,
    failed: Counter<u64>,
    delivery_duration: Histogram<f64>,
    watcher_exits: Counter<u64>,
    watched_entries: Gauge<i64>,
}

impl MonitorMetrics {
    /// Create a new metrics collector with the provided meter.
    pub fn new(meter: Meter) -> Self {
        let delivered = meter
            .u64_counter("camhook.notifications.delivered")
            .with_description("Notifications accepted by the sink")
            .build();

        let failed = meter
            .u64_counter("camhook.notifications.failed")
            .with_description("Notifications whose delivery failed and were dropped")
            .build();

        let delivery_duration = meter
            .f64_histogram("camhook.notifications.duration")
            .with_description("Duration of notification deliveries in seconds")
            .with_unit("s")
            .build();

        let watcher_exits = meter
            .u64_counter("camhook.watchers.exits")
            .with_description("Entry watchers that stopped, by reason")
            .build();

        let watched_entries = meter
            .i64_gauge("camhook.watchers.active")
            .with_description("Number of entries currently watched")
            .build();

        Self {
            delivered,
            failed,
            delivery_duration,
            watcher_exits,
            watched_entries,
        }
    }

    /// Start a delivery timer, to be passed to [`record_delivery`](Self::record_delivery).
    pub fn start_delivery(&self) -> Instant {
        Instant::now()
    }

    /// Record the outcome of one delivery.
    pub fn record_delivery(&self, status: Status, start: Instant, ok: bool) {
        let attributes = [KeyValue::new("status", status.to_string())];
        if ok {
            self.delivered.add(1, &attributes);
        } else {
            self.failed.add(1, &attributes);
        }
        self.delivery_duration
            .record(start.elapsed().as_secs_f64(), &attributes);
    }

    /// Record that a watcher stopped.
    pub fn record_watcher_exit(&self, exit: WatcherExit) {
        let reason = match exit {
            WatcherExit::Cancelled => "cancelled",
            WatcherExit::EntryRemoved => "entry_removed",
            WatcherExit::BusClosed => "bus_closed",
        };
        self.watcher_exits.add(1, &[KeyValue::new("reason", reason)]);
    }

    /// Update the number of entries being watched.
    pub fn update_watched_entries(&self, count: usize) {
        self.watched_entries
            .record(i64::try_from(count).unwrap_or(i64::MAX), &[]);
    }
}
