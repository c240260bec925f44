//! Wiring of enumeration, watchers, the event bus and the dispatcher.

use crate::bus::EventBus;
use crate::dispatch::{DispatchStats, Dispatcher, NotificationSink, StatsSnapshot};
use crate::entry::EntryId;
use crate::error::{MonitorError, Result};
#[cfg(feature = "metrics")]
use crate::metrics::MonitorMetrics;
use crate::settings::MonitorSettings;
use crate::store::ConfigStore;
use crate::watch::{EntryEnumerator, StateReader, WatchSupervisor, WatchTiming, WatcherExit};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The monitoring core, ready to start.
///
/// # Examples
///
/// ```rust,no_run
/// use camhook::prelude::*;
/// use std::sync::Arc;
///
/// # async fn example(sink: Arc<dyn NotificationSink>) -> Result<()> {
/// let settings = MonitorSettings::builder()
///     .with_env_overrides("CAMHOOK", "__")
///     .build()?;
/// let store = Arc::new(MemoryStore::new());
///
/// let report = Monitor::new(store, sink, settings)
///     .run_until(tokio::signal::ctrl_c())
///     .await?;
/// println!("dispatched {} events", report.dispatch.attempted());
/// # Ok(())
/// # }
/// ```
pub struct Monitor {
    store: Arc<dyn ConfigStore>,
    sink: Arc<dyn NotificationSink>,
    settings: MonitorSettings,
    #[cfg(feature = "metrics")]
    metrics: Option<MonitorMetrics>,
}

/// What happened over a monitor's lifetime.
#[derive(Debug, Clone)]
pub struct MonitorReport {
    /// Entries discovered at startup.
    pub entries: Vec<EntryId>,
    /// How each watcher stopped, in the order they stopped.
    pub watcher_exits: Vec<(EntryId, WatcherExit)>,
    /// Dispatch outcome counts.
    pub dispatch: StatsSnapshot,
}

impl Monitor {
    /// Assemble a monitor over `store` delivering to `sink`.
    pub fn new(
        store: Arc<dyn ConfigStore>,
        sink: Arc<dyn NotificationSink>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            store,
            sink,
            settings,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Record delivery outcomes and watcher exits through OpenTelemetry.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, metrics: MonitorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Enumerate entries once, spawn a watcher per entry and start the dispatcher.
    ///
    /// # Errors
    ///
    /// Returns an error only if the enumeration task itself fails to run.
    pub async fn start(self) -> Result<RunningMonitor> {
        let store = Arc::clone(&self.store);
        let roots = self.settings.namespace_roots.clone();
        let entries = tokio::task::spawn_blocking(move || EntryEnumerator::new(store).enumerate(&roots))
            .await
            .map_err(|e| MonitorError::Other(format!("Enumeration task failed: {}", e)))?;

        if entries.is_empty() {
            tracing::warn!("No entries found to monitor");
        }

        let (publisher, stream) = EventBus::new();
        let cancel = CancellationToken::new();

        let mut supervisor = WatchSupervisor::new(
            Arc::clone(&self.store),
            StateReader::new(Arc::clone(&self.store), &self.settings.value_name),
            publisher,
            WatchTiming::from(&self.settings),
            cancel.clone(),
        );
        supervisor.spawn_all(entries.iter().cloned());

        let dispatcher = Dispatcher::new(self.sink);
        #[cfg(feature = "metrics")]
        let dispatcher = match &self.metrics {
            Some(metrics) => {
                metrics.update_watched_entries(supervisor.len());
                dispatcher.with_metrics(metrics.clone())
            }
            None => dispatcher,
        };
        let stats = dispatcher.stats();
        let dispatch_task = tokio::spawn(dispatcher.run(stream));

        tracing::info!(
            entries = entries.len(),
            store = %self.store.name(),
            settle_ms = self.settings.settle_delay_ms,
            "Monitor started"
        );

        Ok(RunningMonitor {
            entries,
            supervisor,
            dispatch_task,
            stats,
            cancel,
            watcher_exits: Vec::new(),
            #[cfg(feature = "metrics")]
            metrics: self.metrics,
        })
    }

    /// Start, run until `shutdown` resolves, then shut down cleanly.
    ///
    /// # Errors
    ///
    /// Returns an error if startup or the dispatcher task fails.
    pub async fn run_until<F>(self, shutdown: F) -> Result<MonitorReport>
    where
        F: Future,
    {
        let mut running = self.start().await?;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                exit = running.supervisor.next_exit(), if !running.supervisor.is_empty() => {
                    if let Some(exit) = exit {
                        running.record_exit(exit);
                    }
                }
            }
        }

        tracing::info!("Shutdown requested");
        running.shutdown().await
    }
}

/// A started monitor.
pub struct RunningMonitor {
    entries: Vec<EntryId>,
    supervisor: WatchSupervisor,
    dispatch_task: JoinHandle<StatsSnapshot>,
    stats: DispatchStats,
    cancel: CancellationToken,
    watcher_exits: Vec<(EntryId, WatcherExit)>,
    #[cfg(feature = "metrics")]
    metrics: Option<MonitorMetrics>,
}

impl RunningMonitor {
    /// Entries discovered at startup.
    pub fn entries(&self) -> &[EntryId] {
        &self.entries
    }

    /// Entries whose watcher is still running.
    pub fn active_entries(&self) -> Vec<EntryId> {
        self.supervisor.active_entries()
    }

    /// Live dispatch counters.
    pub fn stats(&self) -> DispatchStats {
        self.stats.clone()
    }

    /// Token cancelled when shutdown starts.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop every watcher, let the dispatcher drain what is already queued,
    /// and report.
    ///
    /// # Errors
    ///
    /// Returns an error if the dispatcher task panicked.
    pub async fn shutdown(mut self) -> Result<MonitorReport> {
        let supervisor = self.supervisor;
        for exit in supervisor.shutdown().await {
            #[cfg(feature = "metrics")]
            if let Some(metrics) = &self.metrics {
                metrics.record_watcher_exit(exit.1);
            }
            self.watcher_exits.push(exit);
        }
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.update_watched_entries(0);
        }

        // The supervisor held the last publisher, so the dispatcher now sees
        // the end of the stream once the queue is empty.
        let dispatch = self
            .dispatch_task
            .await
            .map_err(|e| MonitorError::Other(format!("Dispatcher task failed: {}", e)))?;

        tracing::info!(
            delivered = dispatch.delivered,
            failed = dispatch.failed,
            "Monitor stopped"
        );

        Ok(MonitorReport {
            entries: self.entries,
            watcher_exits: self.watcher_exits,
            dispatch,
        })
    }

    fn record_exit(&mut self, exit: (EntryId, WatcherExit)) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = &self.metrics {
            metrics.record_watcher_exit(exit.1);
            metrics.update_watched_entries(self.supervisor.len());
        }
        self.watcher_exits.push(exit);
    }
}
