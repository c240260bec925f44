//! Built-in metrics for the watch pipeline.
//!
//! Provides OpenTelemetry metrics tracking:
//! - Delivered/failed notifications, labelled by status
//! - Delivery duration
//! - Watcher exits, labelled by reason
//! - Entries currently watched
//!
//! # Examples
//!
//! ```rust,no_run
//! use camhook::metrics::MonitorMetrics;
//! use camhook::prelude::*;
//! use opentelemetry::global;
//! use std::sync::Arc;
//!
//! # async fn example(sink: Arc<dyn NotificationSink>) -> Result<()> {
//! let settings = MonitorSettings::builder().build()?;
//! let store = Arc::new(MemoryStore::new());
//!
//! Monitor::new(store, sink, settings)
//!     .with_metrics(MonitorMetrics::new(global::meter("camhook")))
//!     .run_until(tokio::signal::ctrl_c())
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod monitor_metrics;

pub use monitor_metrics::MonitorMetrics;
