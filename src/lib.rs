//! # camhook
//!
//! Watch per-application camera usage records in the OS configuration store
//! and fire a webhook on every transition.
//!
//! ## Overview
//!
//! Windows records camera use per application under the current user's
//! capability consent store. Each application's key holds a
//! `LastUsedTimeStop` value that is zero while the camera is in use. `camhook`:
//! - Enumerates those keys once at startup
//! - Runs one watcher per key on a one-shot registry change notification
//! - Waits out a settling delay, reads the value and emits a transition event
//! - Merges all watchers onto one event bus
//! - Posts each event to an "on" or "off" webhook
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use camhook::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<()> {
//! let settings = MonitorSettings::builder()
//!     .with_file("camhook.yaml")
//!     .with_env_overrides("CAMHOOK", "__")
//!     .build()?;
//!
//! let sink = Arc::new(WebhookSink::from_settings(&settings.webhook)?);
//! let store = Arc::new(MemoryStore::new());
//!
//! Monitor::new(store, sink, settings)
//!     .run_until(tokio::signal::ctrl_c())
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `webhook` (default): HTTP delivery through `reqwest`.
//! - `metrics`: OpenTelemetry counters for deliveries and watcher exits.

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod bus;
pub mod dispatch;
pub mod entry;
pub mod error;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod monitor;
pub mod settings;
pub mod store;
pub mod watch;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::dispatch::{Dispatcher, NotificationSink};
    pub use crate::entry::{EntryId, Status, TransitionEvent};
    pub use crate::error::{MonitorError, Result, ValidationError};
    pub use crate::monitor::{Monitor, MonitorReport, RunningMonitor};
    pub use crate::settings::{MonitorSettings, Validate};
    pub use crate::store::{ConfigStore, MemoryStore};

    #[cfg(feature = "webhook")]
    pub use crate::dispatch::WebhookSink;

    #[cfg(windows)]
    pub use crate::store::RegistryStore;
}
