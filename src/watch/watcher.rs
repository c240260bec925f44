//! Per-entry watch loop.

use super::StateReader;
use crate::bus::EventPublisher;
use crate::entry::{EntryId, StateSnapshot, TransitionEvent};
use crate::error::{MonitorError, Result};
use crate::settings::{BackoffPolicy, MonitorSettings};
use crate::store::{ConfigStore, WaitOutcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Timing knobs shared by every watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchTiming {
    /// Delay between a notification firing and the state read.
    pub settle_delay: Duration,
    /// Longest single OS wait before checking for cancellation.
    pub poll_interval: Duration,
    /// Backoff for registration and transient read failures.
    pub backoff: BackoffPolicy,
}

impl From<&MonitorSettings> for WatchTiming {
    fn from(settings: &MonitorSettings) -> Self {
        Self {
            settle_delay: settings.settle_delay(),
            poll_interval: settings.poll_interval(),
            backoff: settings.retry,
        }
    }
}

impl Default for WatchTiming {
    fn default() -> Self {
        Self::from(&MonitorSettings::default())
    }
}

/// Where a watcher is in its cycle.
///
/// `Idle → Registered → Fired → Settling → Read → Idle`. A notification
/// handle exists only while `Registered`. An entry with no state value yet
/// goes from `Read` back to `Idle` without publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchPhase {
    /// No notification registered.
    Idle,
    /// A one-shot notification is registered and being waited on.
    Registered,
    /// The notification fired and its handle has been released.
    Fired,
    /// Waiting out the settling delay.
    Settling,
    /// Reading and publishing the new state.
    Read,
}

/// Why a watcher stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherExit {
    /// Shutdown was requested.
    Cancelled,
    /// The entry no longer exists in the store.
    EntryRemoved,
    /// The event bus consumer is gone.
    BusClosed,
}

/// Watches exactly one entry and publishes a [`TransitionEvent`] every time
/// its change notification fires.
///
/// Every firing produces an event, even when the state read matches the
/// previous one.
pub struct EntryWatcher {
    entry: EntryId,
    store: Arc<dyn ConfigStore>,
    reader: StateReader,
    publisher: EventPublisher,
    timing: WatchTiming,
    cancel: CancellationToken,
    phase: WatchPhase,
}

impl EntryWatcher {
    /// Create a watcher for `entry`.
    pub fn new(
        entry: EntryId,
        store: Arc<dyn ConfigStore>,
        reader: StateReader,
        publisher: EventPublisher,
        timing: WatchTiming,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            entry,
            store,
            reader,
            publisher,
            timing,
            cancel,
            phase: WatchPhase::Idle,
        }
    }

    /// The entry being watched.
    pub fn entry(&self) -> &EntryId {
        &self.entry
    }

    /// Current phase.
    pub fn phase(&self) -> WatchPhase {
        self.phase
    }

    /// Run until cancelled, the entry disappears, or the bus closes.
    pub async fn run(mut self) -> WatcherExit {
        tracing::info!(entry = %self.entry, "Monitoring entry");

        let exit = loop {
            if let Err(exit) = self.wait_for_change().await {
                break exit;
            }

            self.phase = WatchPhase::Settling;
            if !self.pause(self.timing.settle_delay).await {
                break WatcherExit::Cancelled;
            }

            self.phase = WatchPhase::Read;
            let snapshot = match self.read_with_retry().await {
                Ok(Some(snapshot)) => snapshot,
                Ok(None) => {
                    self.phase = WatchPhase::Idle;
                    continue;
                }
                Err(exit) => break exit,
            };

            let event = TransitionEvent::from_snapshot(self.entry.clone(), &snapshot);
            tracing::debug!(
                entry = %self.entry,
                active = event.active,
                raw = snapshot.raw_value,
                "State change detected"
            );
            if self.publisher.publish(event).is_err() {
                break WatcherExit::BusClosed;
            }

            self.phase = WatchPhase::Idle;
        };

        self.phase = WatchPhase::Idle;
        tracing::info!(entry = %self.entry, ?exit, "Stopped monitoring entry");
        exit
    }

    /// Register a fresh notification, wait for it to fire, release it.
    async fn wait_for_change(&mut self) -> std::result::Result<(), WatcherExit> {
        let mut attempt = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return Err(WatcherExit::Cancelled);
            }

            self.phase = WatchPhase::Registered;
            match self.watch_once().await {
                Ok(true) => {
                    self.phase = WatchPhase::Fired;
                    return Ok(());
                }
                Ok(false) => return Err(WatcherExit::Cancelled),
                Err(e) if e.is_entry_missing() => {
                    tracing::warn!(entry = %self.entry, error = %e, "Entry removed");
                    return Err(WatcherExit::EntryRemoved);
                }
                Err(e) => {
                    let delay = self.timing.backoff.delay_for(attempt);
                    tracing::warn!(
                        entry = %self.entry,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Change notification failed, retrying"
                    );
                    attempt = attempt.saturating_add(1);
                    if !self.pause(delay).await {
                        return Err(WatcherExit::Cancelled);
                    }
                }
            }
        }
    }

    /// Register a fresh notification and block on it in bounded slices until
    /// it fires or shutdown is requested.
    ///
    /// An asynchronous registry registration is signalled when the thread
    /// that made it exits, so registration, every wait and the release all
    /// happen inside one blocking task.
    ///
    /// Returns `Ok(true)` if the notification fired, `Ok(false)` on cancellation.
    async fn watch_once(&self) -> Result<bool> {
        let store = Arc::clone(&self.store);
        let entry = self.entry.clone();
        let cancel = self.cancel.clone();
        let poll = self.timing.poll_interval;
        tokio::task::spawn_blocking(move || {
            let mut handle = store.register_change_notification(&entry)?;
            while !cancel.is_cancelled() {
                if handle.wait(poll)? == WaitOutcome::Fired {
                    return Ok(true);
                }
            }
            Ok(false)
        })
        .await
        .map_err(|e| MonitorError::Wait {
            entry: self.entry.to_string(),
            reason: e.to_string(),
        })?
    }

    /// Read the new state, retrying transient failures.
    ///
    /// `Ok(None)` means the entry exists but has no state value yet; the
    /// caller goes back to waiting without publishing.
    async fn read_with_retry(&self) -> std::result::Result<Option<StateSnapshot>, WatcherExit> {
        let mut attempt = 0u32;
        loop {
            let reader = self.reader.clone();
            let entry = self.entry.clone();
            let result = tokio::task::spawn_blocking(move || reader.read_state(&entry))
                .await
                .map_err(|e| MonitorError::Read {
                    entry: self.entry.to_string(),
                    reason: e.to_string(),
                })
                .and_then(|r| r);

            match result {
                Ok(snapshot) => return Ok(Some(snapshot)),
                Err(e) if e.is_entry_missing() => {
                    tracing::warn!(entry = %self.entry, error = %e, "Entry removed");
                    return Err(WatcherExit::EntryRemoved);
                }
                Err(e) if e.is_value_missing() => {
                    tracing::debug!(entry = %self.entry, error = %e, "No state value yet");
                    return Ok(None);
                }
                Err(e) => {
                    let delay = self.timing.backoff.delay_for(attempt);
                    tracing::warn!(
                        entry = %self.entry,
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "State read failed, retrying"
                    );
                    attempt = attempt.saturating_add(1);
                    if !self.pause(delay).await {
                        return Err(WatcherExit::Cancelled);
                    }
                }
            }
        }
    }

    /// Sleep unless cancelled first. Returns `false` on cancellation.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = sleep(duration) => true,
        }
    }
}
