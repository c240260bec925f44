//! Ownership of every running watcher.

use super::{EntryWatcher, StateReader, WatchTiming, WatcherExit};
use crate::bus::EventPublisher;
use crate::entry::EntryId;
use crate::store::ConfigStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;

/// Task group owning one [`EntryWatcher`] per entry.
///
/// All watchers share one cancellation token; [`shutdown`](Self::shutdown)
/// cancels it and waits for every watcher to return, which guarantees every
/// notification handle has been released.
pub struct WatchSupervisor {
    store: Arc<dyn ConfigStore>,
    reader: StateReader,
    publisher: EventPublisher,
    timing: WatchTiming,
    cancel: CancellationToken,
    tasks: JoinSet<WatcherExit>,
    active: HashMap<Id, EntryId>,
}

impl WatchSupervisor {
    /// Create a supervisor. Watchers publish into `publisher` and stop when
    /// `cancel` (or a parent of it) is cancelled.
    pub fn new(
        store: Arc<dyn ConfigStore>,
        reader: StateReader,
        publisher: EventPublisher,
        timing: WatchTiming,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            reader,
            publisher,
            timing,
            cancel,
            tasks: JoinSet::new(),
            active: HashMap::new(),
        }
    }

    /// Start a watcher for `entry`. Returns `false` if one is already running.
    pub fn spawn(&mut self, entry: EntryId) -> bool {
        if self.active.values().any(|running| *running == entry) {
            return false;
        }

        let watcher = EntryWatcher::new(
            entry.clone(),
            Arc::clone(&self.store),
            self.reader.clone(),
            self.publisher.clone(),
            self.timing,
            self.cancel.child_token(),
        );
        let handle = self.tasks.spawn(watcher.run());
        self.active.insert(handle.id(), entry);
        true
    }

    /// Start a watcher for each entry.
    pub fn spawn_all(&mut self, entries: impl IntoIterator<Item = EntryId>) -> usize {
        entries.into_iter().filter(|e| self.spawn(e.clone())).count()
    }

    /// Entries whose watcher has not been reaped yet, sorted.
    pub fn active_entries(&self) -> Vec<EntryId> {
        let mut entries: Vec<EntryId> = self.active.values().cloned().collect();
        entries.sort();
        entries
    }

    /// Number of watchers not reaped yet.
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Whether no watcher is running.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for the next watcher to stop.
    ///
    /// Returns `None` when no watcher is left. A watcher that panicked is
    /// logged and skipped; the others keep running.
    pub async fn next_exit(&mut self) -> Option<(EntryId, WatcherExit)> {
        loop {
            match self.tasks.join_next_with_id().await? {
                Ok((id, exit)) => {
                    if let Some(entry) = self.active.remove(&id) {
                        return Some((entry, exit));
                    }
                }
                Err(e) => {
                    let entry = self.active.remove(&e.id());
                    tracing::error!(entry = ?entry, error = %e, "Watcher task failed");
                }
            }
        }
    }

    /// Cancel every watcher and wait for all of them to return.
    pub async fn shutdown(mut self) -> Vec<(EntryId, WatcherExit)> {
        self.cancel.cancel();
        let mut exits = Vec::new();
        while let Some(exit) = self.next_exit().await {
            exits.push(exit);
        }
        tracing::info!(stopped = exits.len(), "All watchers stopped");
        exits
    }
}
