//! In-process store with registry-like notification semantics.

use super::{ChangeNotification, ChildEntry, ConfigStore, WaitOutcome};
use crate::entry::{EntryId, PATH_SEPARATOR};
use crate::error::{MonitorError, Result};
use parking_lot::{Condvar, Mutex};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// In-memory hierarchical store.
///
/// Keys are full paths; each key holds named unsigned values. Change
/// notifications behave like the registry's: a registration fires once, on
/// the next value write to its key, and is then spent.
///
/// Cloning yields another handle to the same store, so a test can keep one
/// handle for writing while the monitor owns another.
///
/// # Examples
///
/// ```rust
/// use camhook::store::{ConfigStore, MemoryStore};
///
/// let store = MemoryStore::new();
/// store.create_key(r"Root");
/// store.set_value(r"Root\App", "LastUsedTimeStop", 0);
///
/// let children = store.enumerate_children("Root").unwrap();
/// assert_eq!(children.len(), 1);
/// ```
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    keys: BTreeMap<String, KeyState>,
    registrations: HashMap<String, Vec<(u64, Arc<Signal>)>>,
    next_registration: u64,
    failing_registrations: HashMap<String, usize>,
    failing_reads: HashMap<String, usize>,
    foreign_thread_waits: usize,
}

#[derive(Default)]
struct KeyState {
    values: HashMap<String, u64>,
    denied: bool,
}

#[derive(Default)]
struct Signal {
    fired: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    fn fire(&self) {
        *self.fired.lock() = true;
        self.cond.notify_all();
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a key (and nothing else) if it does not exist yet.
    pub fn create_key(&self, path: &str) {
        self.inner.lock().keys.entry(path.to_string()).or_default();
    }

    /// Write `value_name = value` on `path`, creating the key if needed, and
    /// fire every pending registration on that key.
    ///
    /// Writing the same value again still fires, as a real store does.
    pub fn set_value(&self, path: &str, value_name: &str, value: u64) {
        let mut inner = self.inner.lock();
        inner
            .keys
            .entry(path.to_string())
            .or_default()
            .values
            .insert(value_name.to_string(), value);

        if let Some(pending) = inner.registrations.remove(path) {
            for (_, signal) in pending {
                signal.fire();
            }
        }
    }

    /// Remove a key and everything beneath it.
    ///
    /// Pending registrations on removed keys fire, matching the registry's
    /// behavior of signalling waiters when a watched key is deleted.
    pub fn remove_key(&self, path: &str) {
        let mut inner = self.inner.lock();
        let prefix = format!("{path}{PATH_SEPARATOR}");
        inner
            .keys
            .retain(|key, _| key != path && !key.starts_with(&prefix));

        let doomed: Vec<String> = inner
            .registrations
            .keys()
            .filter(|key| *key == path || key.starts_with(&prefix))
            .cloned()
            .collect();
        for key in doomed {
            if let Some(pending) = inner.registrations.remove(&key) {
                for (_, signal) in pending {
                    signal.fire();
                }
            }
        }
    }

    /// Mark a key as unreadable; it still shows up in listings.
    pub fn deny_access(&self, path: &str) {
        self.inner
            .lock()
            .keys
            .entry(path.to_string())
            .or_default()
            .denied = true;
    }

    /// Make the next `times` registration attempts on `path` fail.
    pub fn fail_registrations(&self, path: &str, times: usize) {
        self.inner
            .lock()
            .failing_registrations
            .insert(path.to_string(), times);
    }

    /// Make the next `times` reads on `path` fail with a transient error.
    pub fn fail_reads(&self, path: &str, times: usize) {
        self.inner.lock().failing_reads.insert(path.to_string(), times);
    }

    /// Number of live (registered, not yet fired, not yet released) notifications on `path`.
    pub fn live_registrations(&self, path: &str) -> usize {
        self.inner
            .lock()
            .registrations
            .get(path)
            .map_or(0, Vec::len)
    }

    /// Total number of live notifications across all keys.
    pub fn total_live_registrations(&self) -> usize {
        self.inner.lock().registrations.values().map(Vec::len).sum()
    }

    /// Number of waits made from a thread other than the one that registered
    /// the notification.
    ///
    /// The registry signals an asynchronous registration when its registering
    /// thread exits, so such a wait can report a change that never happened.
    pub fn foreign_thread_waits(&self) -> usize {
        self.inner.lock().foreign_thread_waits
    }

    fn take_injected_failure(map: &mut HashMap<String, usize>, path: &str) -> bool {
        match map.get_mut(path) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

impl ConfigStore for MemoryStore {
    fn enumerate_children(&self, root: &str) -> Result<Vec<ChildEntry>> {
        let inner = self.inner.lock();
        let root = root.trim_end_matches(PATH_SEPARATOR);

        match inner.keys.get(root) {
            None => {
                return Err(MonitorError::Enumeration {
                    root: root.to_string(),
                    reason: "key not found".to_string(),
                });
            }
            Some(state) if state.denied => {
                return Err(MonitorError::Enumeration {
                    root: root.to_string(),
                    reason: "access denied".to_string(),
                });
            }
            Some(_) => {}
        }

        let prefix = format!("{root}{PATH_SEPARATOR}");
        let children = inner
            .keys
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| !key[prefix.len()..].contains(PATH_SEPARATOR))
            .map(|(key, state)| {
                if state.denied {
                    ChildEntry::Unreadable {
                        path: key.clone(),
                        reason: "access denied".to_string(),
                    }
                } else {
                    ChildEntry::Readable(EntryId::new(key))
                }
            })
            .collect();

        Ok(children)
    }

    fn read_value(&self, entry: &EntryId, value_name: &str) -> Result<u64> {
        let mut inner = self.inner.lock();
        let path = entry.as_str();

        if Self::take_injected_failure(&mut inner.failing_reads, path) {
            return Err(MonitorError::Read {
                entry: path.to_string(),
                reason: "injected transient failure".to_string(),
            });
        }

        let state = inner
            .keys
            .get(path)
            .ok_or_else(|| MonitorError::EntryNotFound(path.to_string()))?;
        if state.denied {
            return Err(MonitorError::AccessDenied(path.to_string()));
        }

        state
            .values
            .get(value_name)
            .copied()
            .ok_or_else(|| MonitorError::ValueMissing {
                entry: path.to_string(),
                value: value_name.to_string(),
            })
    }

    fn register_change_notification(
        &self,
        entry: &EntryId,
    ) -> Result<Box<dyn ChangeNotification>> {
        let mut inner = self.inner.lock();
        let path = entry.as_str();

        if Self::take_injected_failure(&mut inner.failing_registrations, path) {
            return Err(MonitorError::Registration {
                entry: path.to_string(),
                reason: "injected registration failure".to_string(),
            });
        }

        match inner.keys.get(path) {
            None => return Err(MonitorError::EntryNotFound(path.to_string())),
            Some(state) if state.denied => {
                return Err(MonitorError::AccessDenied(path.to_string()));
            }
            Some(_) => {}
        }

        let id = inner.next_registration;
        inner.next_registration += 1;
        let signal = Arc::new(Signal::default());
        inner
            .registrations
            .entry(path.to_string())
            .or_default()
            .push((id, Arc::clone(&signal)));

        Ok(Box::new(MemoryNotification {
            id,
            registered_on: thread::current().id(),
            path: path.to_string(),
            signal,
            store: Arc::clone(&self.inner),
        }))
    }

    fn name(&self) -> String {
        "memory".to_string()
    }
}

/// Registration handle returned by [`MemoryStore`].
struct MemoryNotification {
    id: u64,
    registered_on: ThreadId,
    path: String,
    signal: Arc<Signal>,
    store: Arc<Mutex<MemoryInner>>,
}

impl ChangeNotification for MemoryNotification {
    fn wait(&mut self, timeout: Duration) -> Result<WaitOutcome> {
        if thread::current().id() != self.registered_on {
            self.store.lock().foreign_thread_waits += 1;
        }

        let deadline = Instant::now() + timeout;
        let mut fired = self.signal.fired.lock();
        while !*fired {
            if self.signal.cond.wait_until(&mut fired, deadline).timed_out() {
                return Ok(if *fired {
                    WaitOutcome::Fired
                } else {
                    WaitOutcome::TimedOut
                });
            }
        }
        Ok(WaitOutcome::Fired)
    }
}

impl Drop for MemoryNotification {
    fn drop(&mut self) {
        let mut inner = self.store.lock();
        if let Some(pending) = inner.registrations.get_mut(&self.path) {
            pending.retain(|(id, _)| *id != self.id);
            if pending.is_empty() {
                inner.registrations.remove(&self.path);
            }
        }
    }
}
