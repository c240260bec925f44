//! Reading an entry's current state.

use crate::entry::{EntryId, StateSnapshot};
use crate::error::Result;
use crate::store::ConfigStore;
use chrono::Utc;
use std::sync::Arc;

/// Reads the activity state of entries from the store.
#[derive(Clone)]
pub struct StateReader {
    store: Arc<dyn ConfigStore>,
    value_name: Arc<str>,
}

impl StateReader {
    /// Create a reader that interprets `value_name` as the stop-time marker.
    pub fn new(store: Arc<dyn ConfigStore>, value_name: impl AsRef<str>) -> Self {
        Self {
            store,
            value_name: Arc::from(value_name.as_ref()),
        }
    }

    /// Read the entry's current state. Blocking.
    ///
    /// # Errors
    ///
    /// Propagates the store's error; see [`ConfigStore::read_value`].
    pub fn read_state(&self, entry: &EntryId) -> Result<StateSnapshot> {
        let raw = self.store.read_value(entry, &self.value_name)?;
        Ok(StateSnapshot::from_stop_marker(raw, Utc::now()))
    }

    /// Name of the value being read.
    pub fn value_name(&self) -> &str {
        &self.value_name
    }
}
