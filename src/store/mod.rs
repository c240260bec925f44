//! Access to the hierarchical configuration store being watched.
//!
//! [`ConfigStore`] is the seam between the watch machinery and the OS. The
//! Windows registry backend lives in [`RegistryStore`]; [`MemoryStore`] is an
//! in-process store with the same one-shot notification semantics, used on
//! other hosts and in tests.

mod memory;
#[cfg(windows)]
mod registry;

pub use memory::MemoryStore;
#[cfg(windows)]
pub use registry::RegistryStore;

use crate::entry::EntryId;
use crate::error::Result;
use std::time::Duration;

/// One child discovered beneath a namespace root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildEntry {
    /// The child can be watched and read.
    Readable(EntryId),
    /// The child exists but cannot be opened for watching.
    Unreadable {
        /// Full path of the child
        path: String,
        /// Why it could not be opened
        reason: String,
    },
}

/// Result of one bounded wait on a change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The store signalled a change under the entry.
    Fired,
    /// The timeout elapsed without a change.
    TimedOut,
}

/// A one-shot change notification registered for a single entry.
///
/// Each registration fires at most once. Dropping the value releases the
/// underlying OS handle, so a registration never outlives the scope that
/// owns it.
pub trait ChangeNotification: Send {
    /// Block the calling thread until the notification fires or `timeout` elapses.
    ///
    /// Once this has returned [`WaitOutcome::Fired`] further calls keep
    /// returning `Fired`; the registration must be dropped and a new one made
    /// to observe the next change.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS wait primitive fails.
    fn wait(&mut self, timeout: Duration) -> Result<WaitOutcome>;
}

/// Trait for hierarchical key/value stores that can be watched.
///
/// All methods are blocking and are called from blocking-capable threads.
pub trait ConfigStore: Send + Sync + 'static {
    /// List the direct children of `root`.
    ///
    /// Children that exist but cannot be opened are reported as
    /// [`ChildEntry::Unreadable`] rather than failing the whole listing.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` itself cannot be opened.
    fn enumerate_children(&self, root: &str) -> Result<Vec<ChildEntry>>;

    /// Read the unsigned integer value `value_name` stored on `entry`.
    ///
    /// # Errors
    ///
    /// Returns [`MonitorError::EntryNotFound`](crate::error::MonitorError::EntryNotFound)
    /// if the entry is gone, [`MonitorError::ValueMissing`](crate::error::MonitorError::ValueMissing)
    /// if the entry exists without the value, and another variant for transient failures.
    fn read_value(&self, entry: &EntryId, value_name: &str) -> Result<u64>;

    /// Register a fresh one-shot change notification for `entry`.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry cannot be opened or the OS refuses the registration.
    fn register_change_notification(&self, entry: &EntryId)
    -> Result<Box<dyn ChangeNotification>>;

    /// Get a human-readable name for this store (for logging/debugging).
    fn name(&self) -> String;
}
