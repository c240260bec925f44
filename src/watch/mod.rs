//! Entry discovery and per-entry change watching.
//!
//! [`EntryEnumerator`] finds the entries once at startup, [`WatchSupervisor`]
//! runs one [`EntryWatcher`] per entry, and each watcher reads state through
//! a [`StateReader`] and publishes onto the event bus.

pub mod enumerator;
pub mod state;
pub mod supervisor;
pub mod watcher;

pub use enumerator::EntryEnumerator;
pub use state::StateReader;
pub use supervisor::WatchSupervisor;
pub use watcher::{EntryWatcher, WatchPhase, WatchTiming, WatcherExit};
