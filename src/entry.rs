//! Watched entries and the events produced for them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Path separator used by the hierarchical store.
pub const PATH_SEPARATOR: char = '\\';

/// Separator the store uses in place of `\` inside non-packaged executable paths.
const ENCODED_SEPARATOR: char = '#';

/// Identifier of one monitorable entry: its full path below the store hive.
///
/// Cheap to clone; every watcher and every event for the entry share one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Arc<str>);

impl EntryId {
    /// Create an identifier from a full entry path.
    pub fn new(path: impl AsRef<str>) -> Self {
        Self(Arc::from(path.as_ref()))
    }

    /// Build the identifier of `child` beneath `root`.
    pub fn child_of(root: &str, child: &str) -> Self {
        let root = root.trim_end_matches(PATH_SEPARATOR);
        Self::new(format!("{root}{PATH_SEPARATOR}{child}"))
    }

    /// The full path.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human-readable application name for this entry.
    ///
    /// Packaged applications use their package family name as the last path
    /// segment. Non-packaged applications store the executable path with `\`
    /// encoded as `#`; for those the executable's file name is returned.
    pub fn display_name(&self) -> &str {
        let leaf = self
            .0
            .rsplit(PATH_SEPARATOR)
            .find(|segment| !segment.is_empty())
            .unwrap_or(&self.0);

        match leaf.rsplit(ENCODED_SEPARATOR).next() {
            Some(file) if !file.is_empty() => file,
            _ => leaf,
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for EntryId {
    fn from(path: String) -> Self {
        Self(Arc::from(path))
    }
}

/// Wire status of a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The device is in use by the entry's application.
    On,
    /// The device is no longer in use.
    Off,
}

impl Status {
    /// Map the boolean activity flag onto a status.
    pub fn from_active(active: bool) -> Self {
        if active { Self::On } else { Self::Off }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => f.write_str("on"),
            Self::Off => f.write_str("off"),
        }
    }
}

/// State of one entry as read from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateSnapshot {
    /// Whether the device is currently in use.
    pub active: bool,
    /// Raw "time since stop" marker the flag was derived from.
    pub raw_value: u64,
    /// When the value was read.
    pub read_at: DateTime<Utc>,
}

impl StateSnapshot {
    /// Derive a snapshot from the stored marker value.
    ///
    /// A zero stop-time means the device was started and has not stopped since.
    pub fn from_stop_marker(raw_value: u64, read_at: DateTime<Utc>) -> Self {
        Self {
            active: raw_value == 0,
            raw_value,
            read_at,
        }
    }
}

/// One observed state of one entry, as carried through the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionEvent {
    /// The entry that changed.
    pub entry_id: EntryId,
    /// Whether the device is now in use.
    pub active: bool,
    /// When the watcher read the new state.
    pub observed_at: DateTime<Utc>,
}

impl TransitionEvent {
    /// Build the event for a freshly read snapshot.
    pub fn from_snapshot(entry_id: EntryId, snapshot: &StateSnapshot) -> Self {
        Self {
            entry_id,
            active: snapshot.active,
            observed_at: snapshot.read_at,
        }
    }

    /// Wire status for this event.
    pub fn status(&self) -> Status {
        Status::from_active(self.active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ROOT: &str =
        r"SOFTWARE\Microsoft\Windows\CurrentVersion\CapabilityAccessManager\ConsentStore\webcam";

    #[test]
    fn test_child_of_joins_with_single_separator() {
        let id = EntryId::child_of(&format!("{ROOT}\\"), "Microsoft.WindowsCamera_8wekyb3d8bbwe");
        assert_eq!(
            id.as_str(),
            format!("{ROOT}\\Microsoft.WindowsCamera_8wekyb3d8bbwe")
        );
    }

    #[test]
    fn test_display_name_packaged() {
        let id = EntryId::child_of(ROOT, "Microsoft.WindowsCamera_8wekyb3d8bbwe");
        assert_eq!(id.display_name(), "Microsoft.WindowsCamera_8wekyb3d8bbwe");
    }

    #[test]
    fn test_display_name_non_packaged() {
        let id = EntryId::child_of(
            &format!("{ROOT}\\NonPackaged"),
            "C:#Program Files#Zoom#bin#Zoom.exe",
        );
        assert_eq!(id.display_name(), "Zoom.exe");
    }

    #[test]
    fn test_display_name_plain() {
        assert_eq!(EntryId::new("A").display_name(), "A");
    }

    #[test]
    fn test_stop_marker_semantics() {
        let now = Utc::now();
        assert!(StateSnapshot::from_stop_marker(0, now).active);
        assert!(!StateSnapshot::from_stop_marker(42, now).active);
    }

    #[test]
    fn test_entry_id_serializes_as_plain_string() {
        let id = EntryId::new("webcam/App");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"webcam/App\"");
        let back: EntryId = serde_json::from_str("\"webcam/App\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Status::On).unwrap(), "\"on\"");
        assert_eq!(serde_json::to_string(&Status::Off).unwrap(), "\"off\"");
    }

    proptest! {
        #[test]
        fn display_name_is_part_of_the_path(path in "[A-Za-z0-9#: .\\\\]{0,40}") {
            let id = EntryId::new(&path);
            prop_assert!(id.as_str().contains(id.display_name()));
        }

        #[test]
        fn display_name_of_plain_leaf_is_unchanged(leaf in "[A-Za-z0-9_ .]{1,40}") {
            let id = EntryId::child_of(ROOT, &leaf);
            prop_assert_eq!(id.display_name(), leaf.as_str());
        }
    }
}
