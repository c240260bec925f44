//! Discovery of the entries to watch.

use crate::entry::{EntryId, PATH_SEPARATOR};
use crate::store::{ChildEntry, ConfigStore};
use std::collections::HashSet;
use std::sync::Arc;

/// Lists the watchable entries beneath a set of namespace roots.
///
/// Enumeration is best effort: a root that cannot be opened, or a child that
/// cannot be read, is logged and skipped. The result is deduplicated
/// (case-insensitively, as registry paths are) and keeps discovery order.
pub struct EntryEnumerator {
    store: Arc<dyn ConfigStore>,
}

impl EntryEnumerator {
    /// Create an enumerator over `store`.
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self { store }
    }

    /// Enumerate the direct children of every root.
    ///
    /// A child that is itself one of `roots` is a namespace, not an entry,
    /// and is left out.
    pub fn enumerate(&self, roots: &[String]) -> Vec<EntryId> {
        let root_keys: HashSet<String> = roots.iter().map(|r| normalize(r)).collect();
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for root in roots {
            tracing::debug!(root = %root, store = %self.store.name(), "Enumerating namespace");

            let children = match self.store.enumerate_children(root) {
                Ok(children) => children,
                Err(e) => {
                    tracing::warn!(root = %root, error = %e, "Namespace root unreadable, skipping");
                    continue;
                }
            };

            for child in children {
                match child {
                    ChildEntry::Readable(id) => {
                        let key = normalize(id.as_str());
                        if root_keys.contains(&key) {
                            tracing::debug!(entry = %id, "Skipping nested namespace root");
                            continue;
                        }
                        if seen.insert(key) {
                            entries.push(id);
                        }
                    }
                    ChildEntry::Unreadable { path, reason } => {
                        tracing::warn!(entry = %path, reason = %reason, "Skipping unreadable entry");
                    }
                }
            }
        }

        tracing::info!(count = entries.len(), "Enumerated watchable entries");
        entries
    }
}

fn normalize(path: &str) -> String {
    path.trim_end_matches(PATH_SEPARATOR).to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    const ROOT: &str = r"Software\Cam";
    const NON_PACKAGED: &str = r"Software\Cam\NonPackaged";

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_key(ROOT);
        store.create_key(NON_PACKAGED);
        store.set_value(r"Software\Cam\App.One", "LastUsedTimeStop", 1);
        store.set_value(r"Software\Cam\App.Two", "LastUsedTimeStop", 1);
        store.set_value(
            r"Software\Cam\NonPackaged\C:#Tools#zoom.exe",
            "LastUsedTimeStop",
            1,
        );
        store
    }

    fn enumerate(store: &MemoryStore, roots: &[&str]) -> Vec<String> {
        let roots: Vec<String> = roots.iter().map(|r| r.to_string()).collect();
        EntryEnumerator::new(Arc::new(store.clone()))
            .enumerate(&roots)
            .into_iter()
            .map(|id| id.to_string())
            .collect()
    }

    #[test]
    fn test_enumerates_all_roots_without_nested_root() {
        let store = store();
        let entries = enumerate(&store, &[ROOT, NON_PACKAGED]);
        assert_eq!(
            entries,
            vec![
                r"Software\Cam\App.One",
                r"Software\Cam\App.Two",
                r"Software\Cam\NonPackaged\C:#Tools#zoom.exe",
            ]
        );
    }

    #[test]
    fn test_denied_child_is_skipped() {
        let store = store();
        store.deny_access(r"Software\Cam\App.One");
        let entries = enumerate(&store, &[ROOT, NON_PACKAGED]);
        assert_eq!(
            entries,
            vec![
                r"Software\Cam\App.Two",
                r"Software\Cam\NonPackaged\C:#Tools#zoom.exe",
            ]
        );
    }

    #[test]
    fn test_missing_root_is_skipped() {
        let store = store();
        let entries = enumerate(&store, &[r"Software\Missing", NON_PACKAGED]);
        assert_eq!(entries, vec![r"Software\Cam\NonPackaged\C:#Tools#zoom.exe"]);
    }

    #[test]
    fn test_unconfigured_nested_key_is_an_entry() {
        let store = store();
        let entries = enumerate(&store, &[ROOT]);
        assert_eq!(
            entries,
            vec![
                r"Software\Cam\App.One",
                r"Software\Cam\App.Two",
                r"Software\Cam\NonPackaged",
            ]
        );
    }

    #[test]
    fn test_empty_root_yields_nothing() {
        let store = MemoryStore::new();
        store.create_key(ROOT);
        assert!(enumerate(&store, &[ROOT]).is_empty());
    }

    #[test]
    fn test_duplicate_roots_deduplicated() {
        let store = store();
        let entries = enumerate(&store, &[ROOT, r"Software\Cam\", ROOT, NON_PACKAGED]);
        assert_eq!(entries.len(), 3);
    }
}
