/// The classified dataset registry of one live view.
///
/// Every map sits behind its own `RwLock` so readers (max-shape queries,
/// registry export) can run while the refresh worker extends it. Keys are
/// absolute paths with a leading `/`.
use super::dataset::{DatasetEntry, SignalRef};
use crate::source::DatasetHandle;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Plottable entries, label candidates and signal hints of one view.
#[derive(Debug, Default)]
pub struct DatasetRegistry {
    datasets: RwLock<HashMap<String, Arc<DatasetEntry>>>,
    label_candidates: RwLock<HashMap<String, DatasetHandle>>,
    signal_hints: RwLock<HashMap<String, SignalRef>>,
    label: RwLock<Option<String>>,
}

impl DatasetRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `path` is already a plottable entry.
    pub fn contains(&self, path: &str) -> bool {
        self.datasets.read().contains_key(path)
    }

    /// Insert unless the path is already classified. Returns `true` when
    /// the entry was added.
    pub fn insert(&self, entry: DatasetEntry) -> bool {
        let mut datasets = self.datasets.write();
        if datasets.contains_key(entry.name()) {
            return false;
        }
        datasets.insert(entry.name().to_string(), Arc::new(entry));
        true
    }

    /// Shared entry for `path`. The same `Arc` is returned for the life of
    /// the entry.
    pub fn get(&self, path: &str) -> Option<Arc<DatasetEntry>> {
        self.datasets.read().get(path).cloned()
    }

    /// All entries, sorted by path.
    pub fn entries(&self) -> Vec<Arc<DatasetEntry>> {
        let mut entries: Vec<_> = self.datasets.read().values().cloned().collect();
        entries.sort_unstable_by(|a, b| a.name().cmp(b.name()));
        entries
    }

    /// All dataset paths, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.datasets.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// Drop every dataset whose path is not in `present`, returning the
    /// removed paths sorted.
    pub fn retain_paths(&self, present: &HashSet<String>) -> Vec<String> {
        let mut datasets = self.datasets.write();
        let mut removed: Vec<String> = datasets
            .keys()
            .filter(|k| !present.contains(*k))
            .cloned()
            .collect();
        for path in &removed {
            datasets.remove(path);
        }
        removed.sort_unstable();
        removed
    }

    /// Forget the axis names of every entry. Run after a local reload, when
    /// axes are re-resolved against the final file.
    pub fn clear_axes(&self) {
        for entry in self.datasets.read().values() {
            entry.clear_axes();
        }
    }

    /// No plottable entry yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.datasets.read().is_empty()
    }

    /// Number of plottable entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.datasets.read().len()
    }

    // ── Label candidates ───────────────────────────────

    /// Record a label candidate unless already present.
    pub fn add_label_candidate(&self, path: &str, data: DatasetHandle) -> bool {
        let mut candidates = self.label_candidates.write();
        if candidates.contains_key(path) {
            return false;
        }
        candidates.insert(path.to_string(), data);
        true
    }

    /// The dataset recorded for a label candidate.
    pub fn label_candidate(&self, path: &str) -> Option<DatasetHandle> {
        self.label_candidates.read().get(path).cloned()
    }

    /// Candidate paths, sorted.
    pub fn label_candidates(&self) -> Vec<String> {
        let mut names: Vec<_> = self.label_candidates.read().keys().cloned().collect();
        names.sort_unstable();
        names
    }

    /// The chosen label path, if any.
    pub fn label(&self) -> Option<String> {
        self.label.read().clone()
    }

    /// Set the label only if none has been chosen yet.
    pub fn set_label_if_unset(&self, path: &str) -> bool {
        let mut label = self.label.write();
        if label.is_some() {
            return false;
        }
        *label = Some(path.to_string());
        true
    }

    // ── Signal hints ───────────────────────────────────

    /// Remember that `path` sits under a group naming a signal. Overwrites
    /// any earlier hint for the same path.
    pub fn record_signal_hint(&self, path: &str, signal: SignalRef) {
        self.signal_hints.write().insert(path.to_string(), signal);
    }

    /// Hint recorded for `path`.
    pub fn signal_hint(&self, path: &str) -> Option<SignalRef> {
        self.signal_hints.read().get(path).cloned()
    }

    /// Snapshot of every recorded hint.
    pub fn signal_hints(&self) -> HashMap<String, SignalRef> {
        self.signal_hints.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{ElementType, MemoryDataset};

    fn entry(path: &str) -> DatasetEntry {
        DatasetEntry::new(
            path,
            Arc::new(MemoryDataset::new(path, ElementType::Float, &[3, 3])),
            None,
            true,
        )
    }

    #[test]
    fn test_insert_is_first_wins() {
        let reg = DatasetRegistry::new();
        assert!(reg.insert(entry("/a")));
        let first = reg.get("/a").unwrap();
        assert!(!reg.insert(entry("/a")));
        assert!(Arc::ptr_eq(&first, &reg.get("/a").unwrap()));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_retain_paths() {
        let reg = DatasetRegistry::new();
        reg.insert(entry("/a"));
        reg.insert(entry("/b"));
        reg.insert(entry("/c"));
        let keep: HashSet<String> = ["/b".to_string()].into_iter().collect();
        assert_eq!(reg.retain_paths(&keep), vec!["/a", "/c"]);
        assert_eq!(reg.names(), vec!["/b"]);
    }

    #[test]
    fn test_label_set_once() {
        let reg = DatasetRegistry::new();
        assert!(reg.set_label_if_unset("/x"));
        assert!(!reg.set_label_if_unset("/y"));
        assert_eq!(reg.label().as_deref(), Some("/x"));
    }

    #[test]
    fn test_label_candidates_deduplicated() {
        let reg = DatasetRegistry::new();
        let d: DatasetHandle = Arc::new(MemoryDataset::new("t", ElementType::Float, &[]));
        assert!(reg.add_label_candidate("/t", d.clone()));
        assert!(!reg.add_label_candidate("/t", d));
        assert_eq!(reg.label_candidates(), vec!["/t"]);
    }
}
