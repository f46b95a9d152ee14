/// Live view — the tracked state of one file that may still be written.
///
/// A `LiveView` owns the current storage handle for its path and the
/// classified dataset registry. It moves through two states:
///
/// ```text
///   Live ──local_reload()──▶ Finished
/// ```
///
/// While `Live`, `refresh()` either discovers datasets (first pass) or
/// refreshes the shapes of known ones (steady state). `local_reload()`
/// swaps in the final handle from the local reader, reconciles the
/// registry against it, and moves to `Finished`, after which both calls
/// are no-ops.
///
/// # Concurrency
///
/// The handle sits behind a `RwLock<TreeHandleRef>` and is only ever
/// replaced wholesale, so readers never see a half-swapped handle.
/// `refresh` and `local_reload` are serialised per view by an update
/// lock; the service additionally runs them on its single refresh worker.
///
/// # Errors
///
/// Nothing here returns an error. Open failures degrade to an empty
/// placeholder handle, per-dataset failures are logged and skipped, and a
/// missing final file leaves the view `Live` for a later retry.
pub mod dataset;
pub mod registry;

pub use dataset::{DatasetEntry, Dimension, DimensionSelector, SignalRef};
pub use registry::DatasetRegistry;

use crate::classify::{self, ClassifyReport};
use crate::source::{DatasetHandle, EmptyTree, TreeHandleRef, TreeSources};
use chrono::{DateTime, Local};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lifecycle of a live view. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewState {
    /// The file is still being written.
    Live,
    /// The final file has been loaded; the view is read-only.
    Finished,
}

/// Tracked state of one acquisition file.
#[derive(Debug)]
pub struct LiveView {
    path: String,
    host: String,
    port: u16,
    sources: TreeSources,
    handle: RwLock<TreeHandleRef>,
    state: RwLock<ViewState>,
    initialised: AtomicBool,
    registry: DatasetRegistry,
    /// Serialises `refresh` and `local_reload` on this view.
    update_lock: Mutex<()>,
    /// When the view was opened.
    pub opened_at: DateTime<Local>,
}

impl LiveView {
    /// Open a live view on `path`.
    ///
    /// Always succeeds. If the remote reader cannot supply a handle the
    /// view starts on an empty placeholder and retries on refresh.
    pub fn open(path: &str, host: &str, port: u16, sources: TreeSources) -> Self {
        let handle = open_live_handle(&sources, path, host, port);
        Self {
            path: path.to_string(),
            host: host.to_string(),
            port,
            sources,
            handle: RwLock::new(handle),
            state: RwLock::new(ViewState::Live),
            initialised: AtomicBool::new(false),
            registry: DatasetRegistry::new(),
            update_lock: Mutex::new(()),
            opened_at: Local::now(),
        }
    }

    /// Path of the file being tracked, as the acquisition reported it.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Data server host the live handle was opened against.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Data server port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `Live` until the first local reload, `Finished` after it.
    pub fn state(&self) -> ViewState {
        *self.state.read()
    }

    /// Shorthand for `state() == ViewState::Live`.
    pub fn is_live(&self) -> bool {
        self.state() == ViewState::Live
    }

    /// The current storage handle.
    pub fn handle(&self) -> TreeHandleRef {
        self.handle.read().clone()
    }

    fn swap_handle(&self, handle: TreeHandleRef) {
        *self.handle.write() = handle;
    }

    // ── Registry access ────────────────────────────────

    /// Whether [`mark_initialised`](Self::mark_initialised) has been called.
    pub fn is_initialised(&self) -> bool {
        self.initialised.load(Ordering::Acquire)
    }

    /// Called once by the owning consumer after it has seen the first
    /// successful classification. Until then [`datasets`](Self::datasets)
    /// is empty.
    pub fn mark_initialised(&self) {
        self.initialised.store(true, Ordering::Release);
    }

    /// The plottable datasets, sorted by path. Empty until initialised.
    pub fn datasets(&self) -> Vec<Arc<DatasetEntry>> {
        if !self.is_initialised() {
            return Vec::new();
        }
        self.registry.entries()
    }

    /// The registry as classified so far, regardless of initialisation.
    ///
    /// The owning consumer reads this to register entries before calling
    /// [`mark_initialised`](Self::mark_initialised).
    pub fn discovered_datasets(&self) -> Vec<Arc<DatasetEntry>> {
        self.registry.entries()
    }

    /// Look up one plottable entry by absolute path.
    pub fn dataset(&self, path: &str) -> Option<Arc<DatasetEntry>> {
        self.registry.get(path)
    }

    /// Paths of every single-element dataset seen so far, sorted.
    pub fn label_candidates(&self) -> Vec<String> {
        self.registry.label_candidates()
    }

    /// The dataset behind a label candidate path.
    pub fn label_candidate(&self, path: &str) -> Option<DatasetHandle> {
        self.registry.label_candidate(path)
    }

    /// The chosen label: the first candidate ever found. Never replaced.
    pub fn label(&self) -> Option<String> {
        self.registry.label()
    }

    /// Signal hints keyed by dataset path, including textual datasets that
    /// were not registered.
    pub fn signal_hints(&self) -> HashMap<String, SignalRef> {
        self.registry.signal_hints()
    }

    /// Declared maximum shape of every entry that is still growing.
    pub fn max_shapes(&self) -> HashMap<String, Vec<usize>> {
        self.registry
            .entries()
            .into_iter()
            .filter_map(|e| e.data().max_shape().map(|s| (e.name().to_string(), s)))
            .collect()
    }

    // ── Lifecycle ──────────────────────────────────────

    /// Bring the view up to date with the file.
    ///
    /// A finished view redirects to [`local_reload`](Self::local_reload),
    /// which is then a no-op.
    pub fn refresh(&self) {
        let _guard = self.update_lock.lock();
        if self.state() == ViewState::Finished {
            self.local_reload_locked();
            return;
        }

        let mut handle = self.handle();
        let reopened = !handle.has_children();
        if reopened {
            handle = open_live_handle(&self.sources, &self.path, &self.host, self.port);
            self.swap_handle(handle.clone());
            if !handle.has_children() {
                debug!(path = %self.path, "File still empty");
                return;
            }
        }

        if self.registry.is_empty() {
            // Groups may exist before any dataset does.
            if !reopened {
                if let Err(e) = handle.refresh_structure() {
                    warn!(path = %self.path, error = %e, "Could not refresh file structure");
                }
            }
            // First discovery only; shapes are refreshed on the next pass.
            self.discover(&handle, true);
            return;
        }

        if let Err(e) = handle.refresh_structure() {
            warn!(path = %self.path, error = %e, "Could not refresh file structure");
        }

        for entry in self.registry.entries() {
            refresh_dataset(&entry);
        }

        for entry in self.registry.entries() {
            if let Some(selector) = entry.selector() {
                entry.clear_axes();
                selector.update_shape(&entry.shape());
            }
        }
    }

    /// Switch to the final file once acquisition has ended.
    pub fn local_reload(&self) {
        let _guard = self.update_lock.lock();
        self.local_reload_locked();
    }

    fn local_reload_locked(&self) {
        if self.state() == ViewState::Finished {
            debug!(path = %self.path, "Already reloaded");
            return;
        }

        let handle = match self.sources.local.open_final(&self.path) {
            Ok(handle) => handle,
            Err(e) => {
                error!(path = %self.path, error = %e, "Could not open final file");
                return;
            }
        };
        let Some(tree) = handle.tree().filter(|t| !t.is_empty()) else {
            error!(path = %self.path, "Final file has no entries");
            return;
        };

        self.swap_handle(handle);

        if self.registry.is_empty() {
            self.report_discovery(classify::classify(&tree, &self.registry, false));
        } else {
            let report = classify::classify(&tree, &self.registry, false);
            if !report.added.is_empty() {
                debug!(path = %self.path, added = ?report.added, "New datasets in final file");
            }

            let found = classify::find_datasets(&tree);
            for f in &found {
                if let (Some(entry), Some(data)) =
                    (self.registry.get(&f.path), tree.node(f.node).dataset())
                {
                    entry.rebind(data.clone());
                }
            }
            let present: HashSet<String> = found.into_iter().map(|f| f.path).collect();
            let removed = self.registry.retain_paths(&present);
            if !removed.is_empty() {
                info!(path = %self.path, removed = ?removed, "Dropped datasets absent from final file");
            }
            self.registry.clear_axes();
        }

        *self.state.write() = ViewState::Finished;
        info!(path = %self.path, datasets = self.registry.len(), "Live view finished");
    }

    fn discover(&self, handle: &TreeHandleRef, live: bool) {
        let Some(tree) = handle.tree() else {
            return;
        };
        self.report_discovery(classify::classify(&tree, &self.registry, live));
    }

    fn report_discovery(&self, report: ClassifyReport) {
        if report.added.is_empty() {
            debug!(path = %self.path, "No plottable datasets yet");
        } else {
            info!(
                path = %self.path,
                datasets = report.added.len(),
                labels = report.label_candidates.len(),
                "Discovered datasets"
            );
        }
    }
}

fn open_live_handle(sources: &TreeSources, path: &str, host: &str, port: u16) -> TreeHandleRef {
    match sources.remote.open_live(path, host, port) {
        Ok(handle) => handle,
        Err(e) => {
            warn!(path, host, port, error = %e, "Live open failed, using empty placeholder");
            Arc::new(EmptyTree::new(path))
        }
    }
}

/// Pull the latest shape of one dynamic dataset and realign its axes.
fn refresh_dataset(entry: &DatasetEntry) {
    let data = entry.data();
    if !data.is_dynamic() {
        return;
    }
    if let Err(e) = data.refresh_shape() {
        warn!(dataset = entry.name(), error = %e, "Skipping dataset refresh");
        return;
    }
    if let Some(axes) = data.axes() {
        let refreshed = axes.refresh(&data.shape());
        if let Err(e) = data.resize(&refreshed) {
            warn!(dataset = entry.name(), error = %e, "Could not resize to axes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DataTree;
    use crate::source::{DynamicDataset, ElementType, MemoryAxes, MemoryDataset, MemorySource};

    const PATH: &str = "/dls/i22/data/2026/scan-1.nxs";

    fn view(source: &Arc<MemorySource>) -> LiveView {
        LiveView::open(PATH, "localhost", 8690, TreeSources::from_source(source.clone()))
    }

    #[test]
    fn test_open_failure_degrades_to_empty() {
        let source = Arc::new(MemorySource::new());
        source.set_remote_available(false);
        let v = view(&source);
        assert!(!v.handle().has_children());
        assert!(v.is_live());
        v.refresh();
        assert!(v.discovered_datasets().is_empty());
        assert_eq!(source.live_open_count(), 2);
    }

    #[test]
    fn test_datasets_hidden_until_initialised() {
        let source = Arc::new(MemorySource::new());
        let mut tree = DataTree::new();
        let root = tree.root();
        tree.add_dataset(
            root,
            "data",
            Arc::new(MemoryDataset::new("data", ElementType::Float, &[5, 5])),
        );
        source.stage_live(PATH, tree);

        let v = view(&source);
        v.refresh();
        assert!(v.datasets().is_empty());
        assert_eq!(v.discovered_datasets().len(), 1);
        v.mark_initialised();
        assert_eq!(v.datasets().len(), 1);
    }

    #[test]
    fn test_steady_state_refreshes_shape_and_axes() {
        let source = Arc::new(MemorySource::new());
        let axes = Arc::new(MemoryAxes::new(&["x", "y"]).clipped(&[3, 8]));
        let data = Arc::new(
            MemoryDataset::dynamic("data", ElementType::Float, &[1, 8], &[100, 8])
                .with_axes(axes.clone()),
        );
        let mut tree = DataTree::new();
        let root = tree.root();
        tree.add_dataset(root, "data", data.clone());
        source.stage_live(PATH, tree);

        let v = view(&source);
        v.refresh();
        assert_eq!(data.refresh_count(), 0, "first pass only discovers");

        let entry = v.dataset("/data").unwrap();
        let selector = Arc::new(DimensionSelector::new(&[1, 8]));
        entry.attach_selector(selector.clone());
        entry.set_axes(vec!["x".into(), "y".into()]);

        data.grow_to(&[5, 8]);
        v.refresh();
        assert_eq!(data.refresh_count(), 1);
        assert_eq!(axes.refresh_count(), 1);
        assert_eq!(data.shape(), vec![3, 8], "resized to axis extents");
        assert_eq!(selector.shape(), vec![3, 8]);
        assert_eq!(entry.axes(), None);
        assert_eq!(v.max_shapes().get("/data"), Some(&vec![100, 8]));
    }

    #[test]
    fn test_failed_dataset_does_not_abort_pass() {
        let source = Arc::new(MemorySource::new());
        let bad = Arc::new(MemoryDataset::dynamic("a", ElementType::Float, &[1, 2], &[9, 2]));
        let good = Arc::new(MemoryDataset::dynamic("b", ElementType::Float, &[1, 2], &[9, 2]));
        let mut tree = DataTree::new();
        let root = tree.root();
        tree.add_dataset(root, "a", bad.clone());
        tree.add_dataset(root, "b", good.clone());
        source.stage_live(PATH, tree);

        let v = view(&source);
        v.refresh();
        bad.set_failing(true);
        good.grow_to(&[4, 2]);
        v.refresh();
        assert_eq!(good.shape(), vec![4, 2]);
        assert_eq!(bad.shape(), vec![1, 2]);
    }

    #[test]
    fn test_missing_final_file_keeps_view_live() {
        let source = Arc::new(MemorySource::new());
        let v = view(&source);
        v.local_reload();
        assert!(v.is_live());

        source.stage_final(PATH, DataTree::new());
        v.local_reload();
        assert!(v.is_live(), "a final file without entries is not usable");
    }

    #[test]
    fn test_reload_rebinds_survivors_to_final_data() {
        let source = Arc::new(MemorySource::new());
        let mut live = DataTree::new();
        let root = live.root();
        live.add_dataset(
            root,
            "data",
            Arc::new(MemoryDataset::dynamic("data", ElementType::Float, &[2, 5], &[9, 5])),
        );
        source.stage_live(PATH, live);
        let mut fin = DataTree::new();
        let root = fin.root();
        fin.add_dataset(
            root,
            "data",
            Arc::new(MemoryDataset::new("data", ElementType::Float, &[9, 5])),
        );
        source.stage_final(PATH, fin);

        let v = view(&source);
        v.refresh();
        let entry = v.dataset("/data").unwrap();
        v.local_reload();

        assert_eq!(v.state(), ViewState::Finished);
        assert_eq!(entry.shape(), vec![9, 5]);
        assert!(v.max_shapes().is_empty());
        assert!(!v.handle().is_live());
    }
}
