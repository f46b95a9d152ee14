/// In-memory tree source.
///
/// Trees are staged per path: `stage_live` for what a remote reader would
/// currently see of a file being written, `stage_final` for the completed
/// file. Live handles pick up a newly staged tree on `refresh_structure`,
/// and `MemoryDataset::grow_to` stages growth that a dataset only reports
/// after `refresh_shape`, which is how a writer appending frames looks to a
/// live reader.
use super::{
    AxesMetadata, DynamicDataset, ElementType, LocalTreeSource, RemoteTreeSource, TreeHandle,
    TreeHandleRef,
};
use crate::error::{SourceError, SourceResult};
use crate::model::DataTree;
use compact_str::CompactString;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

// ─── Datasets ───────────────────────────────────────────────────────────────

/// A dataset held entirely in memory.
#[derive(Debug)]
pub struct MemoryDataset {
    name: CompactString,
    element_type: ElementType,
    shape: RwLock<Vec<usize>>,
    /// Shape written by the producer but not yet seen by the reader.
    written: Mutex<Option<Vec<usize>>>,
    max_shape: RwLock<Option<Vec<usize>>>,
    axes: Option<Arc<dyn AxesMetadata>>,
    failing: AtomicBool,
    refreshes: AtomicUsize,
}

impl MemoryDataset {
    /// A final (non-growing) dataset.
    pub fn new(name: &str, element_type: ElementType, shape: &[usize]) -> Self {
        Self {
            name: CompactString::new(name),
            element_type,
            shape: RwLock::new(shape.to_vec()),
            written: Mutex::new(None),
            max_shape: RwLock::new(None),
            axes: None,
            failing: AtomicBool::new(false),
            refreshes: AtomicUsize::new(0),
        }
    }

    /// A dataset still being written, with a declared maximum shape.
    pub fn dynamic(
        name: &str,
        element_type: ElementType,
        shape: &[usize],
        max_shape: &[usize],
    ) -> Self {
        let ds = Self::new(name, element_type, shape);
        *ds.max_shape.write() = Some(max_shape.to_vec());
        ds
    }

    /// Attach axis metadata.
    pub fn with_axes(mut self, axes: Arc<dyn AxesMetadata>) -> Self {
        self.axes = Some(axes);
        self
    }

    /// Stage growth; visible after the next `refresh_shape`.
    pub fn grow_to(&self, shape: &[usize]) {
        *self.written.lock() = Some(shape.to_vec());
    }

    /// Drop the declared maximum shape, marking the dataset final.
    pub fn finalise(&self) {
        *self.max_shape.write() = None;
    }

    /// Make subsequent `refresh_shape` calls fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Number of successful `refresh_shape` calls.
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::Relaxed)
    }
}

impl DynamicDataset for MemoryDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn element_type(&self) -> ElementType {
        self.element_type
    }

    fn shape(&self) -> Vec<usize> {
        self.shape.read().clone()
    }

    fn max_shape(&self) -> Option<Vec<usize>> {
        self.max_shape.read().clone()
    }

    fn refresh_shape(&self) -> SourceResult<()> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(SourceError::Dataset {
                name: self.name.to_string(),
                reason: "read failed".to_string(),
            });
        }
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        if let Some(shape) = self.written.lock().take() {
            *self.shape.write() = shape;
        }
        Ok(())
    }

    fn axes(&self) -> Option<Arc<dyn AxesMetadata>> {
        self.axes.clone()
    }

    fn resize(&self, shape: &[usize]) -> SourceResult<()> {
        *self.shape.write() = shape.to_vec();
        Ok(())
    }
}

/// Axis metadata whose extents follow the data.
///
/// `clip` optionally caps each dimension, modelling axes that lag behind
/// the data while a scan point is half written.
#[derive(Debug, Default)]
pub struct MemoryAxes {
    names: Vec<String>,
    clip: Option<Vec<usize>>,
    refreshes: AtomicUsize,
}

impl MemoryAxes {
    pub fn new(names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|s| s.to_string()).collect(),
            clip: None,
            refreshes: AtomicUsize::new(0),
        }
    }

    /// Cap refreshed extents at `clip`.
    pub fn clipped(mut self, clip: &[usize]) -> Self {
        self.clip = Some(clip.to_vec());
        self
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::Relaxed)
    }
}

impl AxesMetadata for MemoryAxes {
    fn axis_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn refresh(&self, shape: &[usize]) -> Vec<usize> {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        match &self.clip {
            Some(clip) => shape
                .iter()
                .enumerate()
                .map(|(i, &d)| clip.get(i).map_or(d, |&c| d.min(c)))
                .collect(),
            None => shape.to_vec(),
        }
    }
}

// ─── Source ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Staging {
    live: RwLock<HashMap<String, Arc<DataTree>>>,
    finals: RwLock<HashMap<String, Arc<DataTree>>>,
}

/// In-memory implementation of both tree sources.
#[derive(Debug, Default)]
pub struct MemorySource {
    staging: Arc<Staging>,
    remote_down: AtomicBool,
    live_opens: AtomicUsize,
    final_opens: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish what a live reader currently sees of `path`.
    pub fn stage_live(&self, path: &str, tree: DataTree) {
        self.staging
            .live
            .write()
            .insert(path.to_string(), Arc::new(tree));
    }

    /// Publish the completed contents of `path`.
    pub fn stage_final(&self, path: &str, tree: DataTree) {
        self.staging
            .finals
            .write()
            .insert(path.to_string(), Arc::new(tree));
    }

    /// Simulate the remote reader being unreachable.
    pub fn set_remote_available(&self, available: bool) {
        self.remote_down.store(!available, Ordering::Relaxed);
    }

    pub fn live_open_count(&self) -> usize {
        self.live_opens.load(Ordering::Relaxed)
    }

    pub fn final_open_count(&self) -> usize {
        self.final_opens.load(Ordering::Relaxed)
    }
}

impl RemoteTreeSource for MemorySource {
    fn open_live(&self, path: &str, host: &str, port: u16) -> SourceResult<TreeHandleRef> {
        self.live_opens.fetch_add(1, Ordering::Relaxed);
        if self.remote_down.load(Ordering::Relaxed) {
            return Err(SourceError::Unreachable {
                path: path.to_string(),
                reason: format!("no route to {host}:{port}"),
            });
        }
        let tree = self
            .staging
            .live
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(path.to_string()))?;
        Ok(Arc::new(MemoryTreeHandle {
            path: path.to_string(),
            live: true,
            staging: Some(self.staging.clone()),
            tree: RwLock::new(Some(tree)),
            structure_refreshes: AtomicUsize::new(0),
        }))
    }
}

impl LocalTreeSource for MemorySource {
    fn open_final(&self, path: &str) -> SourceResult<TreeHandleRef> {
        self.final_opens.fetch_add(1, Ordering::Relaxed);
        let tree = self
            .staging
            .finals
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(path.to_string()))?;
        Ok(Arc::new(MemoryTreeHandle::finished(path, tree)))
    }
}

/// Handle returned by [`MemorySource`].
#[derive(Debug)]
pub struct MemoryTreeHandle {
    path: String,
    live: bool,
    staging: Option<Arc<Staging>>,
    tree: RwLock<Option<Arc<DataTree>>>,
    structure_refreshes: AtomicUsize,
}

impl MemoryTreeHandle {
    /// A standalone final handle over `tree`.
    pub fn finished(path: &str, tree: Arc<DataTree>) -> Self {
        Self {
            path: path.to_string(),
            live: false,
            staging: None,
            tree: RwLock::new(Some(tree)),
            structure_refreshes: AtomicUsize::new(0),
        }
    }

    pub fn structure_refresh_count(&self) -> usize {
        self.structure_refreshes.load(Ordering::Relaxed)
    }
}

impl TreeHandle for MemoryTreeHandle {
    fn path(&self) -> &str {
        &self.path
    }

    fn tree(&self) -> Option<Arc<DataTree>> {
        self.tree.read().clone()
    }

    fn refresh_structure(&self) -> SourceResult<()> {
        self.structure_refreshes.fetch_add(1, Ordering::Relaxed);
        if let Some(staging) = &self.staging {
            if let Some(latest) = staging.live.read().get(&self.path) {
                *self.tree.write() = Some(latest.clone());
            }
        }
        Ok(())
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_dataset_tree(shape: &[usize]) -> DataTree {
        let mut tree = DataTree::new();
        let root = tree.root();
        tree.add_dataset(
            root,
            "data",
            Arc::new(MemoryDataset::new("data", ElementType::Float, shape)),
        );
        tree
    }

    #[test]
    fn test_growth_visible_only_after_refresh() {
        let ds = MemoryDataset::dynamic("d", ElementType::Integer, &[1, 4], &[100, 4]);
        ds.grow_to(&[3, 4]);
        assert_eq!(ds.shape(), vec![1, 4]);
        ds.refresh_shape().unwrap();
        assert_eq!(ds.shape(), vec![3, 4]);
        assert!(ds.is_dynamic());
        ds.finalise();
        assert!(!ds.is_dynamic());
    }

    #[test]
    fn test_failing_refresh_reports_dataset_error() {
        let ds = MemoryDataset::dynamic("d", ElementType::Float, &[1], &[10]);
        ds.set_failing(true);
        assert!(matches!(ds.refresh_shape(), Err(SourceError::Dataset { .. })));
        assert_eq!(ds.refresh_count(), 0);
    }

    #[test]
    fn test_clipped_axes() {
        let axes = MemoryAxes::new(&["x", "y"]).clipped(&[2, 10]);
        assert_eq!(axes.refresh(&[5, 5]), vec![2, 5]);
        assert_eq!(axes.refresh_count(), 1);
    }

    #[test]
    fn test_open_live_requires_staged_tree() {
        let source = MemorySource::new();
        assert!(matches!(
            source.open_live("/f.nxs", "localhost", 8690),
            Err(SourceError::NotFound(_))
        ));
        source.stage_live("/f.nxs", one_dataset_tree(&[2, 2]));
        let handle = source.open_live("/f.nxs", "localhost", 8690).unwrap();
        assert!(handle.is_live());
        assert!(handle.has_children());
        assert_eq!(source.live_open_count(), 2);
    }

    #[test]
    fn test_unreachable_remote() {
        let source = MemorySource::new();
        source.stage_live("/f.nxs", one_dataset_tree(&[2, 2]));
        source.set_remote_available(false);
        assert!(matches!(
            source.open_live("/f.nxs", "host", 1),
            Err(SourceError::Unreachable { .. })
        ));
    }

    #[test]
    fn test_live_handle_picks_up_restaged_tree() {
        let source = MemorySource::new();
        source.stage_live("/f.nxs", DataTree::new());
        let handle = source.open_live("/f.nxs", "h", 1).unwrap();
        assert!(!handle.has_children());

        source.stage_live("/f.nxs", one_dataset_tree(&[4]));
        handle.refresh_structure().unwrap();
        assert!(handle.has_children());
    }

    #[test]
    fn test_open_final() {
        let source = MemorySource::new();
        assert!(source.open_final("/f.nxs").is_err());
        source.stage_final("/f.nxs", one_dataset_tree(&[4]));
        let handle = source.open_final("/f.nxs").unwrap();
        assert!(!handle.is_live());
        assert_eq!(handle.path(), "/f.nxs");
    }
}
