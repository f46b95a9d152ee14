/// JSON-described trees on disk.
///
/// The file at the tracked path holds a JSON description of the tree:
///
/// ```json
/// {
///   "attributes": { "signal": "data" },
///   "datasets": {
///     "data":  { "type": "float", "shape": [5, 5], "max_shape": [100, 5], "axes": ["x", "y"] },
///     "title": { "type": "text",  "shape": [] }
///   },
///   "groups": { "instrument": { "datasets": { "angle": { "type": "float", "shape": [1] } } } }
/// }
/// ```
///
/// Live handles re-read the file on `refresh_structure`. Datasets already
/// handed out are kept and only have their new shape staged, so a registry
/// holding them sees growth through `refresh_shape` as it would with a real
/// live reader.
use super::memory::{MemoryAxes, MemoryDataset};
use super::{
    DatasetHandle, ElementType, LocalTreeSource, RemoteTreeSource, TreeHandle, TreeHandleRef,
};
use crate::error::{SourceError, SourceResult};
use crate::model::{DataTree, NodeIndex};
use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Description of one group.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GroupSpec {
    pub attributes: BTreeMap<String, String>,
    pub datasets: BTreeMap<String, DatasetSpec>,
    pub groups: BTreeMap<String, GroupSpec>,
}

/// Description of one dataset.
#[derive(Debug, Deserialize)]
pub struct DatasetSpec {
    #[serde(rename = "type")]
    pub element_type: ElementType,
    #[serde(default)]
    pub shape: Vec<usize>,
    #[serde(default)]
    pub max_shape: Option<Vec<usize>>,
    #[serde(default)]
    pub axes: Option<Vec<String>>,
}

/// Reads JSON tree descriptions from the local filesystem.
///
/// Serves both live and final handles; the host and port of a live open
/// are only logged.
#[derive(Debug, Default, Clone)]
pub struct JsonTreeSource;

impl JsonTreeSource {
    pub fn new() -> Self {
        Self
    }
}

impl RemoteTreeSource for JsonTreeSource {
    fn open_live(&self, path: &str, host: &str, port: u16) -> SourceResult<TreeHandleRef> {
        debug!(path, host, port, "Opening live JSON tree");
        Ok(Arc::new(JsonTreeHandle::open(path, true)?))
    }
}

impl LocalTreeSource for JsonTreeSource {
    fn open_final(&self, path: &str) -> SourceResult<TreeHandleRef> {
        Ok(Arc::new(JsonTreeHandle::open(path, false)?))
    }
}

/// Handle returned by [`JsonTreeSource`].
#[derive(Debug)]
pub struct JsonTreeHandle {
    path: String,
    live: bool,
    /// Every dataset handed out so far, by absolute path.
    datasets: Mutex<HashMap<String, Arc<MemoryDataset>>>,
    tree: RwLock<Option<Arc<DataTree>>>,
}

impl JsonTreeHandle {
    /// Read and build the tree at `path`.
    pub fn open(path: &str, live: bool) -> SourceResult<Self> {
        let handle = Self {
            path: path.to_string(),
            live,
            datasets: Mutex::new(HashMap::new()),
            tree: RwLock::new(None),
        };
        handle.reload()?;
        Ok(handle)
    }

    fn reload(&self) -> SourceResult<()> {
        let spec = read_spec(Path::new(&self.path))?;
        let mut tree = DataTree::new();
        let root = tree.root();
        let mut datasets = self.datasets.lock();
        build_group(&mut tree, root, "", &spec, &mut datasets, self.live);
        *self.tree.write() = Some(Arc::new(tree));
        Ok(())
    }
}

impl TreeHandle for JsonTreeHandle {
    fn path(&self) -> &str {
        &self.path
    }

    fn tree(&self) -> Option<Arc<DataTree>> {
        self.tree.read().clone()
    }

    fn refresh_structure(&self) -> SourceResult<()> {
        if self.live {
            self.reload()?;
        }
        Ok(())
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

fn read_spec(path: &Path) -> SourceResult<GroupSpec> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| SourceError::Malformed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

fn build_group(
    tree: &mut DataTree,
    index: NodeIndex,
    prefix: &str,
    spec: &GroupSpec,
    known: &mut HashMap<String, Arc<MemoryDataset>>,
    live: bool,
) {
    for (name, value) in &spec.attributes {
        tree.set_attribute(index, name, value);
    }

    for (name, ds_spec) in &spec.datasets {
        let path = format!("{prefix}/{name}");
        let dataset = match known.get(&path) {
            Some(existing) => {
                existing.grow_to(&ds_spec.shape);
                existing.clone()
            }
            None => {
                let created = Arc::new(new_dataset(name, ds_spec, live));
                known.insert(path, created.clone());
                created
            }
        };
        let handle: DatasetHandle = dataset;
        tree.add_dataset(index, name, handle);
    }

    for (name, child) in &spec.groups {
        let child_idx = tree.add_group(index, name);
        build_group(tree, child_idx, &format!("{prefix}/{name}"), child, known, live);
    }
}

fn new_dataset(name: &str, spec: &DatasetSpec, live: bool) -> MemoryDataset {
    let mut dataset = match (&spec.max_shape, live) {
        (Some(max), true) => MemoryDataset::dynamic(name, spec.element_type, &spec.shape, max),
        _ => MemoryDataset::new(name, spec.element_type, &spec.shape),
    };
    if let Some(axes) = &spec.axes {
        let names: Vec<&str> = axes.iter().map(String::as_str).collect();
        dataset = dataset.with_axes(Arc::new(MemoryAxes::new(&names)));
    }
    dataset
}
