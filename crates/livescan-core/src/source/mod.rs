/// Tree sources — the narrow interfaces through which files are read.
///
/// The core never parses a data file itself. A [`RemoteTreeSource`] hands
/// out live handles onto files still being written; a [`LocalTreeSource`]
/// hands out final handles once acquisition has ended. Both return a
/// [`TreeHandle`] whose tree contains [`DynamicDataset`] leaves.
///
/// Two implementations ship with the crate:
/// - [`memory`] — staged in-memory trees, used by tests and embedders.
/// - [`json`] — trees described by a JSON file on disk, used by the
///   replay binary.
pub mod json;
pub mod memory;

pub use json::JsonTreeSource;
pub use memory::{MemoryAxes, MemoryDataset, MemorySource, MemoryTreeHandle};

use crate::error::SourceResult;
use crate::model::DataTree;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;

/// Shared handle to a dataset inside a tree.
pub type DatasetHandle = Arc<dyn DynamicDataset>;

/// Shared handle to an opened tree.
pub type TreeHandleRef = Arc<dyn TreeHandle>;

/// Element type of a dataset, as far as classification cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Integer,
    Float,
    Boolean,
    Text,
}

impl ElementType {
    /// Textual datasets are never plottable.
    #[inline]
    pub fn is_textual(self) -> bool {
        matches!(self, ElementType::Text)
    }
}

/// Axis metadata attached to a dataset.
pub trait AxesMetadata: Send + Sync + Debug {
    /// Names of the axes, one per dimension (empty string for none).
    fn axis_names(&self) -> Vec<String>;

    /// Recompute axis extents for a data shape that has grown, returning
    /// the shape the data should be resized to so data and axes agree.
    fn refresh(&self, shape: &[usize]) -> Vec<usize>;
}

/// A lazily-read dataset whose shape may grow while the file is written.
pub trait DynamicDataset: Send + Sync + Debug {
    fn name(&self) -> &str;

    fn element_type(&self) -> ElementType;

    /// Currently realised shape.
    fn shape(&self) -> Vec<usize>;

    /// Declared maximum shape. `None` once the dataset is final.
    fn max_shape(&self) -> Option<Vec<usize>>;

    /// Whether the shape can still change.
    fn is_dynamic(&self) -> bool {
        self.max_shape().is_some()
    }

    /// Pull the latest realised shape from the underlying file.
    fn refresh_shape(&self) -> SourceResult<()>;

    fn axes(&self) -> Option<Arc<dyn AxesMetadata>>;

    /// Force the realised shape.
    fn resize(&self, shape: &[usize]) -> SourceResult<()>;
}

/// An opened view onto one file.
pub trait TreeHandle: Send + Sync + Debug {
    /// The file path this handle was opened for.
    fn path(&self) -> &str;

    /// Current tree snapshot. `None` when the file has no readable tree.
    fn tree(&self) -> Option<Arc<DataTree>>;

    /// Pull in structure appended since the last snapshot.
    fn refresh_structure(&self) -> SourceResult<()>;

    /// `true` for handles onto files still being written.
    fn is_live(&self) -> bool;

    /// Whether the root group holds any entries at all.
    fn has_children(&self) -> bool {
        self.tree().is_some_and(|t| !t.is_empty())
    }
}

/// Opens live handles on files still being acquired.
pub trait RemoteTreeSource: Send + Sync {
    fn open_live(&self, path: &str, host: &str, port: u16) -> SourceResult<TreeHandleRef>;
}

/// Opens final handles on completed files.
pub trait LocalTreeSource: Send + Sync {
    fn open_final(&self, path: &str) -> SourceResult<TreeHandleRef>;
}

/// The pair of sources a `LiveView` reads through.
#[derive(Clone)]
pub struct TreeSources {
    pub remote: Arc<dyn RemoteTreeSource>,
    pub local: Arc<dyn LocalTreeSource>,
}

impl TreeSources {
    pub fn new(remote: Arc<dyn RemoteTreeSource>, local: Arc<dyn LocalTreeSource>) -> Self {
        Self { remote, local }
    }

    /// Use one source for both live and final handles.
    pub fn from_source<S>(source: Arc<S>) -> Self
    where
        S: RemoteTreeSource + LocalTreeSource + 'static,
    {
        Self {
            remote: source.clone(),
            local: source,
        }
    }
}

impl Debug for TreeSources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeSources").finish_non_exhaustive()
    }
}

/// Placeholder handle used when a file could not be opened.
///
/// Has no tree, so every consumer sees an empty file and retries later.
#[derive(Debug, Clone)]
pub struct EmptyTree {
    path: String,
}

impl EmptyTree {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl TreeHandle for EmptyTree {
    fn path(&self) -> &str {
        &self.path
    }

    fn tree(&self) -> Option<Arc<DataTree>> {
        None
    }

    fn refresh_structure(&self) -> SourceResult<()> {
        Ok(())
    }

    fn is_live(&self) -> bool {
        true
    }
}
