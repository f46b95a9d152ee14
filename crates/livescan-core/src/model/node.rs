/// A single node in the arena-allocated data tree.
///
/// Nodes are stored in a flat `Vec<TreeNode>`. A node records the group
/// that created it as `parent`, but may additionally be linked under other
/// groups (HDF5-style hard links), so children are kept as index lists
/// rather than a sibling chain.
use crate::source::DatasetHandle;
use compact_str::CompactString;

/// Lightweight index into the arena `Vec<TreeNode>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeIndex(pub u32);

impl NodeIndex {
    /// Create a new `NodeIndex` from a `usize`.
    #[inline]
    pub fn new(index: usize) -> Self {
        debug_assert!(index <= u32::MAX as usize, "NodeIndex overflow");
        Self(index as u32)
    }

    /// Return the index as a `usize` for Vec indexing.
    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

/// A string-valued attribute attached to a group or dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: CompactString,
    pub value: CompactString,
}

/// What a node holds.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// A container of further groups and datasets.
    Group,
    /// A leaf carrying a (possibly still growing) dataset.
    Dataset(DatasetHandle),
}

/// A group or dataset in the tree.
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// Node name only (NOT the full path).
    pub name: CompactString,

    /// The group this node was created under. `None` for the root.
    pub parent: Option<NodeIndex>,

    /// Direct children in insertion order (groups only).
    pub children: Vec<NodeIndex>,

    pub attributes: Vec<Attribute>,

    pub kind: NodeKind,
}

impl TreeNode {
    /// Create a new group node.
    pub fn new_group(name: CompactString, parent: Option<NodeIndex>) -> Self {
        Self {
            name,
            parent,
            children: Vec::new(),
            attributes: Vec::new(),
            kind: NodeKind::Group,
        }
    }

    /// Create a new dataset node.
    pub fn new_dataset(
        name: CompactString,
        data: DatasetHandle,
        parent: Option<NodeIndex>,
    ) -> Self {
        Self {
            name,
            parent,
            children: Vec::new(),
            attributes: Vec::new(),
            kind: NodeKind::Dataset(data),
        }
    }

    #[inline]
    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group)
    }

    /// The dataset handle, if this node is a dataset.
    pub fn dataset(&self) -> Option<&DatasetHandle> {
        match &self.kind {
            NodeKind::Dataset(data) => Some(data),
            NodeKind::Group => None,
        }
    }

    /// Look up an attribute value by name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }
}
