/// Arena-backed data tree mirroring the group/dataset hierarchy of a file.
///
/// All nodes live in a single `Vec<TreeNode>` and refer to each other by
/// `NodeIndex`. Index 0 is always the root group. Trees are built once by a
/// source and then shared read-only behind an `Arc`; a source that sees new
/// structure builds a new tree rather than mutating a shared one.
use super::node::{Attribute, NodeIndex, TreeNode};
use crate::source::DatasetHandle;
use compact_str::CompactString;

/// The group/dataset hierarchy of one file.
#[derive(Debug, Clone)]
pub struct DataTree {
    /// Arena: every node in a flat vector. `nodes[0]` is the root group.
    pub nodes: Vec<TreeNode>,
}

impl Default for DataTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DataTree {
    /// Create a tree holding only an empty root group.
    pub fn new() -> Self {
        Self::with_capacity(1)
    }

    /// Create a tree with pre-allocated capacity for `estimated_nodes`.
    pub fn with_capacity(estimated_nodes: usize) -> Self {
        let mut nodes = Vec::with_capacity(estimated_nodes.max(1));
        nodes.push(TreeNode::new_group(CompactString::default(), None));
        Self { nodes }
    }

    /// The root group.
    #[inline]
    pub fn root(&self) -> NodeIndex {
        NodeIndex::new(0)
    }

    /// Allocate a new node in the arena and return its index.
    pub fn add_node(&mut self, node: TreeNode) -> NodeIndex {
        let idx = NodeIndex::new(self.nodes.len());
        self.nodes.push(node);
        idx
    }

    /// Attach `child` under `parent`, appending to the child list.
    pub fn add_child(&mut self, parent: NodeIndex, child: NodeIndex) {
        self.nodes[parent.idx()].children.push(child);
        if self.nodes[child.idx()].parent.is_none() && child != self.root() {
            self.nodes[child.idx()].parent = Some(parent);
        }
    }

    /// Create a group named `name` under `parent`.
    pub fn add_group(&mut self, parent: NodeIndex, name: &str) -> NodeIndex {
        let idx = self.add_node(TreeNode::new_group(CompactString::new(name), Some(parent)));
        self.add_child(parent, idx);
        idx
    }

    /// Create a dataset named `name` under `parent`.
    pub fn add_dataset(&mut self, parent: NodeIndex, name: &str, data: DatasetHandle) -> NodeIndex {
        let idx = self.add_node(TreeNode::new_dataset(
            CompactString::new(name),
            data,
            Some(parent),
        ));
        self.add_child(parent, idx);
        idx
    }

    /// Link an existing node under a second group (hard link).
    ///
    /// The node keeps its original `parent`; it becomes reachable by one
    /// more path.
    pub fn link(&mut self, parent: NodeIndex, child: NodeIndex) {
        if !self.nodes[parent.idx()].children.contains(&child) {
            self.nodes[parent.idx()].children.push(child);
        }
    }

    /// Set (or overwrite) an attribute on a node.
    pub fn set_attribute(&mut self, index: NodeIndex, name: &str, value: &str) {
        let attrs = &mut self.nodes[index.idx()].attributes;
        match attrs.iter_mut().find(|a| a.name == name) {
            Some(attr) => attr.value = CompactString::new(value),
            None => attrs.push(Attribute {
                name: CompactString::new(name),
                value: CompactString::new(value),
            }),
        }
    }

    /// Direct children of a node.
    #[inline]
    pub fn children(&self, parent: NodeIndex) -> &[NodeIndex] {
        &self.nodes[parent.idx()].children
    }

    /// Find a direct child by name.
    pub fn child_by_name(&self, parent: NodeIndex, name: &str) -> Option<NodeIndex> {
        self.children(parent)
            .iter()
            .copied()
            .find(|c| self.nodes[c.idx()].name == name)
    }

    /// Resolve an absolute path such as `/entry/data/signal`.
    pub fn resolve(&self, path: &str) -> Option<NodeIndex> {
        path.split('/')
            .filter(|s| !s.is_empty())
            .try_fold(self.root(), |idx, segment| self.child_by_name(idx, segment))
    }

    /// Get the node at the given index.
    #[inline]
    pub fn node(&self, index: NodeIndex) -> &TreeNode {
        &self.nodes[index.idx()]
    }

    /// Total number of nodes, root included.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the root group has no named entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes[0].children.is_empty()
    }
}
