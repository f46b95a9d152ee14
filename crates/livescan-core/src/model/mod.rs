/// Data model for the group/dataset hierarchy of a tracked file.
///
/// Re-exports the arena-allocated tree structure and supporting types.
pub mod node;
pub mod tree;

pub use node::{Attribute, NodeIndex, NodeKind, TreeNode};
pub use tree::DataTree;
