/// Tree classifier — finds the datasets in a tree and sorts them into
/// plottable data, label candidates, and ignored text.
///
/// The walk is breadth-first from the root group. A dataset reachable by
/// several paths (hard links) is reported once per path; a group reachable
/// by several paths is expanded only the first time, which also keeps the
/// walk finite on cyclic links.
///
/// Classification rules for each dataset path not already registered:
/// 1. Declared shape (maximum shape when still growing, else the realised
///    shape) that is empty or all ones → label candidate, nothing else.
/// 2. Parent group declares a `signal` attribute → record a signal hint.
/// 3. Textual element type → ignored.
/// 4. Otherwise → a new `DatasetEntry`.
///
/// After the walk, the first new label candidate in walk order becomes the
/// view's label if none was chosen before.
use crate::model::{DataTree, NodeIndex};
use crate::view::dataset::{DatasetEntry, SignalRef};
use crate::view::registry::DatasetRegistry;
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// Group attribute naming the group's primary plotted child.
pub const SIGNAL_ATTRIBUTE: &str = "signal";

/// A dataset found by the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundDataset {
    /// Absolute path, e.g. `/entry/data/signal`.
    pub path: String,
    pub node: NodeIndex,
    /// The group the walk reached this dataset through.
    pub parent: NodeIndex,
    /// Absolute path of `parent` (`/` for the root).
    pub parent_path: String,
}

/// Outcome of one classification pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClassifyReport {
    /// Paths newly added as plottable datasets, in walk order.
    pub added: Vec<String>,
    /// Paths newly recorded as label candidates, in walk order.
    pub label_candidates: Vec<String>,
    /// Textual datasets that were discarded.
    pub ignored: Vec<String>,
    /// Paths skipped because they were already registered.
    pub already_known: usize,
    /// Label chosen during this pass, if any.
    pub label: Option<String>,
}

impl ClassifyReport {
    /// `true` when the pass changed nothing.
    pub fn is_unchanged(&self) -> bool {
        self.added.is_empty() && self.label_candidates.is_empty()
    }
}

/// Whether a declared shape is too small to be data.
#[inline]
pub fn is_label_shape(shape: &[usize]) -> bool {
    shape.iter().all(|&d| d == 1)
}

/// Breadth-first walk returning every dataset path in the tree.
pub fn find_datasets(tree: &DataTree) -> Vec<FoundDataset> {
    let mut found = Vec::new();
    let mut expanded: HashSet<NodeIndex> = HashSet::new();
    let mut queue: VecDeque<(NodeIndex, String)> = VecDeque::new();

    queue.push_back((tree.root(), String::new()));
    expanded.insert(tree.root());

    while let Some((group, prefix)) = queue.pop_front() {
        for &child in tree.children(group) {
            let node = tree.node(child);
            let path = format!("{prefix}/{}", node.name);
            if node.is_group() {
                if expanded.insert(child) {
                    queue.push_back((child, path));
                }
            } else {
                found.push(FoundDataset {
                    path,
                    node: child,
                    parent: group,
                    parent_path: if prefix.is_empty() {
                        "/".to_string()
                    } else {
                        prefix.clone()
                    },
                });
            }
        }
    }

    found
}

/// Every dataset path in the tree.
pub fn dataset_paths(tree: &DataTree) -> HashSet<String> {
    find_datasets(tree).into_iter().map(|f| f.path).collect()
}

/// Classify every unregistered dataset of `tree` into `registry`.
///
/// `live` is recorded on each new entry: whether it came from a handle
/// onto a file that is still being written.
pub fn classify(tree: &DataTree, registry: &DatasetRegistry, live: bool) -> ClassifyReport {
    let mut report = ClassifyReport::default();

    for found in find_datasets(tree) {
        if registry.contains(&found.path) {
            report.already_known += 1;
            continue;
        }
        let Some(data) = tree.node(found.node).dataset() else {
            continue;
        };

        let declared = data.max_shape().unwrap_or_else(|| data.shape());
        if is_label_shape(&declared) {
            if registry.add_label_candidate(&found.path, data.clone()) {
                report.label_candidates.push(found.path);
            }
            continue;
        }

        let hint = tree
            .node(found.parent)
            .attribute(SIGNAL_ATTRIBUTE)
            .map(|signal| SignalRef {
                group: found.parent_path.clone(),
                signal: signal.to_string(),
            });
        if let Some(hint) = &hint {
            registry.record_signal_hint(&found.path, hint.clone());
        }

        if data.element_type().is_textual() {
            debug!(path = %found.path, "Ignoring textual dataset");
            report.ignored.push(found.path);
            continue;
        }

        if registry.insert(DatasetEntry::new(found.path.clone(), data.clone(), hint, live)) {
            report.added.push(found.path);
        }
    }

    if registry.label().is_none() {
        if let Some(first) = report.label_candidates.first() {
            if registry.set_label_if_unset(first) {
                report.label = Some(first.clone());
            }
        }
    }

    debug!(
        added = report.added.len(),
        labels = report.label_candidates.len(),
        ignored = report.ignored.len(),
        known = report.already_known,
        "Classification pass complete"
    );
    report
}
