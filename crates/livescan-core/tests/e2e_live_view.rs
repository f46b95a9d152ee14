/// End-to-end live view tests.
///
/// These drive a `LiveView` through its whole lifecycle against the
/// in-memory source: open on a file that does not exist yet, discover
/// datasets once the writer has produced some, follow growth, then switch
/// to the final file. The in-memory source stages trees exactly as a
/// remote reader and a local reader would see them, so every branch of
/// `refresh` and `local_reload` runs without mocks.
use livescan_core::model::DataTree;
use livescan_core::source::{
    DatasetHandle, ElementType, JsonTreeSource, MemoryDataset, MemorySource, TreeSources,
};
use livescan_core::view::{LiveView, ViewState};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

const PATH: &str = "/dls/i22/data/2026/i22-4096.nxs";

// ── Helpers ──────────────────────────────────────────────────────────────────

fn open(source: &Arc<MemorySource>) -> LiveView {
    LiveView::open(PATH, "i22-control", 8690, TreeSources::from_source(source.clone()))
}

fn float(name: &str, shape: &[usize]) -> DatasetHandle {
    Arc::new(MemoryDataset::new(name, ElementType::Float, shape))
}

/// Root-level `/data` (5×5) and `/angle` (1).
fn scan_tree() -> DataTree {
    let mut tree = DataTree::new();
    let root = tree.root();
    tree.add_dataset(root, "data", float("data", &[5, 5]));
    tree.add_dataset(root, "angle", float("angle", &[1]));
    tree
}

fn names(view: &LiveView) -> Vec<String> {
    view.discovered_datasets()
        .iter()
        .map(|d| d.name().to_string())
        .collect()
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

#[test]
fn test_open_discover_reload_scenario() {
    let source = Arc::new(MemorySource::new());
    let view = open(&source);

    assert!(view.is_live());
    assert!(view.discovered_datasets().is_empty());
    assert!(view.label_candidates().is_empty());

    source.stage_live(PATH, scan_tree());
    view.refresh();

    assert_eq!(names(&view), vec!["/data"]);
    assert_eq!(view.label_candidates(), vec!["/angle"]);
    assert_eq!(view.label().as_deref(), Some("/angle"));

    let mut fin = DataTree::new();
    let root = fin.root();
    fin.add_dataset(root, "data", float("data", &[5, 5]));
    source.stage_final(PATH, fin);

    view.local_reload();
    assert_eq!(view.state(), ViewState::Finished);
    assert_eq!(names(&view), vec!["/data"]);

    view.mark_initialised();
    assert_eq!(view.datasets().len(), 1);
}

#[test]
fn test_local_reload_is_idempotent() {
    let source = Arc::new(MemorySource::new());
    source.stage_live(PATH, scan_tree());
    source.stage_final(PATH, scan_tree());
    let view = open(&source);
    view.refresh();

    view.local_reload();
    view.local_reload();
    assert_eq!(source.final_open_count(), 1);

    // A refresh on a finished view redirects to the reload and does nothing.
    let live_opens = source.live_open_count();
    view.refresh();
    assert_eq!(source.final_open_count(), 1);
    assert_eq!(source.live_open_count(), live_opens);
    assert_eq!(view.state(), ViewState::Finished);
}

#[test]
fn test_repeated_refresh_never_reclassifies() {
    let source = Arc::new(MemorySource::new());
    source.stage_live(PATH, scan_tree());
    let view = open(&source);

    view.refresh();
    let first = view.discovered_datasets();
    for _ in 0..5 {
        view.refresh();
    }
    let later = view.discovered_datasets();

    assert_eq!(first.len(), later.len());
    for (a, b) in first.iter().zip(later.iter()) {
        assert!(Arc::ptr_eq(a, b), "entry {} was replaced", a.name());
    }
    assert_eq!(view.label_candidates(), vec!["/angle"]);
}

#[test]
fn test_discovery_waits_for_first_dataset() {
    let source = Arc::new(MemorySource::new());
    let mut skeleton = DataTree::new();
    let root = skeleton.root();
    skeleton.add_group(root, "entry");
    source.stage_live(PATH, skeleton);
    let view = open(&source);

    view.refresh();
    assert!(view.discovered_datasets().is_empty());

    let mut tree = DataTree::new();
    let root = tree.root();
    let entry = tree.add_group(root, "entry");
    tree.add_dataset(entry, "data", float("data", &[2, 3]));
    source.stage_live(PATH, tree);

    view.refresh();
    assert_eq!(names(&view), vec!["/entry/data"]);
}

// ── Classification ───────────────────────────────────────────────────────────

#[test]
fn test_label_signal_and_text_classification() {
    let source = Arc::new(MemorySource::new());
    let mut tree = DataTree::new();
    let root = tree.root();
    let entry = tree.add_group(root, "entry");
    tree.set_attribute(entry, "signal", "data");
    tree.add_dataset(
        entry,
        "data",
        Arc::new(MemoryDataset::dynamic("data", ElementType::Float, &[1, 64], &[500, 64])),
    );
    tree.add_dataset(
        entry,
        "temperature",
        Arc::new(MemoryDataset::dynamic("temperature", ElementType::Float, &[1], &[1])),
    );
    tree.add_dataset(
        entry,
        "title",
        Arc::new(MemoryDataset::new("title", ElementType::Text, &[3])),
    );
    source.stage_live(PATH, tree);

    let view = open(&source);
    view.refresh();

    // A growing dataset with a single row so far is still plottable:
    // classification goes by the declared maximum shape.
    assert_eq!(names(&view), vec!["/entry/data"]);
    assert_eq!(view.label_candidates(), vec!["/entry/temperature"]);

    let data = view.dataset("/entry/data").unwrap();
    assert!(data.is_signal());
    assert!(data.is_live());
    assert_eq!(data.signal_hint().unwrap().group, "/entry");

    assert!(view.dataset("/entry/title").is_none());
    assert_eq!(
        view.max_shapes().get("/entry/data"),
        Some(&vec![500, 64])
    );
}

#[test]
fn test_linked_group_is_walked_once() {
    let source = Arc::new(MemorySource::new());
    let mut tree = DataTree::new();
    let root = tree.root();
    let entry = tree.add_group(root, "entry");
    let detector = tree.add_group(entry, "detector");
    tree.add_dataset(detector, "image", float("image", &[4, 4]));
    let data = tree.add_group(entry, "data");
    tree.link(data, detector);
    source.stage_live(PATH, tree);

    let view = open(&source);
    view.refresh();

    // The first path reached breadth-first wins.
    assert_eq!(names(&view), vec!["/entry/detector/image"]);
}

// ── Reconciliation ───────────────────────────────────────────────────────────

#[test]
fn test_reload_drops_transient_and_adds_late_datasets() {
    let source = Arc::new(MemorySource::new());
    let mut live = DataTree::new();
    let root = live.root();
    live.add_dataset(root, "data", float("data", &[5, 5]));
    live.add_dataset(root, "transient", float("transient", &[5, 2]));
    source.stage_live(PATH, live);

    let view = open(&source);
    view.refresh();
    assert_eq!(names(&view), vec!["/data", "/transient"]);

    let survivor = view.dataset("/data").unwrap();
    survivor.set_axes(vec!["x".into(), "y".into()]);

    let mut fin = DataTree::new();
    let root = fin.root();
    fin.add_dataset(root, "data", float("data", &[5, 5]));
    fin.add_dataset(root, "summary", float("summary", &[5]));
    source.stage_final(PATH, fin);

    view.local_reload();

    assert_eq!(names(&view), vec!["/data", "/summary"]);
    assert_eq!(survivor.axes(), None);
    assert!(!view.dataset("/summary").unwrap().is_live());
}

#[test]
fn test_reload_without_prior_discovery_classifies_final_file() {
    let source = Arc::new(MemorySource::new());
    source.stage_final(PATH, scan_tree());
    let view = open(&source);

    view.local_reload();

    assert_eq!(view.state(), ViewState::Finished);
    assert_eq!(names(&view), vec!["/data"]);
    assert_eq!(view.label_candidates(), vec!["/angle"]);
}

// ── JSON-described files ─────────────────────────────────────────────────────

#[test]
fn test_json_file_grows_then_finishes() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("scan.json");
    let path_str = path.to_str().unwrap();

    fs::write(
        &path,
        r#"{ "datasets": { "data": { "type": "float", "shape": [1, 8], "max_shape": [50, 8] } } }"#,
    )
    .unwrap();

    let view = LiveView::open(
        path_str,
        "localhost",
        8690,
        TreeSources::from_source(Arc::new(JsonTreeSource::new())),
    );
    view.refresh();
    assert_eq!(names(&view), vec!["/data"]);

    fs::write(
        &path,
        r#"{ "datasets": { "data": { "type": "float", "shape": [7, 8], "max_shape": [50, 8] } } }"#,
    )
    .unwrap();
    view.refresh();
    assert_eq!(view.dataset("/data").unwrap().shape(), vec![7, 8]);

    fs::write(
        &path,
        r#"{ "datasets": { "data": { "type": "float", "shape": [7, 8] } } }"#,
    )
    .unwrap();
    view.local_reload();
    assert_eq!(view.state(), ViewState::Finished);
    assert!(view.max_shapes().is_empty());
}
