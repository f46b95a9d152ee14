/// Plottable dataset entries and the consumer-side dimension selector.
use crate::source::DatasetHandle;
use parking_lot::RwLock;
use std::sync::Arc;

/// A group-level declaration of its primary plotted dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignalRef {
    /// Absolute path of the declaring group.
    pub group: String,
    /// Name of the child the group declares as its signal.
    pub signal: String,
}

impl SignalRef {
    /// Absolute path of the declared signal dataset.
    pub fn signal_path(&self) -> String {
        if self.group == "/" {
            format!("/{}", self.signal)
        } else {
            format!("{}/{}", self.group, self.signal)
        }
    }
}

/// One dimension as seen by a dimension picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimension {
    pub size: usize,
    /// Selected slice index along this dimension.
    pub slice: usize,
}

/// Per-dataset dimension picker state owned by a plotting consumer.
///
/// The live view pushes every refreshed shape into it so that slice
/// indices never point past the end of a dimension.
#[derive(Debug, Default)]
pub struct DimensionSelector {
    dims: RwLock<Vec<Dimension>>,
}

impl DimensionSelector {
    pub fn new(shape: &[usize]) -> Self {
        let selector = Self::default();
        selector.update_shape(shape);
        selector
    }

    /// Adopt a new shape, keeping existing slice choices where still valid.
    pub fn update_shape(&self, shape: &[usize]) {
        let mut dims = self.dims.write();
        let previous = std::mem::take(&mut *dims);
        *dims = shape
            .iter()
            .enumerate()
            .map(|(i, &size)| {
                let slice = previous.get(i).map_or(0, |d| d.slice);
                Dimension {
                    size,
                    slice: slice.min(size.saturating_sub(1)),
                }
            })
            .collect();
    }

    /// Select slice `index` along dimension `dim`. Out-of-range requests
    /// are clamped.
    pub fn select(&self, dim: usize, index: usize) {
        if let Some(d) = self.dims.write().get_mut(dim) {
            d.slice = index.min(d.size.saturating_sub(1));
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        self.dims.read().iter().map(|d| d.size).collect()
    }

    pub fn dimensions(&self) -> Vec<Dimension> {
        self.dims.read().clone()
    }
}

/// A classified, plottable dataset.
#[derive(Debug)]
pub struct DatasetEntry {
    name: String,
    data: RwLock<DatasetHandle>,
    signal_hint: Option<SignalRef>,
    /// Whether the entry was classified from a live handle.
    live: bool,
    /// Axes chosen by the consumer; cleared on every refresh.
    axes: RwLock<Option<Vec<String>>>,
    selector: RwLock<Option<Arc<DimensionSelector>>>,
}

impl DatasetEntry {
    pub fn new(
        name: impl Into<String>,
        data: DatasetHandle,
        signal_hint: Option<SignalRef>,
        live: bool,
    ) -> Self {
        Self {
            name: name.into(),
            data: RwLock::new(data),
            signal_hint,
            live,
            axes: RwLock::new(None),
            selector: RwLock::new(None),
        }
    }

    /// Absolute path of the dataset, e.g. `/entry/data/signal`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> DatasetHandle {
        self.data.read().clone()
    }

    /// Point the entry at a dataset from a replacement handle.
    pub(crate) fn rebind(&self, data: DatasetHandle) {
        *self.data.write() = data;
    }

    pub fn signal_hint(&self) -> Option<&SignalRef> {
        self.signal_hint.as_ref()
    }

    /// `true` when this entry is the dataset its group declares as signal.
    pub fn is_signal(&self) -> bool {
        self.signal_hint
            .as_ref()
            .is_some_and(|s| s.signal_path() == self.name)
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn shape(&self) -> Vec<usize> {
        self.data.read().shape()
    }

    pub fn axes(&self) -> Option<Vec<String>> {
        self.axes.read().clone()
    }

    pub fn set_axes(&self, axes: Vec<String>) {
        *self.axes.write() = Some(axes);
    }

    pub fn clear_axes(&self) {
        *self.axes.write() = None;
    }

    pub fn selector(&self) -> Option<Arc<DimensionSelector>> {
        self.selector.read().clone()
    }

    /// Install the consumer's dimension picker for this dataset.
    pub fn attach_selector(&self, selector: Arc<DimensionSelector>) {
        *self.selector.write() = Some(selector);
    }
}
