/// Event router — turns scan and processing lifecycle messages into live
/// view transitions and listener notifications.
///
/// | Event                          | Action                                         |
/// |--------------------------------|------------------------------------------------|
/// | scan / job started             | open a `LiveView`, notify `file_opened`         |
/// | scan / job running (any event) | notify `refresh_requested`, droppable refresh  |
/// | scan / job ended               | durable `local_reload`, notify `local_reload`  |
///
/// The router is dormant until the first listener registers. At that point
/// (and only if a data server is configured) it starts a refresh worker,
/// subscribes to both topics, and opens views for any jobs the job queue
/// reports as already running. When the last listener leaves it closes the
/// subscriptions and drops the worker, so an unobserved router holds no
/// threads or subscriptions.
///
/// Notifications run synchronously on the thread delivering the message;
/// listeners should hand work off rather than block.
pub mod bus;
pub mod events;

pub use bus::{
    EventHandler, JobQueueIntrospection, LocalBus, MessageBus, PropertyFilter, StaticJobQueue,
    Subscription,
};
pub use events::{ProcessingEvent, ScanEvent, Status};

use crate::config::{DataServerEndpoint, TrackerConfig};
use crate::scheduler::RefreshScheduler;
use crate::source::TreeSources;
use crate::view::LiveView;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Receives live-file notifications.
pub trait LiveFileListener: Send + Sync {
    /// A scan or processing job started writing a file.
    fn file_opened(&self, view: Arc<LiveView>);

    /// Something is running; views may have grown.
    fn refresh_requested(&self);

    /// A scan or processing job finished writing `path`.
    fn local_reload(&self, path: &str);
}

#[derive(Debug, Clone, Copy)]
enum TopicKind {
    Scan,
    Processing,
}

/// What exists only while someone is listening.
struct Session {
    scheduler: RefreshScheduler,
    subscriptions: Vec<Box<dyn Subscription>>,
}

struct RouterInner {
    config: TrackerConfig,
    bus: Arc<dyn MessageBus>,
    sources: TreeSources,
    job_queue: Option<Arc<dyn JobQueueIntrospection>>,
    listeners: RwLock<Vec<Arc<dyn LiveFileListener>>>,
    /// Serialises listener registration with connect / disconnect.
    lifecycle: Mutex<()>,
    session: Mutex<Option<Session>>,
    views: RwLock<HashMap<String, Arc<LiveView>>>,
}

/// Routes lifecycle events to live views and listeners. Cheap to clone.
#[derive(Clone)]
pub struct EventRouter {
    inner: Arc<RouterInner>,
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("listeners", &self.listener_count())
            .field("connected", &self.is_connected())
            .field("views", &self.inner.views.read().len())
            .finish()
    }
}

impl EventRouter {
    /// Create a dormant router. Nothing is subscribed or spawned until the
    /// first listener registers.
    pub fn new(
        config: TrackerConfig,
        bus: Arc<dyn MessageBus>,
        sources: TreeSources,
        job_queue: Option<Arc<dyn JobQueueIntrospection>>,
    ) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                config,
                bus,
                sources,
                job_queue,
                listeners: RwLock::new(Vec::new()),
                lifecycle: Mutex::new(()),
                session: Mutex::new(None),
                views: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a listener. The first registration connects the router.
    pub fn add_listener(&self, listener: Arc<dyn LiveFileListener>) {
        let startup_views = {
            let _lifecycle = self.inner.lifecycle.lock();
            let first = {
                let mut listeners = self.inner.listeners.write();
                if listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
                    return;
                }
                listeners.push(listener);
                listeners.len() == 1
            };
            if !first {
                return;
            }
            self.inner.connect()
        };

        for view in startup_views {
            self.inner.notify(|l| l.file_opened(view.clone()));
        }
    }

    /// Unregister a listener. Removing the last one disconnects the router.
    pub fn remove_listener(&self, listener: &Arc<dyn LiveFileListener>) {
        let _lifecycle = self.inner.lifecycle.lock();
        let now_empty = {
            let mut listeners = self.inner.listeners.write();
            let before = listeners.len();
            listeners.retain(|l| !Arc::ptr_eq(l, listener));
            listeners.len() < before && listeners.is_empty()
        };
        if now_empty {
            self.inner.disconnect();
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    /// Whether subscriptions and the worker are running.
    pub fn is_connected(&self) -> bool {
        self.inner.session.lock().is_some()
    }

    /// Views currently tracked, sorted by path.
    pub fn tracked_views(&self) -> Vec<Arc<LiveView>> {
        let mut views: Vec<_> = self.inner.views.read().values().cloned().collect();
        views.sort_unstable_by(|a, b| a.path().cmp(b.path()));
        views
    }

    /// The tracked view for `path`, if any.
    pub fn view(&self, path: &str) -> Option<Arc<LiveView>> {
        self.inner.views.read().get(path).cloned()
    }

    /// Queue a durable local reload of a tracked view and stop tracking it.
    /// Returns `false` if the path is not tracked or the router is dormant.
    pub fn force_reload(&self, path: &str) -> bool {
        let Some(scheduler) = self.inner.scheduler() else {
            return false;
        };
        let Some(view) = self.inner.views.write().remove(path) else {
            return false;
        };
        scheduler.submit(move || view.local_reload());
        true
    }

    /// Wait until all work queued so far has run. Returns `true` when
    /// dormant.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        match self.inner.scheduler() {
            Some(scheduler) => scheduler.wait_idle(timeout),
            None => true,
        }
    }
}

impl RouterInner {
    fn connect(self: &Arc<Self>) -> Vec<Arc<LiveView>> {
        let Some(endpoint) = self.config.data_server.clone() else {
            debug!("No data server configured; live tracking disabled");
            return Vec::new();
        };

        let scheduler = match RefreshScheduler::start(self.config.refresh_interval()) {
            Ok(scheduler) => scheduler,
            Err(e) => {
                error!(error = %e, "Could not start refresh worker; live tracking disabled");
                return Vec::new();
            }
        };

        let topics = [
            (self.config.scan_topic.clone(), TopicKind::Scan),
            (self.config.processing_topic.clone(), TopicKind::Processing),
        ];
        let mut subscriptions: Vec<Box<dyn Subscription>> = Vec::with_capacity(topics.len());
        for (topic, kind) in topics {
            match self.bus.subscribe(&topic, self.config.property_filters()) {
                Ok(subscription) => {
                    let weak = Arc::downgrade(self);
                    subscription.on_event(Arc::new(move |message: Value| {
                        if let Some(inner) = weak.upgrade() {
                            inner.dispatch(kind, message);
                        }
                    }));
                    subscriptions.push(subscription);
                }
                Err(e) => {
                    error!(topic = %topic, error = %e, "Subscription failed; live tracking disabled");
                    for subscription in &subscriptions {
                        subscription.close();
                    }
                    return Vec::new();
                }
            }
        }

        *self.session.lock() = Some(Session {
            scheduler,
            subscriptions,
        });
        info!(host = %endpoint.host, port = endpoint.port, "Live tracking connected");

        self.open_active_jobs(&endpoint)
    }

    fn disconnect(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            for subscription in &session.subscriptions {
                subscription.close();
            }
            // Dropping the last scheduler handle lets the worker drain and exit.
            drop(session);
            self.views.write().clear();
            info!("Live tracking disconnected");
        }
    }

    fn open_active_jobs(&self, endpoint: &DataServerEndpoint) -> Vec<Arc<LiveView>> {
        let Some(job_queue) = &self.job_queue else {
            return Vec::new();
        };
        match job_queue.list_active_file_paths() {
            Ok(paths) => paths
                .iter()
                .map(|path| self.open_view(path, endpoint))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Could not list running jobs");
                Vec::new()
            }
        }
    }

    fn scheduler(&self) -> Option<RefreshScheduler> {
        self.session.lock().as_ref().map(|s| s.scheduler.clone())
    }

    fn notify(&self, f: impl Fn(&dyn LiveFileListener)) {
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            f(listener.as_ref());
        }
    }

    fn dispatch(self: &Arc<Self>, kind: TopicKind, message: Value) {
        match kind {
            TopicKind::Scan => self.on_scan_event(message),
            TopicKind::Processing => self.on_processing_event(message),
        }
    }

    fn on_scan_event(self: &Arc<Self>, message: Value) {
        let event: ScanEvent = match serde_json::from_value(message) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Unreadable scan event");
                return;
            }
        };
        let path = event.file_path.as_deref().filter(|p| !p.is_empty());

        if event.scan_start() {
            match path {
                Some(path) => self.file_started(path),
                None => warn!(scan = %event.unique_id, "Scan started without a file path"),
            }
        }
        if event.scan_end() {
            match path {
                Some(path) => self.file_finished(path),
                None => warn!(scan = %event.unique_id, "Scan ended without a file path"),
            }
        }
        if event.is_running() {
            self.request_refresh();
        }
    }

    fn on_processing_event(self: &Arc<Self>, message: Value) {
        let event: ProcessingEvent = match serde_json::from_value(message) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Unreadable processing event");
                return;
            }
        };
        let path = event.output_file_path.as_deref().filter(|p| !p.is_empty());

        if event.started() {
            match path {
                Some(path) => self.file_started(path),
                None => warn!(job = %event.unique_id, "Processing started without an output path"),
            }
        }
        if event.finished() {
            match path {
                Some(path) => self.file_finished(path),
                None => warn!(job = %event.unique_id, "Processing ended without an output path"),
            }
        }
        if event.is_running() {
            self.request_refresh();
        }
    }

    fn file_started(&self, path: &str) {
        let Some(endpoint) = self.config.data_server.clone() else {
            return;
        };
        let view = self.open_view(path, &endpoint);
        self.notify(|l| l.file_opened(view.clone()));
    }

    /// The tracked live view for `path`, opening one if there is none.
    ///
    /// Start events for one path may arrive on several transport threads at
    /// once. The remote open runs outside the lock; the check and insert run
    /// under one write lock, so every caller gets the same view.
    fn open_view(&self, path: &str, endpoint: &DataServerEndpoint) -> Arc<LiveView> {
        if let Some(existing) = self.tracked_live(path) {
            debug!(path, "Already tracking");
            return existing;
        }
        let opened = Arc::new(LiveView::open(
            path,
            &endpoint.host,
            endpoint.port,
            self.sources.clone(),
        ));

        let mut views = self.views.write();
        if let Some(existing) = views.get(path).filter(|v| v.is_live()).cloned() {
            debug!(path, "Opened concurrently; keeping the first view");
            return existing;
        }
        views.insert(path.to_string(), opened.clone());
        info!(path, "Tracking live file");
        opened
    }

    fn tracked_live(&self, path: &str) -> Option<Arc<LiveView>> {
        self.views.read().get(path).filter(|v| v.is_live()).cloned()
    }

    fn file_finished(&self, path: &str) {
        let view = self.views.write().remove(path);
        match (view, self.scheduler()) {
            (Some(view), Some(scheduler)) => scheduler.submit(move || view.local_reload()),
            (Some(_), None) => warn!(path, "No refresh worker; final reload skipped"),
            (None, _) => debug!(path, "End event for an untracked file"),
        }
        self.notify(|l| l.local_reload(path));
    }

    fn request_refresh(self: &Arc<Self>) {
        self.notify(|l| l.refresh_requested());
        let Some(scheduler) = self.scheduler() else {
            return;
        };
        let weak = Arc::downgrade(self);
        scheduler.submit_latest(move || {
            if let Some(inner) = weak.upgrade() {
                let views: Vec<Arc<LiveView>> = inner.views.read().values().cloned().collect();
                for view in views.iter().filter(|v| v.is_live()) {
                    view.refresh();
                }
            }
        });
    }
}
