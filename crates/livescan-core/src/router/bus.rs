/// Message-bus and job-queue seams, plus an in-process bus.
///
/// The router only needs to subscribe to a topic with property filters,
/// attach a handler, and close the subscription later. Handlers run on the
/// transport's thread and must return quickly.
use crate::error::BusError;
use parking_lot::RwLock;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

/// Callback invoked for every message on a subscription.
pub type EventHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// A transformation the transport applies before dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyFilter {
    /// Remove a top-level field from every message.
    Exclude(String),
}

impl PropertyFilter {
    pub fn apply(&self, message: &mut Value) {
        match self {
            PropertyFilter::Exclude(field) => {
                if let Value::Object(map) = message {
                    map.remove(field);
                }
            }
        }
    }
}

/// A live subscription to one topic.
pub trait Subscription: Send + Sync {
    fn topic(&self) -> &str;

    /// Add a handler for subsequent messages.
    fn on_event(&self, handler: EventHandler);

    /// Stop delivery. Idempotent.
    fn close(&self);
}

/// The transport used to reach the message bus.
pub trait MessageBus: Send + Sync {
    fn subscribe(
        &self,
        topic: &str,
        filters: Vec<PropertyFilter>,
    ) -> Result<Box<dyn Subscription>, BusError>;
}

/// Lists the file paths of scans and processing jobs already running.
pub trait JobQueueIntrospection: Send + Sync {
    fn list_active_file_paths(&self) -> Result<Vec<String>, BusError>;
}

/// A fixed set of active file paths.
#[derive(Debug, Default, Clone)]
pub struct StaticJobQueue {
    paths: Vec<String>,
}

impl StaticJobQueue {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

impl JobQueueIntrospection for StaticJobQueue {
    fn list_active_file_paths(&self) -> Result<Vec<String>, BusError> {
        Ok(self.paths.clone())
    }
}

// ─── In-process bus ─────────────────────────────────────────────────────────

struct SubscriptionState {
    topic: String,
    filters: Vec<PropertyFilter>,
    handlers: RwLock<Vec<EventHandler>>,
    closed: AtomicBool,
}

#[derive(Default)]
struct BusInner {
    subscriptions: RwLock<Vec<Arc<SubscriptionState>>>,
    unavailable: AtomicBool,
}

/// In-process message bus.
///
/// `publish` dispatches synchronously on the caller's thread, which plays
/// the part of the transport thread.
#[derive(Clone, Default)]
pub struct LocalBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBus")
            .field("subscriptions", &self.inner.subscriptions.read().len())
            .finish()
    }
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `subscribe` calls fail, as a broken transport would.
    pub fn set_available(&self, available: bool) {
        self.inner.unavailable.store(!available, Ordering::Relaxed);
    }

    /// Deliver `message` to every open subscription on `topic`.
    /// Returns the number of handlers invoked.
    pub fn publish(&self, topic: &str, message: Value) -> usize {
        // Snapshot so handlers may subscribe or close without deadlocking.
        let targets: Vec<Arc<SubscriptionState>> = self
            .inner
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.topic == topic && !s.closed.load(Ordering::Acquire))
            .cloned()
            .collect();

        let mut delivered = 0;
        for sub in targets {
            let mut filtered = message.clone();
            for filter in &sub.filters {
                filter.apply(&mut filtered);
            }
            let handlers = sub.handlers.read().clone();
            for handler in handlers {
                handler(filtered.clone());
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of open subscriptions on `topic`.
    pub fn subscription_count(&self, topic: &str) -> usize {
        self.inner
            .subscriptions
            .read()
            .iter()
            .filter(|s| s.topic == topic)
            .count()
    }
}

impl MessageBus for LocalBus {
    fn subscribe(
        &self,
        topic: &str,
        filters: Vec<PropertyFilter>,
    ) -> Result<Box<dyn Subscription>, BusError> {
        if self.inner.unavailable.load(Ordering::Relaxed) {
            return Err(BusError::Subscribe {
                topic: topic.to_string(),
                reason: "transport unavailable".to_string(),
            });
        }
        let state = Arc::new(SubscriptionState {
            topic: topic.to_string(),
            filters,
            handlers: RwLock::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        self.inner.subscriptions.write().push(state.clone());
        debug!(topic, "Subscribed");
        Ok(Box::new(LocalSubscription {
            state,
            bus: Arc::downgrade(&self.inner),
        }))
    }
}

struct LocalSubscription {
    state: Arc<SubscriptionState>,
    bus: Weak<BusInner>,
}

impl Subscription for LocalSubscription {
    fn topic(&self) -> &str {
        &self.state.topic
    }

    fn on_event(&self, handler: EventHandler) {
        self.state.handlers.write().push(handler);
    }

    fn close(&self) {
        if self.state.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            bus.subscriptions
                .write()
                .retain(|s| !Arc::ptr_eq(s, &self.state));
        }
        debug!(topic = %self.state.topic, "Subscription closed");
    }
}

impl Drop for LocalSubscription {
    fn drop(&mut self) {
        self.close();
    }
}
