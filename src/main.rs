//! LiveScan — replays lifecycle events against JSON-described files.
//!
//! Reads one JSON object per line from stdin:
//!
//! ```text
//! {"topic": "org.eclipse.scanning.status.topic", "message": {"status": "RUNNING", ...}}
//! ```
//!
//! and publishes each message on an in-process bus the tracker is
//! subscribed to. Files named in the events are read with the JSON tree
//! source. When input ends the tracker drains its queue and prints what
//! each view ended up with.
//!
//! Usage: `livescan [config.json] < events.jsonl`

use anyhow::Context;
use livescan_core::config::TrackerConfig;
use livescan_core::router::{EventRouter, LiveFileListener, LocalBus};
use livescan_core::source::{JsonTreeSource, TreeSources};
use livescan_core::view::LiveView;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 8690;

#[derive(Deserialize)]
struct ReplayLine {
    topic: String,
    message: Value,
}

/// Keeps every opened view and logs notifications.
#[derive(Default)]
struct ReplayListener {
    views: Mutex<Vec<Arc<LiveView>>>,
}

impl LiveFileListener for ReplayListener {
    fn file_opened(&self, view: Arc<LiveView>) {
        tracing::info!(path = view.path(), "File opened");
        self.views.lock().push(view);
    }

    fn refresh_requested(&self) {
        for view in self.views.lock().iter() {
            if !view.is_initialised() && !view.discovered_datasets().is_empty() {
                view.mark_initialised();
            }
        }
    }

    fn local_reload(&self, path: &str) {
        tracing::info!(path, "File finished");
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => TrackerConfig::load(Path::new(&path))
            .with_context(|| format!("loading config {path}"))?,
        None => TrackerConfig::default(),
    };
    let config = if config.data_server.is_none() {
        config.with_data_server(DEFAULT_HOST, DEFAULT_PORT)
    } else {
        config
    };

    tracing::info!(
        scan_topic = %config.scan_topic,
        processing_topic = %config.processing_topic,
        "LiveScan starting"
    );

    let bus = LocalBus::new();
    let sources = TreeSources::from_source(Arc::new(JsonTreeSource::new()));
    let router = EventRouter::new(config, Arc::new(bus.clone()), sources, None);

    let replay = Arc::new(ReplayListener::default());
    let listener: Arc<dyn LiveFileListener> = replay.clone();
    router.add_listener(listener.clone());

    let stdin = std::io::stdin();
    for (number, line) in stdin.lock().lines().enumerate() {
        let line = line.context("reading stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ReplayLine>(&line) {
            Ok(entry) => {
                bus.publish(&entry.topic, entry.message);
            }
            Err(e) => tracing::warn!(line = number + 1, error = %e, "Skipping malformed line"),
        }
    }

    if !router.wait_idle(Duration::from_secs(30)) {
        tracing::warn!("Refresh queue did not drain in time");
    }

    for view in replay.views.lock().iter() {
        view.mark_initialised();
        let datasets: Vec<String> = view
            .datasets()
            .iter()
            .map(|d| format!("{} {:?}", d.name(), d.shape()))
            .collect();
        tracing::info!(
            path = view.path(),
            state = ?view.state(),
            label = ?view.label(),
            datasets = ?datasets,
            "View summary"
        );
    }

    router.remove_listener(&listener);
    Ok(())
}
