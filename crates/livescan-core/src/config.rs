/// Tracker configuration.
///
/// Every field has a default, so an empty JSON object is a valid config.
/// Without a `data_server` the event router stays dormant: no
/// subscriptions, no worker thread.
use crate::error::ConfigError;
use crate::router::bus::PropertyFilter;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default scan lifecycle topic.
pub const DEFAULT_SCAN_TOPIC: &str = "org.eclipse.scanning.status.topic";

/// Default processing lifecycle topic.
pub const DEFAULT_PROCESSING_TOPIC: &str = "scisoft.operation.STATUS_TOPIC";

/// Default pause after each droppable refresh.
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 1_000;

/// Where live handles are served from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataServerEndpoint {
    pub host: String,
    pub port: u16,
}

impl DataServerEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub data_server: Option<DataServerEndpoint>,
    pub scan_topic: String,
    pub processing_topic: String,
    pub refresh_interval_ms: u64,
    /// Message fields stripped before dispatch.
    pub excluded_properties: Vec<String>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            data_server: None,
            scan_topic: DEFAULT_SCAN_TOPIC.to_string(),
            processing_topic: DEFAULT_PROCESSING_TOPIC.to_string(),
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            excluded_properties: vec!["position".to_string(), "scanRequest".to_string()],
        }
    }
}

impl TrackerConfig {
    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Builder-style endpoint setter.
    pub fn with_data_server(mut self, host: impl Into<String>, port: u16) -> Self {
        self.data_server = Some(DataServerEndpoint::new(host, port));
        self
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn property_filters(&self) -> Vec<PropertyFilter> {
        self.excluded_properties
            .iter()
            .cloned()
            .map(PropertyFilter::Exclude)
            .collect()
    }
}
