/// Error types for the collaborator seams.
///
/// None of these escape the public `LiveView` / `EventRouter` operations:
/// those log and degrade. They are returned by the tree sources, the
/// message bus and the config loader so the caller can decide how to log.
use thiserror::Error;

/// Failure to open, refresh or resize a tree or dataset.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("source for {path} is unreachable: {reason}")]
    Unreachable { path: String, reason: String },

    #[error("no tree available for {0}")]
    NotFound(String),

    #[error("malformed tree in {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("dataset {name} could not be refreshed: {reason}")]
    Dataset { name: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure talking to the message bus.
#[derive(Error, Debug)]
pub enum BusError {
    #[error("could not subscribe to {topic}: {reason}")]
    Subscribe { topic: String, reason: String },
}

/// Failure reading the tracker configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type SourceResult<T> = std::result::Result<T, SourceError>;
