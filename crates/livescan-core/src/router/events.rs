/// Lifecycle events carried on the scan and processing status topics.
///
/// Both topics publish JSON objects with camelCase fields. Only identity
/// and lifecycle fields are read; payload fields such as scan positions
/// are stripped by the subscription filters before they get here.
use serde::{Deserialize, Serialize};

/// Status of a scan or processing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    None,
    Submitted,
    Queued,
    Deferred,
    Preparing,
    Prepared,
    Running,
    Paused,
    Resumed,
    RequestPause,
    RequestResume,
    RequestTerminate,
    Finishing,
    Terminated,
    Stopped,
    Complete,
    Failed,
    Unfinished,
    /// Any status this build does not know. Never starts, runs or ends a job.
    #[serde(other)]
    Unknown,
}

impl Status {
    pub fn is_running(self) -> bool {
        matches!(self, Status::Running | Status::Resumed)
    }

    /// The job has stopped for good.
    pub fn is_final(self) -> bool {
        matches!(
            self,
            Status::Terminated
                | Status::Stopped
                | Status::Complete
                | Status::Failed
                | Status::Unfinished
        )
    }

    /// Running, paused, finishing, or with a pause/resume/terminate request
    /// pending.
    pub fn is_active(self) -> bool {
        self.is_running()
            || matches!(
                self,
                Status::Paused
                    | Status::RequestPause
                    | Status::RequestResume
                    | Status::RequestTerminate
                    | Status::Finishing
            )
    }

    /// Not yet started.
    pub fn is_before_run(self) -> bool {
        matches!(
            self,
            Status::None
                | Status::Submitted
                | Status::Queued
                | Status::Deferred
                | Status::Preparing
                | Status::Prepared
        )
    }
}

/// A message from the scan status topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanEvent {
    #[serde(default)]
    pub unique_id: String,
    #[serde(default)]
    pub name: String,
    pub status: Status,
    #[serde(default)]
    pub previous_status: Option<Status>,
    #[serde(default)]
    pub file_path: Option<String>,
}

impl ScanEvent {
    /// The scan has just moved from waiting to running.
    pub fn scan_start(&self) -> bool {
        self.status.is_running() && self.previous_status.map_or(true, Status::is_before_run)
    }

    /// The scan has just moved from active to a final status.
    pub fn scan_end(&self) -> bool {
        self.status.is_final() && self.previous_status.is_some_and(Status::is_active)
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }
}

/// A message from the processing status topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingEvent {
    #[serde(default)]
    pub unique_id: String,
    #[serde(default)]
    pub name: String,
    pub status: Status,
    #[serde(default)]
    pub previous_status: Option<Status>,
    #[serde(default)]
    pub output_file_path: Option<String>,
}

impl ProcessingEvent {
    /// The job has just entered the running status.
    pub fn started(&self) -> bool {
        self.status.is_running() && self.previous_status.map_or(true, |p| !p.is_running())
    }

    pub fn finished(&self) -> bool {
        self.status.is_final()
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }
}
