//! Core types for rom-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};

/// Unique identifier for a download task
///
/// Derived from the wall clock (milliseconds since the Unix epoch). Ids handed out by
/// one process are strictly increasing, so two tasks started in the same millisecond
/// still get distinct ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub i64);

static LAST_TASK_ID: AtomicI64 = AtomicI64::new(0);

impl TaskId {
    /// Generate a fresh, time-derived task id
    pub fn generate() -> Self {
        let now = Utc::now().timestamp_millis();
        let mut last = LAST_TASK_ID.load(Ordering::Relaxed);
        loop {
            let next = now.max(last + 1);
            match LAST_TASK_ID.compare_exchange_weak(
                last,
                next,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Self(next),
                Err(actual) => last = actual,
            }
        }
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for TaskId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// A download intent issued by the UI for one catalog entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Source URL from the catalog
    pub url: String,
    /// Target platform identifier (e.g. "snes", "ps3")
    pub platform: String,
    /// Display name of the game
    pub name: String,
    /// Unpack the payload after transfer
    #[serde(default)]
    pub extract: bool,
}

impl DownloadRequest {
    /// Create a request that keeps the downloaded file as-is
    pub fn new(
        url: impl Into<String>,
        platform: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            platform: platform.into(),
            name: name.into(),
            extract: false,
        }
    }

    /// Request archive extraction after the transfer
    #[must_use]
    pub fn with_extract(mut self, extract: bool) -> Self {
        self.extract = extract;
        self
    }
}

/// Progress-reporting stage of a task
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Bytes are being received from the network
    #[default]
    Transferring,
    /// The downloaded archive is being unpacked
    Extracting,
}

/// Snapshot of a task's progress
///
/// Built as a whole value and swapped into the registry, so readers never see a
/// half-updated snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    /// Bytes processed in the current phase
    pub bytes_done: u64,
    /// Total bytes for the current phase (0 = unknown)
    pub total_bytes: u64,
    /// Current phase
    pub phase: Phase,
    /// Percent complete, in [0, 100]; 0 when the total is unknown
    pub percent: f32,
}

impl ProgressState {
    /// Build a snapshot, deriving the percentage
    pub fn new(phase: Phase, bytes_done: u64, total_bytes: u64) -> Self {
        Self {
            bytes_done,
            total_bytes,
            phase,
            percent: percent_of(bytes_done, total_bytes),
        }
    }
}

/// Percentage of `done` over `total`, clamped to [0, 100]; 0 when total is 0
pub fn percent_of(done: u64, total: u64) -> f32 {
    if total == 0 {
        return 0.0;
    }
    let pct = done as f64 / total as f64 * 100.0;
    pct.clamp(0.0, 100.0) as f32
}

/// Receiver of progress snapshots from the transport and the extractors
///
/// Implementations must be cheap: `report` is called once per received chunk or
/// extracted entry.
pub trait ProgressSink: Send + Sync {
    /// Publish a new snapshot
    fn report(&self, progress: ProgressState);
}

/// Terminal result of a task
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Whether the task succeeded
    pub success: bool,
    /// Human-readable result message
    pub message: String,
}

impl Outcome {
    /// Successful outcome
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Failed outcome
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Result of polling a task
#[derive(Clone, Debug, PartialEq)]
pub enum TaskPoll {
    /// Still running, with its latest progress snapshot
    Running(ProgressState),
    /// Finished, with its terminal outcome
    Finished(Outcome),
}

/// Status stored in a history entry
///
/// The serialized names match the history files written by earlier frontends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryStatus {
    /// Task in flight
    #[serde(rename = "downloading")]
    Downloading,
    /// Task succeeded
    #[serde(rename = "Download_OK")]
    DownloadOk,
    /// Task failed or was cancelled
    #[serde(rename = "Erreur")]
    Error,
}

impl HistoryStatus {
    /// Whether this status is final
    pub fn is_terminal(&self) -> bool {
        !matches!(self, HistoryStatus::Downloading)
    }
}

/// Durable record of a past or in-flight download
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Task that produced this entry (absent in entries written by older frontends)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,

    /// Platform identifier
    pub platform: String,

    /// Game display name
    #[serde(rename = "game_name")]
    pub name: String,

    /// Source URL
    pub url: String,

    /// Current status
    pub status: HistoryStatus,

    /// Progress snapshot in percent
    #[serde(default)]
    pub progress: f32,

    /// Result or status message
    #[serde(default)]
    pub message: String,

    /// When the entry was created or last changed
    pub timestamp: DateTime<Utc>,
}

/// Archive type detected by file extension
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveType {
    /// RAR archive (.rar)
    Rar,
    /// ZIP archive (.zip)
    Zip,
}

/// Summary of a finished extraction
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Files written to disk
    pub files: Vec<PathBuf>,
    /// Top-level directory renamed by a platform rule, as (old, new)
    pub renamed: Option<(PathBuf, PathBuf)>,
}

/// Event emitted during a task's lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Task registered and handed to a worker
    Queued {
        /// Task ID
        id: TaskId,
        /// Game display name
        name: String,
    },

    /// Progress snapshot changed
    Progress {
        /// Task ID
        id: TaskId,
        /// New snapshot
        progress: ProgressState,
    },

    /// Transfer finished, archive extraction started
    Extracting {
        /// Task ID
        id: TaskId,
        /// Archive being unpacked
        archive: PathBuf,
    },

    /// Task reached a terminal outcome
    Finished {
        /// Task ID
        id: TaskId,
        /// The outcome
        outcome: Outcome,
    },

    /// Graceful shutdown initiated
    Shutdown,
}
