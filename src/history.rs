//! Download history log
//!
//! An ordered list of [`HistoryEntry`] values persisted as one JSON array. Entries are
//! appended when a task starts and moved once to a terminal status when it ends. The
//! whole file is rewritten on every change, through a temp file and a rename, so a
//! crash mid-write leaves the previous version in place.

use crate::error::Result;
use crate::types::{DownloadRequest, HistoryEntry, HistoryStatus, TaskId};
use chrono::Utc;
use std::path::{Path, PathBuf};

/// Message written on entries left `downloading` by a previous run
const INTERRUPTED: &str = "interrupted before completion";

/// In-memory history, in insertion order
#[derive(Debug, Default, Clone)]
pub struct HistoryLog {
    entries: Vec<HistoryEntry>,
}

impl HistoryLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a log from existing entries
    pub fn from_entries(entries: Vec<HistoryEntry>) -> Self {
        Self { entries }
    }

    /// Load the log from `path`
    ///
    /// A missing file gives an empty log. An unreadable or corrupt file is logged and
    /// also gives an empty log, so a damaged history never blocks startup. Entries a
    /// previous run left in `downloading` are marked failed: nothing will ever finish
    /// them.
    pub async fn load(path: &Path) -> Self {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(?path, "no history file yet");
                return Self::new();
            }
            Err(e) => {
                tracing::warn!(?path, error = %e, "cannot read history file, starting empty");
                return Self::new();
            }
        };

        if contents.trim().is_empty() {
            return Self::new();
        }

        let mut log = match serde_json::from_str::<Vec<HistoryEntry>>(&contents) {
            Ok(entries) => Self::from_entries(entries),
            Err(e) => {
                tracing::warn!(?path, error = %e, "corrupt history file, starting empty");
                return Self::new();
            }
        };

        let recovered = log.fail_interrupted();
        tracing::info!(
            ?path,
            entries = log.len(),
            recovered,
            "history loaded"
        );
        log
    }

    /// Write `entries` to `path` as a pretty JSON array
    ///
    /// The file is replaced atomically.
    pub async fn save(path: &Path, entries: &[HistoryEntry]) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(entries)?;
        let tmp = temp_path(path);
        tokio::fs::write(&tmp, &json).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            tokio::fs::remove_file(&tmp).await.ok();
            return Err(e.into());
        }
        Ok(())
    }

    /// Append a `downloading` entry for a task that just started
    pub fn append_pending(&mut self, id: TaskId, request: &DownloadRequest) {
        self.entries.push(HistoryEntry {
            task_id: Some(id),
            platform: request.platform.clone(),
            name: request.name.clone(),
            url: request.url.clone(),
            status: HistoryStatus::Downloading,
            progress: 0.0,
            message: String::new(),
            timestamp: Utc::now(),
        });
    }

    /// Move the task's entry to a terminal status
    ///
    /// Status only moves forward: an entry that is already terminal is left alone.
    ///
    /// # Returns
    ///
    /// `true` if an entry changed
    pub fn complete(
        &mut self,
        id: TaskId,
        status: HistoryStatus,
        progress: f32,
        message: &str,
    ) -> bool {
        if !status.is_terminal() {
            return false;
        }
        let Some(entry) = self
            .entries
            .iter_mut()
            .rev()
            .find(|e| e.task_id == Some(id))
        else {
            return false;
        };
        if entry.status.is_terminal() {
            return false;
        }
        entry.status = status;
        entry.progress = progress.clamp(0.0, 100.0);
        entry.message = message.to_string();
        entry.timestamp = Utc::now();
        true
    }

    /// Mark every `downloading` entry as failed
    ///
    /// # Returns
    ///
    /// Number of entries changed
    pub fn fail_interrupted(&mut self) -> usize {
        let mut count = 0;
        for entry in self
            .entries
            .iter_mut()
            .filter(|e| e.status == HistoryStatus::Downloading)
        {
            entry.status = HistoryStatus::Error;
            entry.progress = 0.0;
            entry.message = format!("Erreur : {} : {}", entry.name, INTERRUPTED);
            count += 1;
        }
        count
    }

    /// Drop every terminal entry, keeping tasks still in flight
    pub fn clear_finished(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !e.status.is_terminal());
        before - self.entries.len()
    }

    /// Entry for a task, if any
    pub fn find(&self, id: TaskId) -> Option<&HistoryEntry> {
        self.entries.iter().rev().find(|e| e.task_id == Some(id))
    }

    /// All entries, oldest first
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "history.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}
