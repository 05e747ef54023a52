//! Live task table
//!
//! One row per task that has not reached a terminal outcome. The table itself is not
//! synchronized; [`DownloadStore`](crate::store::DownloadStore) keeps it behind its
//! lock together with the history log.

use crate::error::{Error, Result};
use crate::types::{DownloadRequest, ProgressState, TaskId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// A task that is still running
#[derive(Debug, Clone)]
pub struct LiveTask {
    /// The request that started the task
    pub request: DownloadRequest,
    /// Latest progress snapshot
    pub progress: ProgressState,
    /// Trips the worker's transfer and extraction loops
    pub cancel: CancellationToken,
    /// When the task was registered
    pub started_at: DateTime<Utc>,
}

/// Read-only view of a live task, handed to the UI
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSnapshot {
    /// Task ID
    pub id: TaskId,
    /// Platform identifier
    pub platform: String,
    /// Game display name
    pub name: String,
    /// Source URL
    pub url: String,
    /// Latest progress snapshot
    pub progress: ProgressState,
    /// When the task was registered
    pub started_at: DateTime<Utc>,
}

/// Map of live tasks keyed by id
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: HashMap<TaskId, LiveTask>,
}

impl TaskRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row for a new task
    ///
    /// Ids are never reused; inserting an id that is already live is an error.
    pub fn insert(
        &mut self,
        id: TaskId,
        request: DownloadRequest,
        cancel: CancellationToken,
    ) -> Result<()> {
        if self.tasks.contains_key(&id) {
            return Err(Error::Other(format!("task {} is already registered", id)));
        }
        self.tasks.insert(
            id,
            LiveTask {
                request,
                progress: ProgressState::default(),
                cancel,
                started_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Replace a task's progress snapshot
    ///
    /// Within one phase the byte counter never goes backwards: a stale snapshot with
    /// fewer bytes is dropped. A phase change always replaces the snapshot.
    ///
    /// # Returns
    ///
    /// `true` if the snapshot was stored
    pub fn update_progress(&mut self, id: TaskId, progress: ProgressState) -> bool {
        let Some(task) = self.tasks.get_mut(&id) else {
            return false;
        };
        if task.progress.phase == progress.phase && progress.bytes_done < task.progress.bytes_done
        {
            return false;
        }
        task.progress = progress;
        true
    }

    /// Look up a live task
    pub fn get(&self, id: TaskId) -> Option<&LiveTask> {
        self.tasks.get(&id)
    }

    /// Whether `id` is live
    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Drop a task's row
    pub fn remove(&mut self, id: TaskId) -> Option<LiveTask> {
        self.tasks.remove(&id)
    }

    /// Number of live tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task is live
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancellation tokens of every live task
    pub fn cancel_tokens(&self) -> Vec<(TaskId, CancellationToken)> {
        self.tasks
            .iter()
            .map(|(id, task)| (*id, task.cancel.clone()))
            .collect()
    }

    /// Snapshots of every live task, oldest first
    pub fn snapshots(&self) -> Vec<TaskSnapshot> {
        let mut snapshots: Vec<TaskSnapshot> = self
            .tasks
            .iter()
            .map(|(id, task)| TaskSnapshot {
                id: *id,
                platform: task.request.platform.clone(),
                name: task.request.name.clone(),
                url: task.request.url.clone(),
                progress: task.progress,
                started_at: task.started_at,
            })
            .collect();
        snapshots.sort_by_key(|s| s.id);
        snapshots
    }
}
