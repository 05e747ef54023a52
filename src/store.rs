//! Shared task state
//!
//! [`DownloadStore`] is the single handle through which the UI thread and the workers
//! see each other. The live registry, the history log and the finished-outcome slots
//! sit behind one `std::sync::RwLock`; the lock is only held for in-memory work and
//! never across an `.await`. Writes of the history file go through a separate async
//! mutex, taken before the state lock, so the file always reflects commits in the
//! order they happened.
//!
//! Finished outcomes wait for [`DownloadStore::take_outcome`]. At most
//! [`MAX_UNCLAIMED_OUTCOMES`] are kept; past that the oldest unclaimed one is dropped.
//! Its history entry is unaffected.

use crate::error::Result;
use crate::history::HistoryLog;
use crate::registry::{TaskRegistry, TaskSnapshot};
use crate::types::{
    DownloadRequest, HistoryEntry, HistoryStatus, Outcome, ProgressState, TaskId, TaskPoll,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;

/// Upper bound on outcomes waiting for `take_outcome`
pub const MAX_UNCLAIMED_OUTCOMES: usize = 256;

#[derive(Debug, Default)]
struct StoreState {
    registry: TaskRegistry,
    history: HistoryLog,
    // Keyed by time-derived id, so the first entry is the oldest
    finished: BTreeMap<TaskId, Outcome>,
}

impl StoreState {
    fn record_outcome(&mut self, id: TaskId, outcome: Outcome) {
        self.finished.insert(id, outcome);
        while self.finished.len() > MAX_UNCLAIMED_OUTCOMES {
            if let Some((dropped, _)) = self.finished.pop_first() {
                tracing::debug!(task_id = %dropped, "dropping unclaimed outcome");
            }
        }
    }
}

/// Cloneable handle to the registry, history and finished outcomes
#[derive(Clone)]
pub struct DownloadStore {
    state: Arc<RwLock<StoreState>>,
    persist_lock: Arc<tokio::sync::Mutex<()>>,
    history_path: PathBuf,
}

impl DownloadStore {
    /// Open the store, loading history from `history_path`
    pub async fn open(history_path: impl Into<PathBuf>) -> Self {
        let history_path = history_path.into();
        let history = HistoryLog::load(&history_path).await;
        Self {
            state: Arc::new(RwLock::new(StoreState {
                history,
                ..Default::default()
            })),
            persist_lock: Arc::new(tokio::sync::Mutex::new(())),
            history_path,
        }
    }

    /// Path of the history file
    pub fn history_path(&self) -> &Path {
        &self.history_path
    }

    // Mutations complete before the guard drops, so a poisoned lock still holds
    // consistent state
    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    async fn persist(&self, entries: Vec<HistoryEntry>) {
        if let Err(e) = HistoryLog::save(&self.history_path, &entries).await {
            tracing::warn!(path = ?self.history_path, error = %e, "failed to persist history");
        }
    }

    /// Register a new task: registry row plus a `downloading` history entry
    pub async fn register(
        &self,
        id: TaskId,
        request: &DownloadRequest,
        cancel: CancellationToken,
    ) -> Result<()> {
        let _persist = self.persist_lock.lock().await;
        let snapshot = {
            let mut state = self.write();
            state.registry.insert(id, request.clone(), cancel)?;
            state.history.append_pending(id, request);
            state.history.entries().to_vec()
        };
        self.persist(snapshot).await;
        Ok(())
    }

    /// Store a new progress snapshot for a live task
    ///
    /// # Returns
    ///
    /// `true` if the snapshot was stored
    pub fn update_progress(&self, id: TaskId, progress: ProgressState) -> bool {
        self.write().registry.update_progress(id, progress)
    }

    /// Commit a task's terminal outcome
    ///
    /// In one critical section: the history entry goes terminal, the registry row is
    /// removed and the outcome lands in the finished slot. Committing twice for the
    /// same id is a no-op.
    ///
    /// # Returns
    ///
    /// `true` if this call performed the commit
    pub async fn finalize(&self, id: TaskId, outcome: &Outcome) -> bool {
        let _persist = self.persist_lock.lock().await;
        let snapshot = {
            let mut state = self.write();
            if state.registry.remove(id).is_none() {
                return false;
            }
            let (status, progress) = if outcome.success {
                (HistoryStatus::DownloadOk, 100.0)
            } else {
                (HistoryStatus::Error, 0.0)
            };
            state
                .history
                .complete(id, status, progress, &outcome.message);
            state.record_outcome(id, outcome.clone());
            state.history.entries().to_vec()
        };
        self.persist(snapshot).await;
        true
    }

    /// Non-blocking view of a task
    pub fn poll(&self, id: TaskId) -> Option<TaskPoll> {
        let state = self.read();
        if let Some(task) = state.registry.get(id) {
            return Some(TaskPoll::Running(task.progress));
        }
        state
            .finished
            .get(&id)
            .map(|outcome| TaskPoll::Finished(outcome.clone()))
    }

    /// Remove and return a finished outcome
    pub fn take_outcome(&self, id: TaskId) -> Option<Outcome> {
        self.write().finished.remove(&id)
    }

    /// Cancellation token of a live task
    pub fn cancel_token(&self, id: TaskId) -> Option<CancellationToken> {
        self.read().registry.get(id).map(|t| t.cancel.clone())
    }

    /// Request of a live task
    pub fn request(&self, id: TaskId) -> Option<DownloadRequest> {
        self.read().registry.get(id).map(|t| t.request.clone())
    }

    /// Whether `id` is live
    pub fn is_live(&self, id: TaskId) -> bool {
        self.read().registry.contains(id)
    }

    /// Snapshots of every live task
    pub fn active(&self) -> Vec<TaskSnapshot> {
        self.read().registry.snapshots()
    }

    /// Cancellation tokens of every live task
    pub fn live_tokens(&self) -> Vec<(TaskId, CancellationToken)> {
        self.read().registry.cancel_tokens()
    }

    /// Copy of the history, oldest first
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.read().history.entries().to_vec()
    }

    /// Drop finished history entries and persist
    ///
    /// Entries of tasks still in flight are kept so they can still be finalized.
    pub async fn clear_history(&self) -> usize {
        let _persist = self.persist_lock.lock().await;
        let (removed, snapshot) = {
            let mut state = self.write();
            let removed = state.history.clear_finished();
            (removed, state.history.entries().to_vec())
        };
        self.persist(snapshot).await;
        removed
    }
}
