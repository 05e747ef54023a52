//! Task control: cancel and shutdown.

use crate::error::{Error, Result};
use crate::types::{Event, TaskId, TaskPoll};
use std::sync::atomic::Ordering;

use super::RomDownloader;
use super::finalization::{cancelled_outcome, commit};

impl RomDownloader {
    /// Cancel a running task
    ///
    /// Trips the task's cancellation token and commits a failed outcome
    /// ("Download cancelled : <name>") right away, so the UI sees the task end
    /// without waiting for the worker. Whatever the worker returns later is
    /// discarded. The worker removes its partial file on its way out.
    ///
    /// Cancelling a task that already finished is a no-op.
    ///
    /// # Errors
    ///
    /// [`Error::TaskNotFound`] if the id was never started (or its outcome was
    /// already taken).
    pub async fn cancel(&self, id: TaskId) -> Result<()> {
        let (Some(token), Some(request)) = (self.store.cancel_token(id), self.store.request(id))
        else {
            return match self.store.poll(id) {
                Some(TaskPoll::Finished(_)) => Ok(()),
                _ => Err(Error::TaskNotFound(id)),
            };
        };

        token.cancel();
        tracing::info!(task_id = %id, name = %request.name, "download cancelled");
        commit(&self.store, &self.event_tx, id, cancelled_outcome(&request)).await;
        Ok(())
    }

    /// Stop accepting tasks and cancel every live one
    ///
    /// Each live task is committed as cancelled and the history is persisted.
    /// Emits [`Event::Shutdown`] last.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);

        let live = self.store.live_tokens();
        let count = live.len();
        for (id, _) in live {
            if let Err(e) = self.cancel(id).await {
                tracing::warn!(task_id = %id, error = %e, "failed to cancel task during shutdown");
            }
        }

        tracing::info!(cancelled = count, "shutdown complete");
        self.event_tx.send(Event::Shutdown).ok();
        Ok(())
    }
}
