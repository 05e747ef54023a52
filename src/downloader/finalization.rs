//! Task finalization: turn a worker result into an outcome and commit it once.

use crate::error::{Error, Result};
use crate::store::DownloadStore;
use crate::types::{DownloadRequest, Event, Outcome, TaskId};

use super::task::TaskContext;

/// Outcome message for a cancelled task
pub(crate) fn cancelled_outcome(request: &DownloadRequest) -> Outcome {
    Outcome::failure(format!("Download cancelled : {}", request.name))
}

/// Map a worker result to the outcome the UI sees
pub(crate) fn outcome_for(request: &DownloadRequest, result: &Result<String>) -> Outcome {
    match result {
        Ok(message) => Outcome::success(message.clone()),
        Err(Error::Cancelled) => cancelled_outcome(request),
        Err(e) => Outcome::failure(format!("Erreur : {} : {}", request.name, e)),
    }
}

/// Commit `outcome` for `id` and announce it
///
/// # Returns
///
/// `false` if the task had already been finalized; nothing is changed then.
pub(crate) async fn commit(
    store: &DownloadStore,
    event_tx: &tokio::sync::broadcast::Sender<Event>,
    id: TaskId,
    outcome: Outcome,
) -> bool {
    if !store.finalize(id, &outcome).await {
        tracing::debug!(task_id = %id, "task already finalized, discarding outcome");
        return false;
    }

    if outcome.success {
        tracing::info!(task_id = %id, message = %outcome.message, "download succeeded");
    } else {
        tracing::warn!(task_id = %id, message = %outcome.message, "download failed");
    }

    event_tx.send(Event::Finished { id, outcome }).ok();
    true
}

/// Commit the worker's result
pub(super) async fn finalize_task(ctx: &TaskContext, result: Result<String>) {
    if let Err(e) = &result
        && !matches!(e, Error::Cancelled)
    {
        tracing::error!(
            task_id = %ctx.id,
            error = %e,
            error_code = e.error_code(),
            kind = ?e.kind(),
            "download task failed"
        );
    }

    let outcome = outcome_for(&ctx.request, &result);
    commit(&ctx.store, &ctx.event_tx, ctx.id, outcome).await;
}
