//! Download task execution: worker context, progress relay and the download sequence.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::extraction::{extract_archive, is_archive};
use crate::provider::Providers;
use crate::store::DownloadStore;
use crate::types::{DownloadRequest, Event, Phase, ProgressSink, ProgressState, TaskId};
use crate::utils::{ensure_writable_dir, partial_path};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

use super::finalization;

/// Without a known total, a progress event is sent every this many bytes
const UNKNOWN_TOTAL_EVENT_STEP: u64 = 1024 * 1024;

/// Everything a worker needs, cloned out of the downloader
#[derive(Clone)]
pub(crate) struct TaskContext {
    pub(crate) id: TaskId,
    pub(crate) request: DownloadRequest,
    pub(crate) config: Arc<Config>,
    pub(crate) store: DownloadStore,
    pub(crate) providers: Providers,
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    pub(crate) cancel: CancellationToken,
}

/// Forwards snapshots from the transport and extractors into the store
///
/// Every snapshot reaches the registry. Events are thinned out to one per whole
/// percent (or per MiB when the total is unknown) so subscribers are not flooded.
pub(crate) struct ProgressRelay {
    id: TaskId,
    store: DownloadStore,
    event_tx: tokio::sync::broadcast::Sender<Event>,
    last_event: Mutex<Option<(Phase, u64)>>,
}

impl ProgressRelay {
    pub(crate) fn new(ctx: &TaskContext) -> Self {
        Self {
            id: ctx.id,
            store: ctx.store.clone(),
            event_tx: ctx.event_tx.clone(),
            last_event: Mutex::new(None),
        }
    }

    fn event_key(progress: &ProgressState) -> (Phase, u64) {
        let step = if progress.total_bytes == 0 {
            progress.bytes_done / UNKNOWN_TOTAL_EVENT_STEP
        } else {
            progress.percent.floor() as u64
        };
        (progress.phase, step)
    }
}

impl ProgressSink for ProgressRelay {
    fn report(&self, progress: ProgressState) {
        if !self.store.update_progress(self.id, progress) {
            return;
        }

        let key = Self::event_key(&progress);
        let mut last = self
            .last_event
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *last == Some(key) {
            return;
        }
        *last = Some(key);
        drop(last);

        self.event_tx
            .send(Event::Progress {
                id: self.id,
                progress,
            })
            .ok();
    }
}

/// Spawn the worker and a supervisor that commits its result
pub(crate) fn spawn(ctx: TaskContext) {
    let worker_ctx = ctx.clone();
    supervise(ctx, async move { run(&worker_ctx).await });
}

/// Run `worker` in its own tokio task and commit whatever it yields
///
/// A panic in the worker surfaces as a `JoinError` here and still becomes a failed
/// outcome.
pub(crate) fn supervise<F>(ctx: TaskContext, worker: F)
where
    F: std::future::Future<Output = Result<String>> + Send + 'static,
{
    let worker = tokio::spawn(worker);

    tokio::spawn(async move {
        let result = match worker.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(task_id = %ctx.id, error = %e, "download worker panicked");
                Err(Error::Other(format!("download worker crashed: {}", e)))
            }
        };
        finalization::finalize_task(&ctx, result).await;
    });
}

/// The download sequence for one task
///
/// Phases:
/// 1. Resolve and probe the platform folder
/// 2. Resolve the transfer URL through the provider
/// 3. Transfer into a per-task partial file with progress relayed into the store,
///    then move it into place
/// 4. Extract when requested and the file is an archive
///
/// # Returns
///
/// The success message for the outcome
pub(crate) async fn run(ctx: &TaskContext) -> Result<String> {
    let id = ctx.id;
    let request = &ctx.request;

    // Phase 1: destination folder
    let dest_dir = ctx.config.download.platform_dir(&request.platform);
    ensure_writable_dir(&dest_dir).await?;

    // Phase 2: resolve
    let provider = ctx.providers.for_url(&request.url);
    tracing::debug!(task_id = %id, provider = provider.name(), "resolving transfer URL");
    let resolved = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
        resolved = provider.resolve(request) => resolved?,
    };

    let destination = dest_dir.join(resolved.local_filename(request));
    let partial = partial_path(&destination, id);

    // Phase 3: transfer into a per-task partial file, moved into place once complete
    let relay = Arc::new(ProgressRelay::new(ctx));
    let bytes = provider
        .transfer(&resolved, &partial, relay.as_ref(), &ctx.cancel)
        .await?;
    if ctx.cancel.is_cancelled() {
        tokio::fs::remove_file(&partial).await.ok();
        return Err(Error::Cancelled);
    }
    tokio::fs::rename(&partial, &destination).await?;
    tracing::info!(task_id = %id, ?destination, bytes, "transfer finished");

    if !request.extract {
        return Ok(format!("Download_OK : {}", request.name));
    }

    // Phase 4: extraction
    if !is_archive(&destination) {
        tracing::warn!(
            task_id = %id,
            ?destination,
            "extraction requested but the file is not a ZIP or RAR archive, keeping it as-is"
        );
        return Ok(format!("Download_OK : {}", request.name));
    }

    ctx.event_tx
        .send(Event::Extracting {
            id,
            archive: destination.clone(),
        })
        .ok();

    let report = extract_archive(
        &destination,
        &dest_dir,
        relay,
        &ctx.cancel,
        &ctx.config.extraction,
    )
    .await?;

    tracing::info!(
        task_id = %id,
        files = report.files.len(),
        renamed = ?report.renamed,
        "extraction finished"
    );

    Ok(format!("Downloaded / extracted : {}", request.name))
}
