//! Task engine split into focused submodules.
//!
//! The `RomDownloader` struct and its methods are organized by domain:
//! - [`control`] - Cancellation and shutdown
//! - [`task`] - Worker context, progress relay and the download sequence
//! - [`finalization`] - Outcome construction and the single terminal commit

mod control;
mod finalization;
mod task;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::extensions::ExtensionAllowList;
use crate::provider::Providers;
use crate::registry::TaskSnapshot;
use crate::store::DownloadStore;
use crate::transport::HttpTransport;
use crate::types::{DownloadRequest, Event, HistoryEntry, Outcome, TaskId, TaskPoll};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

use task::TaskContext;

/// Main downloader instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct RomDownloader {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// Registry, history and finished outcomes
    pub(crate) store: DownloadStore,
    /// Direct and token-gated providers over one HTTP client
    pub(crate) providers: Providers,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Accepted extensions per platform folder, when configured
    pub(crate) extensions: Option<Arc<ExtensionAllowList>>,
    /// Cleared by `shutdown()`; `start()` refuses new tasks afterwards
    pub(crate) accepting_new: Arc<AtomicBool>,
}

impl RomDownloader {
    /// Create a new RomDownloader instance
    ///
    /// Loads the download history (a missing or corrupt file gives an empty
    /// history), builds the shared HTTP client and loads the extension allow-list
    /// when one is configured.
    pub async fn new(config: Config) -> Result<Self> {
        let transport = HttpTransport::new(&config.download)?;
        let providers = Providers::new(transport, config.provider.clone());
        let store = DownloadStore::open(config.history_path.clone()).await;

        let extensions = match &config.extraction.extensions_file {
            Some(path) => match ExtensionAllowList::load(path).await {
                Ok(list) => Some(Arc::new(list)),
                Err(e) => {
                    tracing::warn!(?path, error = %e, "extension allow-list unavailable, accepting every extension");
                    None
                }
            },
            None => None,
        };

        // Create broadcast channel with buffer size of 1000 events
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        tracing::info!(
            roms_dir = ?config.download.roms_dir,
            history = ?config.history_path,
            "RomDownloader ready"
        );

        Ok(Self {
            config: Arc::new(config),
            store,
            providers,
            event_tx,
            extensions,
            accepting_new: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Subscribe to task events
    ///
    /// Each subscriber receives every event sent after it subscribed. A receiver that
    /// falls more than 1000 events behind gets `RecvError::Lagged` and skips ahead.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Start downloading `request` in the background
    ///
    /// Registers the task (registry row and a `downloading` history entry) before
    /// spawning the worker, so the returned id can be polled right away.
    ///
    /// # Errors
    ///
    /// [`Error::ShuttingDown`] after `shutdown()`, [`Error::Config`] for a request
    /// without URL or platform.
    pub async fn start(&self, request: DownloadRequest) -> Result<TaskId> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        if request.url.trim().is_empty() {
            return Err(Error::Config {
                message: format!("no source URL for {}", request.name),
                key: None,
            });
        }
        if request.platform.trim().is_empty() {
            return Err(Error::Config {
                message: format!("no platform for {}", request.name),
                key: None,
            });
        }

        let id = TaskId::generate();
        let cancel = CancellationToken::new();
        self.store.register(id, &request, cancel.clone()).await?;

        tracing::info!(
            task_id = %id,
            name = %request.name,
            platform = %request.platform,
            url = %request.url,
            extract = request.extract,
            "download queued"
        );
        self.event_tx
            .send(Event::Queued {
                id,
                name: request.name.clone(),
            })
            .ok();

        let ctx = TaskContext {
            id,
            request,
            config: self.config.clone(),
            store: self.store.clone(),
            providers: self.providers.clone(),
            event_tx: self.event_tx.clone(),
            cancel,
        };
        task::spawn(ctx);

        Ok(id)
    }

    /// Non-blocking view of a task
    ///
    /// `Running` while the task is live, `Finished` once its outcome is committed
    /// (until taken with [`take_outcome`](Self::take_outcome)), `None` otherwise.
    pub fn poll(&self, id: TaskId) -> Option<TaskPoll> {
        self.store.poll(id)
    }

    /// Consume a finished task's outcome
    ///
    /// Outcomes wait here until taken. Only the newest
    /// [`MAX_UNCLAIMED_OUTCOMES`](crate::store::MAX_UNCLAIMED_OUTCOMES) are kept; the
    /// history still records every task.
    pub fn take_outcome(&self, id: TaskId) -> Option<Outcome> {
        self.store.take_outcome(id)
    }

    /// Every task still in flight, oldest first
    pub fn active_tasks(&self) -> Vec<TaskSnapshot> {
        self.store.active()
    }

    /// The download history, oldest first
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.store.history()
    }

    /// Remove finished entries from the history
    ///
    /// # Returns
    ///
    /// Number of entries removed
    pub async fn clear_history(&self) -> usize {
        let removed = self.store.clear_history().await;
        tracing::info!(removed, "history cleared");
        removed
    }

    /// Whether `file` may be placed in platform folder `folder`
    ///
    /// Without a configured allow-list every file is accepted.
    pub fn is_extension_supported(&self, file: &str, folder: &str) -> bool {
        match &self.extensions {
            Some(list) => list.is_supported(file, folder),
            None => true,
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }
}
