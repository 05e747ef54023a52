//! Shared test helpers for creating RomDownloader instances in tests.

use crate::config::{Config, RetryConfig};
use crate::downloader::RomDownloader;
use crate::types::{Event, Outcome, TaskId, TaskPoll};
use std::time::Duration;
use tempfile::tempdir;

/// Config rooted in `root` with millisecond retry delays
pub(crate) fn test_config(root: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.download.roms_dir = root.join("roms");
    config.download.http_timeout = Duration::from_secs(5);
    config.history_path = root.join("history.json");
    config.provider.retry = RetryConfig {
        max_attempts: 10,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 1.0,
        jitter: false,
    };
    config
}

/// Helper to create a test RomDownloader whose files live in a temp dir.
/// Returns the downloader and the tempdir (which must be kept alive).
pub(crate) async fn create_test_downloader() -> (RomDownloader, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let downloader = RomDownloader::new(test_config(temp_dir.path()))
        .await
        .unwrap();
    (downloader, temp_dir)
}

/// Same as [`create_test_downloader`], with a custom config tweak
pub(crate) async fn create_test_downloader_with(
    tweak: impl FnOnce(&mut Config),
) -> (RomDownloader, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = test_config(temp_dir.path());
    tweak(&mut config);
    let downloader = RomDownloader::new(config).await.unwrap();
    (downloader, temp_dir)
}

/// Poll until the task has an outcome, failing the test after 10 seconds
pub(crate) async fn wait_for_outcome(downloader: &RomDownloader, id: TaskId) -> Outcome {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(TaskPoll::Finished(outcome)) = downloader.poll(id) {
            return outcome;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {id} did not finish in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Poll until the task has transferred at least one byte
pub(crate) async fn wait_for_bytes(downloader: &RomDownloader, id: TaskId) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        match downloader.poll(id) {
            Some(TaskPoll::Running(p)) if p.bytes_done > 0 => return,
            Some(TaskPoll::Finished(o)) => panic!("task finished early: {o:?}"),
            _ => {}
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "task {id} made no progress"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Drain every event currently buffered in `rx`
pub(crate) fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
