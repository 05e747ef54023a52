//! Streaming HTTP transport
//!
//! [`HttpTransport::fetch`] streams one URL into one file, reporting progress after
//! every chunk. A failed or cancelled fetch never leaves a partial file behind.

use crate::config::DownloadConfig;
use crate::error::{Error, Result};
use crate::types::{Phase, ProgressSink, ProgressState};
use crate::utils::{check_disk_space, ensure_writable_dir};
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

/// HTTP client shared by every task
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    read_timeout: Duration,
    chunk_size: usize,
    check_disk_space: bool,
}

impl HttpTransport {
    /// Build the transport from the download settings
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.http_timeout)
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to create HTTP client: {}", e),
                key: Some("download.user_agent".to_string()),
            })?;

        Ok(Self {
            client,
            read_timeout: config.http_timeout,
            chunk_size: config.chunk_size.max(1024),
            check_disk_space: config.check_disk_space,
        })
    }

    /// Underlying client, for API calls that share its user agent and timeouts
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Read timeout applied to request headers and to each body chunk
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Stream `url` into `destination`
    ///
    /// The destination directory is created and probed for writability before the
    /// request goes out. Progress is reported in the `Transferring` phase with a total
    /// of 0 when the server sends no `Content-Length`.
    ///
    /// # Returns
    ///
    /// Number of bytes written. On any error the destination file is removed.
    pub async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let dir = destination.parent().ok_or_else(|| Error::NotWritable {
            path: destination.to_path_buf(),
        })?;
        ensure_writable_dir(dir).await?;

        let result = self.stream_to_file(url, destination, dir, sink, cancel).await;

        if let Err(e) = &result {
            tracing::warn!(url, ?destination, error = %e, "Transfer failed, removing partial file");
            if let Err(rm) = tokio::fs::remove_file(destination).await
                && rm.kind() != std::io::ErrorKind::NotFound
            {
                tracing::error!(?destination, error = %rm, "Failed to remove partial file");
            }
        }

        result
    }

    async fn stream_to_file(
        &self,
        url: &str,
        destination: &Path,
        dir: &Path,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        tracing::debug!(url, ?destination, "Starting transfer");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = tokio::time::timeout(self.read_timeout, self.client.get(url).send()) => {
                response.map_err(|_| self.timeout_error(url))??
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let total = response.content_length().unwrap_or(0);
        if total > 0 && self.check_disk_space {
            check_disk_space(dir, total)?;
        }

        sink.report(ProgressState::new(Phase::Transferring, 0, total));

        let file = tokio::fs::File::create(destination).await?;
        let mut writer = tokio::io::BufWriter::with_capacity(self.chunk_size, file);
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                next = tokio::time::timeout(self.read_timeout, stream.next()) => next,
            };

            let chunk = match next {
                Err(_) => return Err(self.timeout_error(url)),
                Ok(None) => break,
                Ok(Some(chunk)) => chunk?,
            };

            writer.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            sink.report(ProgressState::new(Phase::Transferring, downloaded, total));
        }

        writer.flush().await?;
        writer.into_inner().sync_all().await?;

        if total > 0 && downloaded < total {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionAborted,
                format!(
                    "connection closed after {} of {} bytes from {}",
                    downloaded, total, url
                ),
            )));
        }

        tracing::info!(url, ?destination, bytes = downloaded, "Transfer complete");
        Ok(downloaded)
    }

    fn timeout_error(&self, url: &str) -> Error {
        Error::Timeout {
            secs: self.read_timeout.as_secs(),
            url: url.to_string(),
        }
    }
}
