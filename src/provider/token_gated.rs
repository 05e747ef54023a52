//! File host behind an authenticated token-exchange API (1fichier-style)
//!
//! Three calls per download:
//!
//! 1. `POST {api_base}/v1/file/info.cgi` reports the filename, or that the file is gone
//! 2. `POST {api_base}/v1/download/get_token.cgi` returns a one-time download URL
//! 3. `GET` of that URL streams the payload
//!
//! Both API calls send `Authorization: Bearer <key>` and a JSON body `{"url": ...}`.
//! Steps 2 and 3 are retried together, because a token is only good for one transfer.

use super::{Provider, Resolved};
use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::retry::download_with_retry;
use crate::transport::HttpTransport;
use crate::types::{DownloadRequest, ProgressSink};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tokio_util::sync::CancellationToken;

const INFO_ENDPOINT: &str = "v1/file/info.cgi";
const TOKEN_ENDPOINT: &str = "v1/download/get_token.cgi";

/// Fields we read from the file-host API responses
#[derive(Debug, Default, Deserialize)]
struct ApiResponse {
    filename: Option<String>,
    url: Option<String>,
    status: Option<String>,
    message: Option<String>,
}

impl ApiResponse {
    fn is_ko(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("KO"))
    }

    fn reports_not_found(&self) -> bool {
        self.is_ko()
            && self
                .message
                .as_deref()
                .is_some_and(|m| m.to_ascii_lowercase().contains("not found"))
    }
}

/// Provider for hosts that require a metadata lookup and a download token
#[derive(Clone)]
pub struct TokenGatedProvider {
    transport: HttpTransport,
    config: ProviderConfig,
}

impl TokenGatedProvider {
    /// Create a token-gated provider over `transport`
    pub fn new(transport: HttpTransport, config: ProviderConfig) -> Self {
        Self { transport, config }
    }

    /// Read the API key
    ///
    /// A non-empty inline key wins; otherwise the key file is read and trimmed. Fails
    /// with [`Error::MissingCredential`] when neither yields a key. No network access.
    pub async fn credential(&self) -> Result<String> {
        if let Some(key) = self.config.api_key.as_deref().map(str::trim)
            && !key.is_empty()
        {
            return Ok(key.to_string());
        }

        if let Some(path) = &self.config.api_key_path {
            match tokio::fs::read_to_string(path).await {
                Ok(contents) => {
                    let key = contents.trim();
                    if !key.is_empty() {
                        return Ok(key.to_string());
                    }
                    tracing::warn!(?path, provider = %self.config.name, "API key file is empty");
                }
                Err(e) => {
                    tracing::warn!(?path, provider = %self.config.name, error = %e, "Cannot read API key file");
                }
            }
        }

        Err(Error::MissingCredential {
            provider: self.config.name.clone(),
            path: self.config.api_key_path.clone(),
        })
    }

    async fn call_api(&self, endpoint: &str, key: &str, source_url: &str) -> Result<ApiResponse> {
        let api_url = format!("{}/{}", self.config.api_base.trim_end_matches('/'), endpoint);

        let response = self
            .transport
            .client()
            .post(&api_url)
            .bearer_auth(key)
            .json(&serde_json::json!({ "url": source_url }))
            .timeout(self.transport.read_timeout())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let parsed: ApiResponse = serde_json::from_str(&body).unwrap_or_default();

        if status == reqwest::StatusCode::NOT_FOUND || parsed.reports_not_found() {
            return Err(Error::RemoteNotFound {
                url: source_url.to_string(),
            });
        }

        if !status.is_success() {
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                url: api_url,
            });
        }

        if parsed.is_ko() {
            return Err(Error::Provider {
                provider: self.config.name.clone(),
                reason: parsed
                    .message
                    .unwrap_or_else(|| format!("{} returned status KO", endpoint)),
            });
        }

        Ok(parsed)
    }

    /// One token exchange followed by one transfer
    async fn fetch_once(
        &self,
        source_url: &str,
        key: &str,
        destination: &Path,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let token = self.call_api(TOKEN_ENDPOINT, key, source_url).await?;
        let download_url = token
            .url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| Error::Provider {
                provider: self.config.name.clone(),
                reason: "token response carries no download URL".to_string(),
            })?;

        tracing::debug!(source_url, provider = %self.config.name, "Download token obtained");

        self.transport
            .fetch(&download_url, destination, sink, cancel)
            .await
    }
}

#[async_trait]
impl Provider for TokenGatedProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn resolve(&self, request: &DownloadRequest) -> Result<Resolved> {
        let key = self.credential().await?;
        let info = self.call_api(INFO_ENDPOINT, &key, &request.url).await?;

        tracing::info!(
            url = %request.url,
            provider = %self.config.name,
            filename = ?info.filename,
            "Remote file resolved"
        );

        Ok(Resolved {
            url: request.url.clone(),
            filename: info.filename,
        })
    }

    async fn transfer(
        &self,
        resolved: &Resolved,
        destination: &Path,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let key = self.credential().await?;
        let key = key.as_str();
        let source_url = resolved.url.as_str();

        download_with_retry(&self.config.retry, cancel, move || async move {
            self.fetch_once(source_url, key, destination, sink, cancel)
                .await
        })
        .await
    }
}
