//! Transfer URL resolution
//!
//! A catalog URL either points straight at the payload or at a file host that hands
//! out one-time download links through an authenticated API. [`ProviderKind::classify`]
//! picks the strategy, and every strategy implements [`Provider`].
//!
//! ## Architecture
//!
//! - [`DirectProvider`]: the catalog URL is the transfer URL, one attempt
//! - [`TokenGatedProvider`]: metadata lookup, then a token exchange and transfer
//!   retried together under [`RetryConfig`](crate::config::RetryConfig)

mod direct;
mod token_gated;

pub use direct::DirectProvider;
pub use token_gated::TokenGatedProvider;

use crate::config::ProviderConfig;
use crate::error::Result;
use crate::transport::HttpTransport;
use crate::types::{DownloadRequest, ProgressSink};
use crate::utils::{sanitize_filename, target_filename};
use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// What a provider learned about a request before the transfer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved {
    /// URL handed to the transfer step
    pub url: String,
    /// Filename reported by the remote host, if any
    pub filename: Option<String>,
}

impl Resolved {
    /// On-disk filename for this download
    ///
    /// A host-reported filename wins over the request's display name. Both are
    /// sanitized.
    pub fn local_filename(&self, request: &DownloadRequest) -> String {
        match self.filename.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => sanitize_filename(name),
            _ => target_filename(&request.name, &request.url),
        }
    }
}

/// A strategy for turning a catalog URL into bytes on disk
#[async_trait]
pub trait Provider: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Determine the transfer URL and remote filename
    async fn resolve(&self, request: &DownloadRequest) -> Result<Resolved>;

    /// Stream the resolved file into `destination`
    ///
    /// # Returns
    ///
    /// Number of bytes written
    async fn transfer(
        &self,
        resolved: &Resolved,
        destination: &Path,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<u64>;
}

/// Closed set of provider strategies
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    /// Plain HTTP(S) download
    Direct,
    /// File host behind a metadata and token-exchange API
    TokenGated,
}

impl ProviderKind {
    /// Pick the strategy for `url`
    ///
    /// A URL whose host equals one of `config.hosts`, or is a subdomain of one, is
    /// token-gated. Everything else, including unparseable URLs, is direct.
    pub fn classify(url: &str, config: &ProviderConfig) -> Self {
        let Some(host) = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        else {
            return ProviderKind::Direct;
        };

        let gated = config.hosts.iter().any(|pattern| {
            let pattern = pattern.trim().to_ascii_lowercase();
            !pattern.is_empty()
                && (host == pattern || host.ends_with(&format!(".{}", pattern)))
        });

        if gated {
            ProviderKind::TokenGated
        } else {
            ProviderKind::Direct
        }
    }
}

/// Both strategies, built once and shared by every task
#[derive(Clone)]
pub struct Providers {
    config: ProviderConfig,
    direct: DirectProvider,
    token_gated: TokenGatedProvider,
}

impl Providers {
    /// Build the provider set over a shared transport
    pub fn new(transport: HttpTransport, config: ProviderConfig) -> Self {
        Self {
            direct: DirectProvider::new(transport.clone()),
            token_gated: TokenGatedProvider::new(transport, config.clone()),
            config,
        }
    }

    /// Provider responsible for `url`
    pub fn for_url(&self, url: &str) -> &dyn Provider {
        match ProviderKind::classify(url, &self.config) {
            ProviderKind::Direct => &self.direct,
            ProviderKind::TokenGated => &self.token_gated,
        }
    }
}
