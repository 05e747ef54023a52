//! Plain HTTP(S) downloads

use super::{Provider, Resolved};
use crate::error::Result;
use crate::transport::HttpTransport;
use crate::types::{DownloadRequest, ProgressSink};
use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

/// Fetches the catalog URL as-is; the first failure is terminal
#[derive(Clone)]
pub struct DirectProvider {
    transport: HttpTransport,
}

impl DirectProvider {
    /// Create a direct provider over `transport`
    pub fn new(transport: HttpTransport) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Provider for DirectProvider {
    fn name(&self) -> &str {
        "direct"
    }

    async fn resolve(&self, request: &DownloadRequest) -> Result<Resolved> {
        Ok(Resolved {
            url: request.url.clone(),
            filename: None,
        })
    }

    async fn transfer(
        &self,
        resolved: &Resolved,
        destination: &Path,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        self.transport
            .fetch(&resolved.url, destination, sink, cancel)
            .await
    }
}
