// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP implementation of [`ResourceFetcher`].

use std::time::Duration;

use async_trait::async_trait;
use manifold_core::{ManifoldError, ResourceFetcher};
use tracing::debug;
use url::Url;

/// Fetches manifests and plugin scripts over HTTP(S) with reqwest.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ManifoldError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("manifold/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ManifoldError::Internal(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Reuse an existing client (shared connection pool, custom TLS).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ManifoldError> {
        let fetch_error = |message: String, source: reqwest::Error| ManifoldError::Fetch {
            url: url.to_string(),
            message,
            source: Some(Box::new(source)),
        };

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| fetch_error(format!("HTTP request failed: {e}"), e))?;

        let status = response.status();
        debug!(url = %url, status = %status, "resource response received");
        if !status.is_success() {
            return Err(ManifoldError::Fetch {
                url: url.to_string(),
                message: format!("server returned {status}"),
                source: None,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| fetch_error(format!("failed to read response body: {e}"), e))?;
        Ok(body.to_vec())
    }
}
