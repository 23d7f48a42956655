// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fetch-by-URL transport for manifests and plugin scripts.

use async_trait::async_trait;
use url::Url;

use crate::error::ManifoldError;

/// Retrieves the raw bytes behind a URL.
///
/// Implementations return [`ManifoldError::Fetch`] for unreachable resources
/// and non-success responses.
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Fetch the resource at `url`.
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ManifoldError>;
}
