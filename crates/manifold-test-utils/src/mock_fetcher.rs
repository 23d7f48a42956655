// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory resource fetcher.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use manifold_core::{ManifoldError, ResourceFetcher};
use url::Url;

/// Serves fixed bytes per URL and records every request.
///
/// Unknown URLs fail like a 404.
#[derive(Default)]
pub struct MockFetcher {
    resources: Mutex<HashMap<String, Result<Vec<u8>, String>>>,
    requests: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` at `url`.
    pub fn insert(&self, url: &str, body: impl Into<Vec<u8>>) {
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), Ok(body.into()));
    }

    /// Make requests for `url` fail with `message`.
    pub fn fail(&self, url: &str, message: &str) {
        self.resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.to_string(), Err(message.to_string()));
    }

    /// Every URL requested so far, in order.
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ResourceFetcher for MockFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ManifoldError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());

        let entry = self
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(url.as_str())
            .cloned();
        match entry {
            Some(Ok(body)) => Ok(body),
            Some(Err(message)) => Err(ManifoldError::Fetch {
                url: url.to_string(),
                message,
                source: None,
            }),
            None => Err(ManifoldError::Fetch {
                url: url.to_string(),
                message: "404 Not Found".to_string(),
                source: None,
            }),
        }
    }
}
