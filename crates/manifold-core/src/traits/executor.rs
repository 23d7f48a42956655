// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Script execution seam for bundled plugins.

use async_trait::async_trait;
use url::Url;

use crate::callback::EntryCallback;
use crate::error::ManifoldError;
use crate::types::PluginId;

/// One fetched script of a bundled plugin, ready to run.
#[derive(Debug, Clone)]
pub struct PluginScript {
    /// Identity of the plugin the script belongs to.
    pub plugin: PluginId,
    /// Absolute location the script was fetched from.
    pub url: Url,
    /// Position of the script in the manifest's `loadScripts` list.
    pub index: usize,
    /// Raw script source.
    pub source: Vec<u8>,
}

/// Runs plugin scripts inside the host's execution environment.
///
/// Scripts are executed one at a time in manifest order. The `callback`
/// handle is how `callback`-registered plugins deliver their entry module;
/// executors may keep a clone and invoke it after `execute` returns.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Execute a single script.
    async fn execute(
        &self,
        script: PluginScript,
        callback: EntryCallback,
    ) -> Result<(), ManifoldError>;
}
