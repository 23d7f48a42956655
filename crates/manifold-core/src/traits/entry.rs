// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Entry module capability of a loaded bundled plugin.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ManifoldError;
use crate::types::{ModuleExports, PluginId};

/// The object exposed by a bundled plugin once its scripts have executed.
///
/// Code references of the form `Module.export` are resolved through it.
pub trait PluginEntryModule: Send + Sync {
    /// Returns the exports of the named exposed module.
    ///
    /// `Ok(None)` means the module is not exposed, which only affects the
    /// extensions referencing it. `Err` means the entry module itself is
    /// broken and fails the whole plugin.
    fn get(&self, module: &str) -> Result<Option<ModuleExports>, ManifoldError>;
}

/// Host-provided retrieval of entry modules for `custom` registration.
#[async_trait]
pub trait EntryModuleProvider: Send + Sync {
    /// Retrieve the entry module of the plugin whose scripts just executed.
    async fn entry_module(
        &self,
        plugin: &PluginId,
    ) -> Result<Arc<dyn PluginEntryModule>, ManifoldError>;
}

/// Entry module backed by an in-memory table of exposed modules.
///
/// Script executors that build exports natively use this to hand them over.
#[derive(Clone, Default)]
pub struct StaticEntryModule {
    modules: HashMap<String, ModuleExports>,
}

impl StaticEntryModule {
    /// Create an entry module exposing nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration of an exposed module.
    pub fn with_module(mut self, name: &str, exports: ModuleExports) -> Self {
        self.modules.insert(name.to_string(), exports);
        self
    }
}

impl PluginEntryModule for StaticEntryModule {
    fn get(&self, module: &str) -> Result<Option<ModuleExports>, ManifoldError> {
        Ok(self.modules.get(module).cloned())
    }
}

impl fmt::Debug for StaticEntryModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.modules.keys().collect();
        names.sort();
        f.debug_struct("StaticEntryModule")
            .field("modules", &names)
            .finish()
    }
}
