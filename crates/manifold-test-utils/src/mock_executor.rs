// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Script executor that plays back configured behaviors instead of running code.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use manifold_core::{
    EntryCallback, ManifoldError, PluginEntryModule, PluginScript, ScriptExecutor,
};
use tracing::debug;

/// What "executing" a given script does.
#[derive(Clone)]
pub enum ScriptBehavior {
    /// Invoke the entry callback with `id` (`name@version`) and `module`.
    Register {
        id: String,
        module: Arc<dyn PluginEntryModule>,
    },
    /// Execution throws.
    Fail(String),
    /// Runs without side effects.
    Silent,
}

/// Executor keyed by script URL; unknown scripts behave as [`ScriptBehavior::Silent`].
#[derive(Default)]
pub struct MockExecutor {
    behaviors: Mutex<HashMap<String, ScriptBehavior>>,
    executed: Mutex<Vec<String>>,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_behavior(&self, script_url: &str, behavior: ScriptBehavior) {
        self.behaviors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(script_url.to_string(), behavior);
    }

    /// URLs of every executed script, in execution order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ScriptExecutor for MockExecutor {
    async fn execute(
        &self,
        script: PluginScript,
        callback: EntryCallback,
    ) -> Result<(), ManifoldError> {
        let url = script.url.to_string();
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.clone());

        let behavior = self
            .behaviors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&url)
            .cloned()
            .unwrap_or(ScriptBehavior::Silent);

        match behavior {
            ScriptBehavior::Register { id, module } => {
                let delivered = callback.register(&id, module);
                debug!(script = %url, id = %id, delivered, "mock script registered entry module");
                Ok(())
            }
            ScriptBehavior::Fail(message) => Err(ManifoldError::EntryModule {
                plugin: script.plugin.name,
                message: format!("script {url} failed: {message}"),
            }),
            ScriptBehavior::Silent => Ok(()),
        }
    }
}
