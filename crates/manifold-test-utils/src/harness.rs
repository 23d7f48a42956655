// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end lifecycle testing.
//!
//! `TestHarness` wires a [`PluginRegistry`] to a [`ScriptLoader`] backed by
//! [`MockFetcher`] and [`MockExecutor`]. Fixture plugins are published under
//! `https://plugins.test/<name>/` with a manifest, a single `main.js`, and a
//! scripted entry behavior.

use std::sync::Arc;

use manifold_config::{LoaderConfig, RegistryConfig};
use manifold_core::{ManifoldError, ModuleExports, StaticEntryModule};
use manifold_plugin::{PluginRegistry, ScriptLoader};
use serde_json::{Map, Value, json};

use crate::mock_executor::{MockExecutor, ScriptBehavior};
use crate::mock_fetcher::MockFetcher;

const FIXTURE_HOST: &str = "https://plugins.test";

/// How a fixture plugin's `main.js` behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryBehavior {
    /// Delivers its entry module under its own name and version.
    Register,
    /// Delivers its entry module under a different id.
    RegisterAs(String),
    /// Never invokes the entry callback.
    Silent,
    /// `main.js` cannot be fetched.
    ScriptMissing,
    /// `main.js` throws during execution.
    Throws(String),
}

/// A plugin served by the harness.
#[derive(Debug, Clone)]
pub struct FixturePlugin {
    name: String,
    version: String,
    dependencies: Map<String, Value>,
    optional_dependencies: Map<String, Value>,
    extensions: Vec<Value>,
    modules: Vec<(String, Vec<String>)>,
    entry: EntryBehavior,
}

impl FixturePlugin {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            dependencies: Map::new(),
            optional_dependencies: Map::new(),
            extensions: Vec::new(),
            modules: Vec::new(),
            entry: EntryBehavior::Register,
        }
    }

    pub fn depends_on(mut self, name: &str, range: &str) -> Self {
        self.dependencies.insert(name.to_string(), json!(range));
        self
    }

    pub fn optionally_depends_on(mut self, name: &str, range: &str) -> Self {
        self.optional_dependencies
            .insert(name.to_string(), json!(range));
        self
    }

    /// Add an extension with raw JSON properties.
    pub fn with_extension(mut self, kind: &str, properties: Value) -> Self {
        self.extensions
            .push(json!({ "type": kind, "properties": properties }));
        self
    }

    /// Add an extension whose `component` property references `code_ref`.
    pub fn with_component(self, kind: &str, code_ref: &str) -> Self {
        self.with_extension(kind, json!({ "component": { "$codeRef": code_ref } }))
    }

    /// Expose `module` from the entry module with the given export names.
    ///
    /// Each export's value is the string `"<plugin>:<module>.<export>"`.
    pub fn exposing(mut self, module: &str, exports: &[&str]) -> Self {
        self.modules.push((
            module.to_string(),
            exports.iter().map(ToString::to_string).collect(),
        ));
        self
    }

    pub fn entry(mut self, behavior: EntryBehavior) -> Self {
        self.entry = behavior;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_url(&self) -> String {
        format!("{FIXTURE_HOST}/{}/", self.name)
    }

    fn script_url(&self) -> String {
        format!("{}main.js", self.base_url())
    }

    /// The bundled manifest in its JSON wire form.
    pub fn manifest_json(&self) -> Value {
        json!({
            "name": self.name,
            "version": self.version,
            "dependencies": self.dependencies,
            "optionalDependencies": self.optional_dependencies,
            "baseURL": self.base_url(),
            "loadScripts": ["main.js"],
            "registrationMethod": "callback",
            "extensions": self.extensions,
        })
    }

    fn entry_module(&self) -> StaticEntryModule {
        self.modules
            .iter()
            .fold(StaticEntryModule::new(), |entry, (module, exports)| {
                let exports = exports.iter().fold(ModuleExports::new(), |acc, export| {
                    acc.with_export(export, format!("{}:{module}.{export}", self.name))
                });
                entry.with_module(module, exports)
            })
    }

    fn publish(&self, fetcher: &MockFetcher, executor: &MockExecutor) {
        fetcher.insert(
            &format!("{}plugin-manifest.json", self.base_url()),
            self.manifest_json().to_string(),
        );

        let script = self.script_url();
        if self.entry == EntryBehavior::ScriptMissing {
            fetcher.fail(&script, "503 Service Unavailable");
            return;
        }
        fetcher.insert(&script, format!("// {} entry", self.name));

        let behavior = match &self.entry {
            EntryBehavior::Register => ScriptBehavior::Register {
                id: format!("{}@{}", self.name, self.version),
                module: Arc::new(self.entry_module()),
            },
            EntryBehavior::RegisterAs(id) => ScriptBehavior::Register {
                id: id.clone(),
                module: Arc::new(self.entry_module()),
            },
            EntryBehavior::Throws(message) => ScriptBehavior::Fail(message.clone()),
            EntryBehavior::Silent | EntryBehavior::ScriptMissing => ScriptBehavior::Silent,
        };
        executor.set_behavior(&script, behavior);
    }
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    plugins: Vec<FixturePlugin>,
    loader_config: LoaderConfig,
    registry_config: RegistryConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            plugins: Vec::new(),
            loader_config: LoaderConfig::default(),
            registry_config: RegistryConfig::default(),
        }
    }

    /// Serve `plugin` from the mock fetcher.
    pub fn with_plugin(mut self, plugin: FixturePlugin) -> Self {
        self.plugins.push(plugin);
        self
    }

    pub fn with_loader_config(mut self, config: LoaderConfig) -> Self {
        self.loader_config = config;
        self
    }

    pub fn with_registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry_config = config;
        self
    }

    /// Build the harness. Must be called inside a Tokio runtime.
    pub fn build(self) -> Result<TestHarness, ManifoldError> {
        let fetcher = Arc::new(MockFetcher::new());
        let executor = Arc::new(MockExecutor::new());
        for plugin in &self.plugins {
            plugin.publish(&fetcher, &executor);
        }

        let loader = ScriptLoader::new(
            self.loader_config,
            Arc::clone(&fetcher) as _,
            Arc::clone(&executor) as _,
        );
        let registry = PluginRegistry::new(self.registry_config, Arc::new(loader))?;

        Ok(TestHarness {
            registry,
            fetcher,
            executor,
            plugins: self.plugins,
        })
    }
}

/// A registry plus the mocks behind its loader.
pub struct TestHarness {
    pub registry: PluginRegistry,
    pub fetcher: Arc<MockFetcher>,
    pub executor: Arc<MockExecutor>,
    plugins: Vec<FixturePlugin>,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Fetch and register the fixture plugin called `name`.
    pub async fn load(&self, name: &str) -> Result<String, ManifoldError> {
        let plugin = self
            .plugins
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| ManifoldError::PluginNotFound {
                name: name.to_string(),
            })?;
        self.registry.load_plugin(&plugin.base_url()).await
    }

    /// Load every fixture plugin in the given order, then wait for the registry to settle.
    pub async fn load_all(&self, names: &[&str]) -> Result<(), ManifoldError> {
        for name in names {
            self.load(name).await?;
        }
        self.registry.settled().await;
        Ok(())
    }
}
