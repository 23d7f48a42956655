// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Manifold plugin runtime.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Manifold configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ManifoldConfig {
    /// Manifest and script loading settings.
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Plugin registry lifecycle settings.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Plugin loader configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfig {
    /// File name appended to a plugin base URL to locate its manifest.
    #[serde(default = "default_manifest_file_name")]
    pub manifest_file_name: String,

    /// Upper bound on a `callback` plugin's wait for its entry module.
    #[serde(default = "default_entry_callback_timeout_secs")]
    pub entry_callback_timeout_secs: u64,

    /// Timeout applied to each manifest or script fetch.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Largest manifest document accepted, in bytes.
    #[serde(default = "default_max_manifest_bytes")]
    pub max_manifest_bytes: usize,
}

impl LoaderConfig {
    pub fn entry_callback_timeout(&self) -> Duration {
        Duration::from_secs(self.entry_callback_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            manifest_file_name: default_manifest_file_name(),
            entry_callback_timeout_secs: default_entry_callback_timeout_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_manifest_bytes: default_max_manifest_bytes(),
        }
    }
}

fn default_manifest_file_name() -> String {
    "plugin-manifest.json".to_string()
}

fn default_entry_callback_timeout_secs() -> u64 {
    10
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_max_manifest_bytes() -> usize {
    1024 * 1024
}

/// Plugin registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Quiet period after which plugins waiting on never-registered
    /// dependencies are failed.
    #[serde(default = "default_unresolved_dependency_grace_ms")]
    pub unresolved_dependency_grace_ms: u64,

    /// Whether a freshly loaded plugin starts out enabled.
    #[serde(default = "default_enable_on_load")]
    pub enable_on_load: bool,
}

impl RegistryConfig {
    pub fn unresolved_dependency_grace(&self) -> Duration {
        Duration::from_millis(self.unresolved_dependency_grace_ms)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            unresolved_dependency_grace_ms: default_unresolved_dependency_grace_ms(),
            enable_on_load: default_enable_on_load(),
        }
    }
}

fn default_unresolved_dependency_grace_ms() -> u64 {
    2000
}

fn default_enable_on_load() -> bool {
    true
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
