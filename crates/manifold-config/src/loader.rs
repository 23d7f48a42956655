// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./manifold.toml` > `~/.config/manifold/manifold.toml` >
//! `/etc/manifold/manifold.toml` with environment variable overrides via `MANIFOLD_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::ManifoldConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/manifold/manifold.toml`
/// 3. `~/.config/manifold/manifold.toml`
/// 4. `./manifold.toml`
/// 5. `MANIFOLD_*` environment variables
pub fn load_config() -> Result<ManifoldConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<ManifoldConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ManifoldConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ManifoldConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ManifoldConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used for config loading, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ManifoldConfig::default()))
        .merge(Toml::file("/etc/manifold/manifold.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("manifold/manifold.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("manifold.toml"))
        .merge(env_provider())
}

/// Environment provider mapping `MANIFOLD_SECTION_KEY` to `section.key`.
///
/// Uses `Env::map()` rather than `Env::split("_")` because keys such as
/// `manifest_file_name` contain underscores themselves.
fn env_provider() -> Env {
    Env::prefixed("MANIFOLD_").map(|key| {
        let mapped = key
            .as_str()
            .replacen("loader_", "loader.", 1)
            .replacen("registry_", "registry.", 1)
            .replacen("logging_", "logging.", 1);
        mapped.into()
    })
}
