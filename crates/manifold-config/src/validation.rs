// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::ManifoldConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn invalid(key: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        key: key.to_string(),
        message: message.into(),
    }
}

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every violation instead of failing on the first one.
pub fn validate_config(config: &ManifoldConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let loader = &config.loader;

    let file_name = loader.manifest_file_name.trim();
    if file_name.is_empty() {
        errors.push(invalid("loader.manifest_file_name", "must not be empty"));
    } else if file_name.starts_with('/') || file_name.contains("..") {
        errors.push(invalid(
            "loader.manifest_file_name",
            format!("`{file_name}` must be a path relative to the plugin base URL"),
        ));
    }

    if loader.entry_callback_timeout_secs == 0 {
        errors.push(invalid("loader.entry_callback_timeout_secs", "must be at least 1"));
    }
    if loader.fetch_timeout_secs == 0 {
        errors.push(invalid("loader.fetch_timeout_secs", "must be at least 1"));
    }
    if loader.max_manifest_bytes < 1024 {
        errors.push(invalid(
            "loader.max_manifest_bytes",
            format!("must be at least 1024, got {}", loader.max_manifest_bytes),
        ));
    }

    if config.registry.unresolved_dependency_grace_ms == 0 {
        errors.push(invalid("registry.unresolved_dependency_grace_ms", "must be at least 1"));
    }

    let level = config.logging.level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(invalid(
            "logging.level",
            format!(
                "`{}` is not one of: {}",
                config.logging.level,
                LOG_LEVELS.join(", ")
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
