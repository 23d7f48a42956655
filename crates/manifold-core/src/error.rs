// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Manifold plugin runtime.

use thiserror::Error;

/// The primary error type used across the loader, resolver, and registry.
///
/// Plugin-specific runtime failures are normally captured into a failed
/// registry entry instead of being returned; only manifest fetching and
/// registry misuse (duplicate names, unknown names) reach the caller.
#[derive(Debug, Error)]
pub enum ManifoldError {
    /// A manifest or script could not be fetched.
    #[error("failed to fetch {url}: {message}")]
    Fetch {
        url: String,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A manifest is malformed or violates a schema rule.
    #[error("invalid plugin manifest: {0}")]
    Validation(String),

    /// A plugin with the same name is already present in the registry.
    #[error("plugin `{name}` is already registered")]
    DuplicatePlugin { name: String },

    /// The named plugin is not present in the registry.
    #[error("plugin `{name}` is not registered")]
    PluginNotFound { name: String },

    /// A code reference points at an export the entry module does not provide.
    #[error("code reference `{code_ref}` could not be resolved: {reason}")]
    MissingCodeRef { code_ref: String, reason: String },

    /// The plugin's entry module is missing, broken, or mismatched.
    #[error("entry module error for plugin `{plugin}`: {message}")]
    EntryModule { plugin: String, message: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
