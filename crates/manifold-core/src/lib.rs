// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Manifold plugin runtime.
//!
//! This crate provides the error type, the shared value types, and the traits
//! describing the host collaborators (resource fetching, script execution,
//! entry module retrieval) that the plugin loader is built on.

pub mod callback;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use callback::{EntryCallback, EntryCallbacks, PendingEntry, RegisteredEntry};
pub use error::ManifoldError;
pub use types::{ExportValue, ModuleExports, PluginId, RegistrationMethod};

pub use traits::{
    EntryModuleProvider, PluginEntryModule, PluginScript, ResourceFetcher, ScriptExecutor,
    StaticEntryModule,
};
