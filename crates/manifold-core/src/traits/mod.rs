// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits supplied by the host application.
//!
//! The loader never talks to the network or a script engine directly; it
//! goes through these seams so hosts (and tests) can plug in their own
//! transport and execution environment.

pub mod entry;
pub mod executor;
pub mod fetcher;

pub use entry::{EntryModuleProvider, PluginEntryModule, StaticEntryModule};
pub use executor::{PluginScript, ScriptExecutor};
pub use fetcher::ResourceFetcher;
