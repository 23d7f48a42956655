// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Manifold integration tests.
//!
//! Provides in-memory collaborators for the plugin loader and a harness that
//! serves fixture plugins, so lifecycle tests run without a network or a
//! script engine.
//!
//! # Components
//!
//! - [`MockFetcher`] - URL to bytes table with injectable failures
//! - [`MockExecutor`] - per-script behavior (deliver an entry module, fail, stay silent)
//! - [`TestHarness`] - registry wired to both mocks, plus [`FixturePlugin`] builders

pub mod harness;
pub mod mock_executor;
pub mod mock_fetcher;

pub use harness::{EntryBehavior, FixturePlugin, TestHarness, TestHarnessBuilder};
pub use mock_executor::{MockExecutor, ScriptBehavior};
pub use mock_fetcher::MockFetcher;
