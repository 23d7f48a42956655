// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin manifests, loading, dependency resolution, and the lifecycle registry.
//!
//! A manifest enters the [`PluginRegistry`], the [`resolver`] decides whether
//! its dependencies are satisfied, the [`PluginLoader`] runs its code and
//! resolves its code references, and the result settles the plugin into the
//! loaded or failed state. Subscribers see the union of extensions of every
//! loaded and enabled plugin.

pub mod code_ref;
pub mod extension;
pub mod fetch;
pub mod loader;
pub mod manifest;
pub mod range;
pub mod registry;
pub mod resolver;
pub mod snapshot;

pub use code_ref::CodeRef;
pub use extension::{Extension, LoadedExtension, SkippedExtension};
pub use fetch::HttpFetcher;
pub use loader::{
    manifest_url_for, ManifestTransform, PluginLoadResult, PluginLoader, ScriptLoader,
    DEFAULT_MANIFEST_FILE_NAME,
};
pub use manifest::{
    is_local_plugin_manifest, is_standard_plugin_manifest, parse_plugin_manifest,
    AnyPluginManifest, LocalPluginManifest, PluginManifest, PluginRuntimeMetadata,
};
pub use range::VersionRange;
pub use registry::{
    FailedPlugin, LoadedPlugin, PendingPlugin, PluginEntry, PluginInfo, PluginRegistry,
    PluginStatus,
};
pub use resolver::{
    activation_order, describe_unmet, resolve_dependencies, ActivationPlan, ProviderState,
    Resolution, UnmetDependency, UnmetReason,
};
pub use snapshot::{ExtensionSnapshot, Subscription};
