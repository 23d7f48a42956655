// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin loader contract and the script-based production loader.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use manifold_config::LoaderConfig;
use manifold_core::{
    EntryCallbacks, EntryModuleProvider, ManifoldError, PluginEntryModule, PluginId, PluginScript,
    RegistrationMethod, ResourceFetcher, ScriptExecutor,
};
use semver::Version;
use tracing::{debug, info, warn};
use url::Url;

use crate::code_ref::resolve_extensions;
use crate::extension::{LoadedExtension, SkippedExtension};
use crate::manifest::{AnyPluginManifest, PluginManifest, validate_plugin_manifest};

/// File name of a bundled manifest relative to its plugin base URL.
pub const DEFAULT_MANIFEST_FILE_NAME: &str = "plugin-manifest.json";

/// Host hook that may rewrite manifests before they are registered.
pub type ManifestTransform = Arc<dyn Fn(AnyPluginManifest) -> AnyPluginManifest + Send + Sync>;

/// Outcome of loading one plugin.
#[derive(Clone)]
pub enum PluginLoadResult {
    Success {
        loaded_extensions: Vec<LoadedExtension>,
        entry_module: Option<Arc<dyn PluginEntryModule>>,
        skipped_extensions: Vec<SkippedExtension>,
    },
    Failure {
        error_message: String,
        error_cause: Option<Arc<ManifoldError>>,
    },
}

impl PluginLoadResult {
    pub fn success(loaded_extensions: Vec<LoadedExtension>) -> Self {
        Self::Success {
            loaded_extensions,
            entry_module: None,
            skipped_extensions: Vec::new(),
        }
    }

    /// A failure carrying `cause` both as message and as the underlying error.
    pub fn failure(cause: ManifoldError) -> Self {
        Self::Failure {
            error_message: cause.to_string(),
            error_cause: Some(Arc::new(cause)),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl fmt::Debug for PluginLoadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success {
                loaded_extensions,
                entry_module,
                skipped_extensions,
            } => f
                .debug_struct("Success")
                .field("loaded_extensions", &loaded_extensions.len())
                .field("entry_module", &entry_module.is_some())
                .field("skipped_extensions", skipped_extensions)
                .finish(),
            Self::Failure { error_message, .. } => f
                .debug_struct("Failure")
                .field("error_message", error_message)
                .finish_non_exhaustive(),
        }
    }
}

/// Fetches manifests and turns registered manifests into loaded extensions.
#[async_trait]
pub trait PluginLoader: Send + Sync {
    /// Where the bundled manifest of the plugin at `base_url` lives.
    fn manifest_url(&self, base_url: &str) -> Result<Url, ManifoldError> {
        manifest_url_for(base_url, DEFAULT_MANIFEST_FILE_NAME)
    }

    /// Fetch, parse, and validate a bundled manifest.
    async fn load_plugin_manifest(&self, manifest_url: &Url)
    -> Result<PluginManifest, ManifoldError>;

    /// Apply host-specific rewriting before registration.
    fn transform_plugin_manifest(&self, manifest: AnyPluginManifest) -> AnyPluginManifest {
        manifest
    }

    /// Load the plugin's code and resolve its extensions.
    ///
    /// Never returns an error: every failure is reported as
    /// [`PluginLoadResult::Failure`].
    async fn load_plugin(&self, manifest: &AnyPluginManifest) -> PluginLoadResult;
}

/// Build the manifest URL for a plugin base URL.
///
/// The base URL must be absolute and end with `/`.
pub fn manifest_url_for(base_url: &str, file_name: &str) -> Result<Url, ManifoldError> {
    let base = Url::parse(base_url).map_err(|e| {
        ManifoldError::Validation(format!("plugin base URL `{base_url}` is not absolute: {e}"))
    })?;
    if base.cannot_be_a_base() || !base.path().ends_with('/') {
        return Err(ManifoldError::Validation(format!(
            "plugin base URL `{base_url}` must end with `/`"
        )));
    }
    base.join(file_name).map_err(|e| {
        ManifoldError::Validation(format!(
            "cannot resolve `{file_name}` against `{base_url}`: {e}"
        ))
    })
}

/// Loader that fetches plugin scripts and hands them to a [`ScriptExecutor`].
pub struct ScriptLoader {
    config: LoaderConfig,
    fetcher: Arc<dyn ResourceFetcher>,
    executor: Arc<dyn ScriptExecutor>,
    callbacks: EntryCallbacks,
    entry_provider: Option<Arc<dyn EntryModuleProvider>>,
    transform: Option<ManifestTransform>,
}

impl ScriptLoader {
    pub fn new(
        config: LoaderConfig,
        fetcher: Arc<dyn ResourceFetcher>,
        executor: Arc<dyn ScriptExecutor>,
    ) -> Self {
        Self {
            config,
            fetcher,
            executor,
            callbacks: EntryCallbacks::new(),
            entry_provider: None,
            transform: None,
        }
    }

    /// Entry module source for plugins using `custom` registration.
    pub fn with_entry_provider(mut self, provider: Arc<dyn EntryModuleProvider>) -> Self {
        self.entry_provider = Some(provider);
        self
    }

    pub fn with_transform(mut self, transform: ManifestTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// The table of loads currently waiting for an entry callback.
    pub fn entry_callbacks(&self) -> &EntryCallbacks {
        &self.callbacks
    }

    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, ManifoldError> {
        let timeout = self.config.fetch_timeout();
        match tokio::time::timeout(timeout, self.fetcher.fetch(url)).await {
            Ok(result) => result,
            Err(elapsed) => Err(ManifoldError::Fetch {
                url: url.to_string(),
                message: format!("no response within {timeout:?}"),
                source: Some(Box::new(elapsed)),
            }),
        }
    }

    /// Run the plugin's scripts and obtain its entry module.
    async fn load_bundled(
        &self,
        manifest: &PluginManifest,
    ) -> Result<Arc<dyn PluginEntryModule>, ManifoldError> {
        let metadata = &manifest.metadata;
        let id = PluginId::new(&metadata.name, metadata.version.to_string());
        let base = Url::parse(&manifest.base_url).map_err(|e| {
            ManifoldError::Validation(format!("baseURL `{}`: {e}", manifest.base_url))
        })?;

        // The slot must exist before any script can invoke the callback.
        let pending = match manifest.registration_method {
            RegistrationMethod::Callback => Some(self.callbacks.expect(&metadata.name)?),
            RegistrationMethod::Custom => None,
        };

        for (index, script) in manifest.load_scripts.iter().enumerate() {
            let url = base.join(script).map_err(|e| {
                ManifoldError::Validation(format!("loadScripts[{index}] `{script}`: {e}"))
            })?;
            let source = self.fetch(&url).await?;
            debug!(plugin = %id, script = %url, bytes = source.len(), "executing plugin script");
            self.executor
                .execute(
                    PluginScript {
                        plugin: id.clone(),
                        url,
                        index,
                        source,
                    },
                    self.callbacks.callback(),
                )
                .await?;
        }

        match pending {
            Some(pending) => {
                let timeout = self.config.entry_callback_timeout();
                let delivered = pending.wait(timeout).await.map_err(|e| match e {
                    ManifoldError::Timeout { duration } => ManifoldError::EntryModule {
                        plugin: metadata.name.clone(),
                        message: format!("entry callback was not invoked within {duration:?}"),
                    },
                    other => other,
                })?;
                check_delivered_version(&metadata.name, &metadata.version, &delivered.id)?;
                Ok(delivered.module)
            }
            None => {
                let provider =
                    self.entry_provider
                        .as_ref()
                        .ok_or_else(|| ManifoldError::EntryModule {
                            plugin: metadata.name.clone(),
                            message: "plugin uses custom registration but no entry module provider is configured".to_string(),
                        })?;
                provider.entry_module(&id).await
            }
        }
    }
}

fn check_delivered_version(
    name: &str,
    expected: &Version,
    delivered: &PluginId,
) -> Result<(), ManifoldError> {
    let Some(announced) = &delivered.version else {
        return Ok(());
    };
    match Version::parse(announced) {
        Ok(version) if version == *expected => Ok(()),
        _ => Err(ManifoldError::EntryModule {
            plugin: name.to_string(),
            message: format!(
                "entry callback announced version {announced} but the manifest declares {expected}"
            ),
        }),
    }
}

#[async_trait]
impl PluginLoader for ScriptLoader {
    fn manifest_url(&self, base_url: &str) -> Result<Url, ManifoldError> {
        manifest_url_for(base_url, &self.config.manifest_file_name)
    }

    async fn load_plugin_manifest(
        &self,
        manifest_url: &Url,
    ) -> Result<PluginManifest, ManifoldError> {
        let bytes = self.fetch(manifest_url).await?;
        if bytes.len() > self.config.max_manifest_bytes {
            return Err(ManifoldError::Validation(format!(
                "manifest at {manifest_url} is {} bytes, over the {} byte limit",
                bytes.len(),
                self.config.max_manifest_bytes
            )));
        }

        let mut manifest: PluginManifest = serde_json::from_slice(&bytes)
            .map_err(|e| ManifoldError::Validation(format!("malformed manifest JSON: {e}")))?;

        let mut base = manifest_url.join(&manifest.base_url).map_err(|e| {
            ManifoldError::Validation(format!(
                "plugin `{}`: baseURL `{}`: {e}",
                manifest.metadata.name, manifest.base_url
            ))
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        manifest.base_url = base.to_string();

        validate_plugin_manifest(&manifest)?;
        debug!(
            plugin = %manifest.metadata.name,
            version = %manifest.metadata.version,
            url = %manifest_url,
            "manifest fetched"
        );
        Ok(manifest)
    }

    fn transform_plugin_manifest(&self, manifest: AnyPluginManifest) -> AnyPluginManifest {
        let Some(transform) = &self.transform else {
            return manifest;
        };
        let original = manifest.clone();
        let transformed = transform(manifest);
        if transformed.is_local() != original.is_local()
            || transformed.name() != original.name()
            || transformed.version() != original.version()
        {
            warn!(
                plugin = %original.name(),
                "manifest transform changed the plugin identity; keeping the original manifest"
            );
            return original;
        }
        transformed
    }

    async fn load_plugin(&self, manifest: &AnyPluginManifest) -> PluginLoadResult {
        let (entry_module, resolved) = match manifest {
            AnyPluginManifest::Local(local) => (
                None,
                resolve_extensions(&local.metadata, &local.extensions, None),
            ),
            AnyPluginManifest::Bundled(bundled) => match self.load_bundled(bundled).await {
                Ok(entry) => {
                    let resolved = resolve_extensions(
                        &bundled.metadata,
                        &bundled.extensions,
                        Some(entry.as_ref()),
                    );
                    (Some(entry), resolved)
                }
                Err(e) => return PluginLoadResult::failure(e),
            },
        };

        match resolved {
            Ok(resolved) => {
                info!(
                    plugin = %manifest.name(),
                    version = %manifest.version(),
                    extensions = resolved.loaded.len(),
                    skipped = resolved.skipped.len(),
                    "plugin code loaded"
                );
                PluginLoadResult::Success {
                    loaded_extensions: resolved.loaded,
                    entry_module,
                    skipped_extensions: resolved.skipped,
                }
            }
            Err(e) => PluginLoadResult::failure(e),
        }
    }
}

impl fmt::Debug for ScriptLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptLoader")
            .field("config", &self.config)
            .field("callbacks", &self.callbacks)
            .field("entry_provider", &self.entry_provider.is_some())
            .field("transform", &self.transform.is_some())
            .finish_non_exhaustive()
    }
}
