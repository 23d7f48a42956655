// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin registry: the lifecycle state machine.
//!
//! Every registered plugin is in exactly one of three states. It starts
//! `pending`, and moves once to `loaded` or `failed`. Loaded plugins carry an
//! orthogonal `enabled` flag the host toggles without re-running the load.
//!
//! All state lives behind one `std::sync::Mutex` that is never held across an
//! `.await`. Each transition re-runs the dependency resolver under the same
//! lock, spawns loads for plugins that became eligible, and publishes a new
//! [`ExtensionSnapshot`] when the visible set (or a plugin's state) changed.
//! Listeners are notified after the lock is released.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use manifold_config::RegistryConfig;
use manifold_core::{ManifoldError, PluginEntryModule};
use semver::Version;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::extension::{LoadedExtension, SkippedExtension};
use crate::loader::{PluginLoadResult, PluginLoader};
use crate::manifest::{AnyPluginManifest, PluginRuntimeMetadata, validate_any_manifest};
use crate::resolver::{
    ProviderState, Resolution, UnmetDependency, describe_unmet, resolve_dependencies,
};
use crate::snapshot::{ExtensionSnapshot, Notifier, Subscription};

/// A plugin waiting for its dependencies or for its load to finish.
#[derive(Debug, Clone)]
pub struct PendingPlugin {
    pub manifest: Arc<AnyPluginManifest>,
}

/// A plugin whose code loaded and whose extensions are available.
#[derive(Clone)]
pub struct LoadedPlugin {
    pub manifest: Arc<AnyPluginManifest>,
    pub loaded_extensions: Arc<[LoadedExtension]>,
    pub entry_module: Option<Arc<dyn PluginEntryModule>>,
    pub enabled: bool,
    pub disable_reason: Option<String>,
    pub skipped_extensions: Vec<SkippedExtension>,
    pub unmet_optional_dependencies: Vec<UnmetDependency>,
}

impl fmt::Debug for LoadedPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedPlugin")
            .field("name", &self.manifest.name())
            .field("version", &self.manifest.version().to_string())
            .field("extensions", &self.loaded_extensions.len())
            .field("entry_module", &self.entry_module.is_some())
            .field("enabled", &self.enabled)
            .field("disable_reason", &self.disable_reason)
            .finish_non_exhaustive()
    }
}

/// A plugin that can never load.
#[derive(Debug, Clone)]
pub struct FailedPlugin {
    pub manifest: Arc<AnyPluginManifest>,
    pub error_message: String,
    pub error_cause: Option<Arc<ManifoldError>>,
}

/// Registry entry for one plugin.
#[derive(Debug, Clone)]
pub enum PluginEntry {
    Pending(PendingPlugin),
    Loaded(LoadedPlugin),
    Failed(FailedPlugin),
}

impl PluginEntry {
    pub fn manifest(&self) -> &Arc<AnyPluginManifest> {
        match self {
            Self::Pending(p) => &p.manifest,
            Self::Loaded(p) => &p.manifest,
            Self::Failed(p) => &p.manifest,
        }
    }

    pub fn name(&self) -> &str {
        self.manifest().name()
    }

    pub fn status(&self) -> PluginStatus {
        match self {
            Self::Pending(_) => PluginStatus::Pending,
            Self::Loaded(p) => PluginStatus::Loaded {
                enabled: p.enabled,
                disable_reason: p.disable_reason.clone(),
            },
            Self::Failed(p) => PluginStatus::Failed {
                error_message: p.error_message.clone(),
            },
        }
    }
}

/// Display-oriented plugin state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PluginStatus {
    Pending,
    Loaded {
        enabled: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        disable_reason: Option<String>,
    },
    Failed {
        error_message: String,
    },
}

impl fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginStatus::Pending => write!(f, "pending"),
            PluginStatus::Loaded { enabled: true, .. } => write!(f, "enabled"),
            PluginStatus::Loaded {
                enabled: false,
                disable_reason: Some(reason),
            } => write!(f, "disabled ({reason})"),
            PluginStatus::Loaded { enabled: false, .. } => write!(f, "disabled"),
            PluginStatus::Failed { error_message } => write!(f, "failed: {error_message}"),
        }
    }
}

/// Per-plugin summary for hosts and the CLI.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginInfo {
    pub name: String,
    pub version: Version,
    pub local: bool,
    pub status: PluginStatus,
    pub extensions: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_extensions: Vec<SkippedExtension>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unmet_optional_dependencies: Vec<UnmetDependency>,
}

impl PluginInfo {
    fn from_entry(entry: &PluginEntry) -> Self {
        let manifest = entry.manifest();
        let (extensions, skipped, optional) = match entry {
            PluginEntry::Loaded(p) => (
                p.loaded_extensions.len(),
                p.skipped_extensions.clone(),
                p.unmet_optional_dependencies.clone(),
            ),
            _ => (0, Vec::new(), Vec::new()),
        };
        Self {
            name: manifest.name().to_string(),
            version: manifest.version().clone(),
            local: manifest.is_local(),
            status: entry.status(),
            extensions,
            skipped_extensions: skipped,
            unmet_optional_dependencies: optional,
        }
    }
}

struct Slot {
    /// Distinguishes this registration from earlier ones under the same name.
    registration: u64,
    entry: PluginEntry,
    in_flight: bool,
    optional_unmet: Vec<UnmetDependency>,
}

impl Slot {
    fn provider_state(&self) -> ProviderState<'_> {
        match &self.entry {
            PluginEntry::Pending(p) if self.in_flight => ProviderState::Loading(p.manifest.version()),
            PluginEntry::Pending(p) => ProviderState::Pending(p.manifest.version()),
            PluginEntry::Loaded(p) => ProviderState::Loaded(p.manifest.version()),
            PluginEntry::Failed(_) => ProviderState::Failed,
        }
    }

    /// Record the outcome of this registration's load.
    fn complete(&mut self, job: LoadJob, result: PluginLoadResult, enable_on_load: bool) {
        self.in_flight = false;
        match result {
            PluginLoadResult::Success {
                loaded_extensions,
                entry_module,
                skipped_extensions,
            } => {
                info!(
                    plugin = %job.name,
                    extensions = loaded_extensions.len(),
                    "plugin loaded"
                );
                self.entry = PluginEntry::Loaded(LoadedPlugin {
                    manifest: job.manifest,
                    loaded_extensions: Arc::from(loaded_extensions),
                    entry_module,
                    enabled: enable_on_load,
                    disable_reason: None,
                    skipped_extensions,
                    unmet_optional_dependencies: std::mem::take(&mut self.optional_unmet),
                });
            }
            PluginLoadResult::Failure {
                error_message,
                error_cause,
            } => {
                warn!(plugin = %job.name, error = %error_message, "plugin failed to load");
                self.fail(error_message, error_cause);
            }
        }
    }

    fn fail(&mut self, error_message: String, error_cause: Option<Arc<ManifoldError>>) {
        self.in_flight = false;
        self.entry = PluginEntry::Failed(FailedPlugin {
            manifest: Arc::clone(self.entry.manifest()),
            error_message,
            error_cause,
        });
    }
}

struct State {
    plugins: BTreeMap<String, Slot>,
    next_registration: u64,
    /// Loads still running for replaced registrations, per name. A name listed
    /// here is not loaded again until those loads have finished.
    stale_loads: BTreeMap<String, usize>,
    /// Bumped on every transition that can affect dependency resolution.
    generation: u64,
    snapshot: ExtensionSnapshot,
}

impl State {
    fn resolve(&self) -> Resolution {
        let candidates: BTreeMap<&str, &PluginRuntimeMetadata> = self
            .plugins
            .iter()
            .filter_map(|(name, slot)| match &slot.entry {
                PluginEntry::Pending(p)
                    if !slot.in_flight && !self.stale_loads.contains_key(name) =>
                {
                    Some((name.as_str(), p.manifest.metadata()))
                }
                _ => None,
            })
            .collect();
        let providers: BTreeMap<&str, ProviderState<'_>> = self
            .plugins
            .iter()
            .map(|(name, slot)| (name.as_str(), slot.provider_state()))
            .collect();
        resolve_dependencies(&candidates, &providers)
    }

    fn pending_count(&self) -> usize {
        self.plugins
            .values()
            .filter(|slot| matches!(slot.entry, PluginEntry::Pending(_)))
            .count()
    }

    fn any_in_flight(&self) -> bool {
        !self.stale_loads.is_empty() || self.plugins.values().any(|slot| slot.in_flight)
    }

    /// Forget one finished stale load for `name`; true once none remain.
    fn release_stale_load(&mut self, name: &str) -> bool {
        let Some(count) = self.stale_loads.get_mut(name) else {
            return false;
        };
        *count -= 1;
        if *count > 0 {
            return false;
        }
        self.stale_loads.remove(name);
        true
    }

    /// Recompute the active extension set under a new revision.
    fn publish(&mut self) {
        let extensions: Vec<LoadedExtension> = self
            .plugins
            .values()
            .filter_map(|slot| match &slot.entry {
                PluginEntry::Loaded(p) if p.enabled => Some(p.loaded_extensions.iter().cloned()),
                _ => None,
            })
            .flatten()
            .collect();
        self.snapshot = ExtensionSnapshot {
            revision: self.snapshot.revision + 1,
            extensions: Arc::from(extensions),
        };
    }
}

struct LoadJob {
    name: String,
    registration: u64,
    manifest: Arc<AnyPluginManifest>,
}

/// Work to do once the state lock is released.
#[must_use]
struct Followup {
    jobs: Vec<LoadJob>,
    publish: bool,
    arm_grace: Option<u64>,
}

struct Inner {
    config: RegistryConfig,
    loader: Arc<dyn PluginLoader>,
    runtime: Handle,
    state: Mutex<State>,
    notifier: Arc<Notifier>,
    pending: watch::Sender<usize>,
}

/// Registry of plugins and their lifecycle.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct PluginRegistry {
    inner: Arc<Inner>,
}

impl PluginRegistry {
    /// Create a registry that spawns loads on the current Tokio runtime.
    pub fn new(config: RegistryConfig, loader: Arc<dyn PluginLoader>) -> Result<Self, ManifoldError> {
        let runtime = Handle::try_current().map_err(|e| {
            ManifoldError::Internal(format!("plugin registry requires a Tokio runtime: {e}"))
        })?;
        Ok(Self::with_runtime(config, loader, runtime))
    }

    /// Create a registry that spawns loads on `runtime`.
    pub fn with_runtime(
        config: RegistryConfig,
        loader: Arc<dyn PluginLoader>,
        runtime: Handle,
    ) -> Self {
        let (pending, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                config,
                loader,
                runtime,
                state: Mutex::new(State {
                    plugins: BTreeMap::new(),
                    next_registration: 0,
                    stale_loads: BTreeMap::new(),
                    generation: 0,
                    snapshot: ExtensionSnapshot::empty(),
                }),
                notifier: Arc::new(Notifier::default()),
                pending,
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch the manifest of the plugin at `base_url` and register it.
    ///
    /// Returns the registered plugin name. Fetch and validation failures are
    /// returned to the caller since no plugin entry exists yet.
    pub async fn load_plugin(&self, base_url: &str) -> Result<String, ManifoldError> {
        let url = self.inner.loader.manifest_url(base_url)?;
        let manifest = self.inner.loader.load_plugin_manifest(&url).await?;
        let name = manifest.metadata.name.clone();
        self.register_plugin(manifest)?;
        Ok(name)
    }

    /// Add a plugin in the pending state.
    ///
    /// Fails with [`ManifoldError::DuplicatePlugin`] if the name is already
    /// registered in any state; the existing entry is left untouched.
    pub fn register_plugin(&self, manifest: impl Into<AnyPluginManifest>) -> Result<(), ManifoldError> {
        self.insert(manifest.into(), false)
    }

    /// Register `manifest`, discarding any existing plugin with the same name.
    ///
    /// A load still running for the replaced registration is ignored when it
    /// finishes, and the replacement is not loaded before then.
    pub fn replace_plugin(&self, manifest: impl Into<AnyPluginManifest>) -> Result<(), ManifoldError> {
        self.insert(manifest.into(), true)
    }

    fn insert(&self, manifest: AnyPluginManifest, replace: bool) -> Result<(), ManifoldError> {
        let manifest = self.inner.loader.transform_plugin_manifest(manifest);
        validate_any_manifest(&manifest)?;
        let name = manifest.name().to_string();

        let followup = {
            let mut state = self.lock_state();
            let previous = state
                .plugins
                .get(&name)
                .map(|slot| (slot.entry.status(), slot.in_flight));
            let mut visible_change = false;
            match previous {
                Some(_) if !replace => {
                    return Err(ManifoldError::DuplicatePlugin { name });
                }
                Some((status, in_flight)) => {
                    visible_change = matches!(status, PluginStatus::Loaded { enabled: true, .. });
                    info!(plugin = %name, previous = %status, "replacing plugin");
                    if in_flight {
                        *state.stale_loads.entry(name.clone()).or_default() += 1;
                        debug!(plugin = %name, "replacement waits for the running load");
                    }
                }
                None => {}
            }

            let registration = state.next_registration;
            state.next_registration += 1;
            info!(
                plugin = %name,
                version = %manifest.version(),
                local = manifest.is_local(),
                "plugin registered"
            );
            state.plugins.insert(
                name,
                Slot {
                    registration,
                    entry: PluginEntry::Pending(PendingPlugin {
                        manifest: Arc::new(manifest),
                    }),
                    in_flight: false,
                    optional_unmet: Vec::new(),
                },
            );
            state.generation += 1;
            self.advance(&mut state, visible_change)
        };

        self.dispatch(followup);
        Ok(())
    }

    /// Show or hide a loaded plugin's extensions.
    ///
    /// A no-op for plugins that are pending or failed.
    pub fn set_enabled(
        &self,
        name: &str,
        enabled: bool,
        reason: Option<String>,
    ) -> Result<(), ManifoldError> {
        let changed = {
            let mut state = self.lock_state();
            let slot = state
                .plugins
                .get_mut(name)
                .ok_or_else(|| ManifoldError::PluginNotFound {
                    name: name.to_string(),
                })?;

            let PluginEntry::Loaded(plugin) = &mut slot.entry else {
                debug!(plugin = name, "set_enabled ignored; plugin is not loaded");
                return Ok(());
            };
            plugin.disable_reason = if enabled { None } else { reason };
            let changed = plugin.enabled != enabled;
            plugin.enabled = enabled;
            if changed {
                info!(plugin = name, enabled, "plugin visibility changed");
                state.publish();
            }
            changed
        };

        if changed {
            self.notify();
        }
        Ok(())
    }

    /// The current active extension snapshot.
    pub fn get_extensions(&self) -> ExtensionSnapshot {
        self.lock_state().snapshot.clone()
    }

    /// Invoke `listener` with each new snapshot.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ExtensionSnapshot) + Send + Sync + 'static,
    {
        self.inner.notifier.subscribe(listener)
    }

    pub fn plugin_entry(&self, name: &str) -> Option<PluginEntry> {
        self.lock_state()
            .plugins
            .get(name)
            .map(|slot| slot.entry.clone())
    }

    pub fn plugin_info(&self, name: &str) -> Option<PluginInfo> {
        self.lock_state()
            .plugins
            .get(name)
            .map(|slot| PluginInfo::from_entry(&slot.entry))
    }

    /// Every registered plugin, ordered by name.
    pub fn list_plugins(&self) -> Vec<PluginInfo> {
        self.lock_state()
            .plugins
            .values()
            .map(|slot| PluginInfo::from_entry(&slot.entry))
            .collect()
    }

    /// The entry module of a loaded plugin, if it has one.
    pub fn entry_module(&self, name: &str) -> Option<Arc<dyn PluginEntryModule>> {
        match &self.lock_state().plugins.get(name)?.entry {
            PluginEntry::Loaded(p) => p.entry_module.clone(),
            _ => None,
        }
    }

    /// Wait until no plugin is pending.
    ///
    /// Plugins waiting on dependencies that are never registered settle once
    /// the unresolved-dependency grace period expires.
    pub async fn settled(&self) {
        let mut pending = self.inner.pending.subscribe();
        // The sender lives as long as `self`, so the wait cannot fail.
        let _ = pending.wait_for(|count| *count == 0).await;
    }

    /// Resolve, schedule loads, and compute what to do after unlocking.
    fn advance(&self, state: &mut State, mut publish: bool) -> Followup {
        let mut jobs = Vec::new();

        loop {
            let resolution = state.resolve();
            if resolution.is_fixed_point() {
                break;
            }

            for (name, unmet) in resolution.doomed {
                if let Some(slot) = state.plugins.get_mut(&name) {
                    let message = format!("unresolved dependencies: {}", describe_unmet(&unmet));
                    warn!(plugin = %name, error = %message, "plugin failed");
                    slot.fail(message, None);
                    publish = true;
                }
            }

            let mut optional = resolution.optional_unmet;
            for name in resolution.eligible {
                if let Some(slot) = state.plugins.get_mut(&name) {
                    slot.in_flight = true;
                    slot.optional_unmet = optional.remove(&name).unwrap_or_default();
                    for unmet in &slot.optional_unmet {
                        info!(plugin = %name, "optional {unmet}");
                    }
                    debug!(plugin = %name, "dependencies satisfied; loading");
                    jobs.push(LoadJob {
                        name,
                        registration: slot.registration,
                        manifest: Arc::clone(slot.entry.manifest()),
                    });
                }
            }
        }

        if publish {
            state.publish();
        }

        let pending = state.pending_count();
        self.inner.pending.send_replace(pending);
        let arm_grace = (pending > 0 && !state.any_in_flight()).then_some(state.generation);

        Followup {
            jobs,
            publish,
            arm_grace,
        }
    }

    fn dispatch(&self, followup: Followup) {
        for job in followup.jobs {
            let registry = self.clone();
            self.inner.runtime.spawn(async move { registry.run_load(job).await });
        }
        if let Some(generation) = followup.arm_grace {
            self.arm_grace_timer(generation);
        }
        if followup.publish {
            self.notify();
        }
    }

    fn notify(&self) {
        self.inner.notifier.notify(|| self.get_extensions());
    }

    async fn run_load(self, job: LoadJob) {
        let load = self.inner.loader.load_plugin(&job.manifest);
        let result = AssertUnwindSafe(load)
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                PluginLoadResult::failure(ManifoldError::Internal(format!(
                    "loader panicked while loading plugin `{}`",
                    job.name
                )))
            });
        self.settle(job, result);
    }

    fn settle(&self, job: LoadJob, result: PluginLoadResult) {
        let enable_on_load = self.inner.config.enable_on_load;
        let followup = {
            let mut state = self.lock_state();
            match state.plugins.get_mut(&job.name) {
                Some(slot) if slot.registration == job.registration && slot.in_flight => {
                    slot.complete(job, result, enable_on_load);
                    state.generation += 1;
                    self.advance(&mut state, true)
                }
                _ => {
                    debug!(plugin = %job.name, "discarding load result for replaced registration");
                    if !state.release_stale_load(&job.name) {
                        return;
                    }
                    state.generation += 1;
                    self.advance(&mut state, false)
                }
            }
        };

        self.dispatch(followup);
    }

    fn arm_grace_timer(&self, generation: u64) {
        let grace = self.inner.config.unresolved_dependency_grace();
        let registry = Arc::downgrade(&self.inner);
        debug!(generation, ?grace, "unresolved dependency timer armed");
        self.inner.runtime.spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(inner) = registry.upgrade() {
                PluginRegistry { inner }.expire_unresolved(generation);
            }
        });
    }

    /// Fail plugins still waiting on dependencies nobody registered.
    fn expire_unresolved(&self, generation: u64) {
        let followup = {
            let mut state = self.lock_state();
            if state.generation != generation || state.any_in_flight() {
                return;
            }

            let waiting = state.resolve().waiting;
            if waiting.is_empty() {
                return;
            }
            for (name, unmet) in waiting {
                if let Some(slot) = state.plugins.get_mut(&name) {
                    let message = format!("unresolved dependencies: {}", describe_unmet(&unmet));
                    warn!(plugin = %name, error = %message, "plugin failed");
                    slot.fail(message, None);
                }
            }

            state.generation += 1;
            self.advance(&mut state, true)
        };

        self.dispatch(followup);
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("PluginRegistry")
            .field("plugins", &state.plugins.len())
            .field("revision", &state.snapshot.revision)
            .field("listeners", &self.inner.notifier.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use url::Url;

    use crate::code_ref::resolve_extensions;
    use crate::extension::Extension;
    use crate::range::VersionRange;
    use crate::manifest::{LocalPluginManifest, PluginManifest};

    /// Loads local manifests after a delay; names in `failing` fail.
    ///
    /// Like the entry callback slot, only one load per name may run at a time.
    #[derive(Default)]
    struct FakeLoader {
        failing: HashSet<String>,
        panicking: HashSet<String>,
        delay: Duration,
        loads: AtomicUsize,
        running: std::sync::Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl PluginLoader for FakeLoader {
        async fn load_plugin_manifest(&self, url: &Url) -> Result<PluginManifest, ManifoldError> {
            Err(ManifoldError::Fetch {
                url: url.to_string(),
                message: "offline".into(),
                source: None,
            })
        }

        async fn load_plugin(&self, manifest: &AnyPluginManifest) -> PluginLoadResult {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let name = manifest.name().to_string();
            if !self.running.lock().unwrap().insert(name.clone()) {
                return PluginLoadResult::failure(ManifoldError::EntryModule {
                    plugin: name,
                    message: "an entry callback is already pending for this plugin".to_string(),
                });
            }
            tokio::time::sleep(self.delay).await;
            self.running.lock().unwrap().remove(&name);
            if self.panicking.contains(manifest.name()) {
                panic!("loader bug");
            }
            if self.failing.contains(manifest.name()) {
                return PluginLoadResult::failure(ManifoldError::Internal("boom".into()));
            }
            match resolve_extensions(manifest.metadata(), manifest.extensions(), None) {
                Ok(resolved) => PluginLoadResult::success(resolved.loaded),
                Err(e) => PluginLoadResult::failure(e),
            }
        }
    }

    fn local(name: &str, version: &str, extensions: usize) -> LocalPluginManifest {
        (0..extensions).fold(
            LocalPluginManifest::new(name, Version::parse(version).unwrap()),
            |m, i| m.with_extension(Extension::new("app.item").with_property("n", json!(i))),
        )
    }

    fn registry(loader: FakeLoader) -> PluginRegistry {
        PluginRegistry::new(RegistryConfig::default(), Arc::new(loader)).unwrap()
    }

    fn uids(snapshot: &ExtensionSnapshot) -> Vec<String> {
        snapshot.extensions.iter().map(|e| e.uid.clone()).collect()
    }

    #[tokio::test]
    async fn dependent_registered_first_waits_for_provider() {
        let registry = registry(FakeLoader::default());
        registry
            .register_plugin(
                local("b", "1.0.0", 1).with_dependency("a", ">=1.0.0".parse::<VersionRange>().unwrap()),
            )
            .unwrap();
        assert_eq!(registry.plugin_info("b").unwrap().status, PluginStatus::Pending);

        registry.register_plugin(local("a", "1.2.0", 2)).unwrap();
        registry.settled().await;

        assert_eq!(uids(&registry.get_extensions()), vec!["a[0]", "a[1]", "b[0]"]);
    }

    #[tokio::test]
    async fn duplicate_registration_keeps_original() {
        let registry = registry(FakeLoader::default());
        registry.register_plugin(local("a", "1.0.0", 1)).unwrap();

        let err = registry.register_plugin(local("a", "2.0.0", 3)).unwrap_err();
        assert!(matches!(err, ManifoldError::DuplicatePlugin { ref name } if name == "a"));

        registry.settled().await;
        let info = registry.plugin_info("a").unwrap();
        assert_eq!(info.version, Version::new(1, 0, 0));
        assert_eq!(info.extensions, 1);
    }

    #[tokio::test]
    async fn set_enabled_on_unknown_plugin_is_an_error() {
        let registry = registry(FakeLoader::default());
        let err = registry.set_enabled("ghost", false, None).unwrap_err();
        assert!(matches!(err, ManifoldError::PluginNotFound { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn set_enabled_on_pending_plugin_is_a_no_op() {
        let registry = registry(FakeLoader {
            delay: Duration::from_secs(1),
            ..FakeLoader::default()
        });
        registry.register_plugin(local("slow", "1.0.0", 1)).unwrap();

        registry.set_enabled("slow", false, Some("maintenance".into())).unwrap();
        registry.settled().await;

        let status = registry.plugin_info("slow").unwrap().status;
        assert_eq!(
            status,
            PluginStatus::Loaded {
                enabled: true,
                disable_reason: None
            }
        );
    }

    #[tokio::test]
    async fn disabled_reason_is_reported() {
        let registry = registry(FakeLoader::default());
        registry.register_plugin(local("a", "1.0.0", 2)).unwrap();
        registry.settled().await;

        registry.set_enabled("a", false, Some("license expired".into())).unwrap();
        let info = registry.plugin_info("a").unwrap();
        assert_eq!(info.status.to_string(), "disabled (license expired)");
        assert!(registry.get_extensions().is_empty());
    }

    #[tokio::test]
    async fn enable_on_load_false_hides_new_plugins() {
        let config = RegistryConfig {
            enable_on_load: false,
            ..RegistryConfig::default()
        };
        let registry = PluginRegistry::new(config, Arc::new(FakeLoader::default())).unwrap();
        registry.register_plugin(local("a", "1.0.0", 2)).unwrap();
        registry.settled().await;

        assert!(registry.get_extensions().is_empty());
        registry.set_enabled("a", true, None).unwrap();
        assert_eq!(registry.get_extensions().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn replaced_registration_discards_stale_load() {
        let registry = registry(FakeLoader {
            delay: Duration::from_secs(1),
            ..FakeLoader::default()
        });
        registry.register_plugin(local("a", "1.0.0", 1)).unwrap();
        tokio::task::yield_now().await;

        registry.replace_plugin(local("a", "1.1.0", 3)).unwrap();
        registry.settled().await;

        let info = registry.plugin_info("a").unwrap();
        assert_eq!(info.version, Version::new(1, 1, 0));
        assert_eq!(registry.get_extensions().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn replacement_waits_for_running_load() {
        let loader = Arc::new(FakeLoader {
            delay: Duration::from_secs(5),
            ..FakeLoader::default()
        });
        let registry = PluginRegistry::new(RegistryConfig::default(), loader.clone()).unwrap();
        registry.register_plugin(local("a", "1.0.0", 1)).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);

        registry.replace_plugin(local("a", "2.0.0", 2)).unwrap();
        registry.replace_plugin(local("a", "3.0.0", 2)).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(registry.plugin_info("a").unwrap().status, PluginStatus::Pending);

        registry.settled().await;
        let info = registry.plugin_info("a").unwrap();
        assert_eq!(info.version, Version::new(3, 0, 0));
        assert!(matches!(info.status, PluginStatus::Loaded { .. }), "{:?}", info.status);
        assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
        assert_eq!(registry.get_extensions().len(), 2);
    }

    #[tokio::test]
    async fn loader_failure_is_contained() {
        let registry = registry(FakeLoader {
            failing: HashSet::from(["bad".to_string()]),
            panicking: HashSet::from(["worse".to_string()]),
            ..FakeLoader::default()
        });
        registry.register_plugin(local("bad", "1.0.0", 1)).unwrap();
        registry.register_plugin(local("worse", "1.0.0", 1)).unwrap();
        registry.register_plugin(local("good", "1.0.0", 1)).unwrap();
        registry.settled().await;

        assert!(matches!(
            registry.plugin_entry("bad"),
            Some(PluginEntry::Failed(FailedPlugin { ref error_message, .. })) if error_message.contains("boom")
        ));
        assert!(matches!(
            registry.plugin_info("worse").unwrap().status,
            PluginStatus::Failed { ref error_message } if error_message.contains("panicked")
        ));
        assert_eq!(uids(&registry.get_extensions()), vec!["good[0]"]);
    }

    #[tokio::test]
    async fn dependent_of_failed_plugin_fails_without_loading() {
        let loader = Arc::new(FakeLoader {
            failing: HashSet::from(["base".to_string()]),
            ..FakeLoader::default()
        });
        let registry = PluginRegistry::new(RegistryConfig::default(), loader.clone()).unwrap();
        registry.register_plugin(local("base", "1.0.0", 1)).unwrap();
        registry
            .register_plugin(local("top", "1.0.0", 1).with_dependency("base", VersionRange::any()))
            .unwrap();
        registry.settled().await;

        let PluginStatus::Failed { error_message } = registry.plugin_info("top").unwrap().status
        else {
            panic!("top should have failed");
        };
        assert!(error_message.contains("`base`"));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_dependency_fails_after_grace_period() {
        let registry = registry(FakeLoader::default());
        registry
            .register_plugin(local("lonely", "1.0.0", 1).with_dependency("ghost", VersionRange::any()))
            .unwrap();

        let start = tokio::time::Instant::now();
        registry.settled().await;
        assert!(start.elapsed() >= Duration::from_millis(2000));

        let PluginStatus::Failed { error_message } = registry.plugin_info("lonely").unwrap().status
        else {
            panic!("lonely should have failed");
        };
        assert!(error_message.contains("`ghost`"), "{error_message}");
        assert!(error_message.contains("not registered"));
    }

    #[tokio::test(start_paused = true)]
    async fn late_registration_within_grace_period_satisfies_dependency() {
        let registry = registry(FakeLoader::default());
        registry
            .register_plugin(local("b", "1.0.0", 1).with_dependency("a", VersionRange::any()))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        registry.register_plugin(local("a", "1.0.0", 1)).unwrap();
        registry.settled().await;

        assert_eq!(registry.get_extensions().len(), 2);
    }

    #[tokio::test]
    async fn snapshot_revisions_increase_and_listeners_see_them() {
        let registry = registry(FakeLoader::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = registry.subscribe(move |snap| sink.lock().unwrap().push(snap.revision));

        registry.register_plugin(local("a", "1.0.0", 1)).unwrap();
        registry.settled().await;
        registry.set_enabled("a", false, None).unwrap();

        let seen = seen.lock().unwrap().clone();
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] < w[1]), "{seen:?}");
        assert_eq!(*seen.last().unwrap(), registry.get_extensions().revision);
    }

    #[tokio::test]
    async fn list_plugins_is_sorted_by_name() {
        let registry = registry(FakeLoader::default());
        for name in ["zeta", "alpha", "mid"] {
            registry.register_plugin(local(name, "1.0.0", 0)).unwrap();
        }
        registry.settled().await;

        let names: Vec<String> = registry.list_plugins().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn new_outside_runtime_is_an_error() {
        let result = PluginRegistry::new(RegistryConfig::default(), Arc::new(FakeLoader::default()));
        assert!(matches!(result, Err(ManifoldError::Internal(_))));
    }
}
