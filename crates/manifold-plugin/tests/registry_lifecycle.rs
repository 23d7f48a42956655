// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end lifecycle tests: manifests fetched through the script loader,
//! dependencies resolved by the registry, extensions published to listeners.
//!
//! Each test builds an isolated TestHarness serving fixture plugins from
//! memory. Tests are independent and order-insensitive.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use manifold_config::{LoaderConfig, RegistryConfig};
use manifold_core::ManifoldError;
use manifold_plugin::{
    parse_plugin_manifest, LoadedExtension, PluginEntry, PluginLoadResult, PluginLoader,
    PluginStatus, ScriptLoader, Subscription,
};
use manifold_test_utils::{
    EntryBehavior, FixturePlugin, MockExecutor, MockFetcher, TestHarness,
};
use serde_json::json;

fn plugin_a() -> FixturePlugin {
    FixturePlugin::new("a", "1.2.0")
        .exposing("Shell", &["default", "Toolbar"])
        .with_component("app.page", "Shell")
        .with_component("app.toolbar", "Shell.Toolbar")
}

fn plugin_b() -> FixturePlugin {
    FixturePlugin::new("b", "1.0.0")
        .depends_on("a", ">=1.0.0")
        .exposing("Search", &["default"])
        .with_component("app.page", "Search")
}

fn uids(harness: &TestHarness) -> Vec<String> {
    harness
        .registry
        .get_extensions()
        .extensions
        .iter()
        .map(|e| e.uid.clone())
        .collect()
}

fn failure_message(harness: &TestHarness, name: &str) -> String {
    match harness.registry.plugin_info(name).map(|info| info.status) {
        Some(PluginStatus::Failed { error_message }) => error_message,
        other => panic!("expected `{name}` to have failed, got {other:?}"),
    }
}

fn is_loaded(harness: &TestHarness, name: &str) -> bool {
    matches!(
        harness.registry.plugin_info(name).map(|info| info.status),
        Some(PluginStatus::Loaded { .. })
    )
}

// ---- Test 1: Dependency ordering ----

#[tokio::test]
async fn provider_first_loads_both_plugins() {
    let harness = TestHarness::builder()
        .with_plugin(plugin_a())
        .with_plugin(plugin_b())
        .build()
        .unwrap();

    harness.load_all(&["a", "b"]).await.unwrap();

    assert!(is_loaded(&harness, "a"));
    assert!(is_loaded(&harness, "b"));
    assert_eq!(uids(&harness), vec!["a[0]", "a[1]", "b[0]"]);
}

#[tokio::test]
async fn dependent_first_loads_both_plugins() {
    let harness = TestHarness::builder()
        .with_plugin(plugin_a())
        .with_plugin(plugin_b())
        .build()
        .unwrap();

    harness.load_all(&["b", "a"]).await.unwrap();

    assert_eq!(uids(&harness), vec!["a[0]", "a[1]", "b[0]"]);
    let executed = harness.executor.executed();
    let a_index = executed.iter().position(|u| u.contains("/a/")).unwrap();
    let b_index = executed.iter().position(|u| u.contains("/b/")).unwrap();
    assert!(a_index < b_index, "b's scripts ran before a was loaded");
}

#[tokio::test]
async fn code_refs_resolve_to_entry_module_exports() {
    let harness = TestHarness::builder()
        .with_plugin(plugin_a())
        .build()
        .unwrap();
    harness.load_all(&["a"]).await.unwrap();

    let snapshot = harness.registry.get_extensions();
    let toolbar = snapshot.of_kind("app.toolbar").next().unwrap();
    let value = toolbar.code_ref("component").unwrap().resolve_as::<String>().unwrap();
    assert_eq!(*value, "a:Shell.Toolbar");
    assert!(harness.registry.entry_module("a").is_some());
}

// ---- Test 2: Version mismatch ----

#[tokio::test]
async fn unsatisfied_version_range_fails_dependent_only() {
    let harness = TestHarness::builder()
        .with_plugin(
            FixturePlugin::new("c", "1.0.0")
                .depends_on("d", ">=2.0.0")
                .with_extension("app.flag", json!({ "on": true })),
        )
        .with_plugin(FixturePlugin::new("d", "1.0.0").with_extension("app.flag", json!({})))
        .build()
        .unwrap();

    harness.load_all(&["c", "d"]).await.unwrap();

    let message = failure_message(&harness, "c");
    assert!(message.contains(">=2.0.0"), "{message}");
    assert!(message.contains("`d`"), "{message}");
    assert!(is_loaded(&harness, "d"));
    assert_eq!(uids(&harness), vec!["d[0]"]);
}

// ---- Test 3: Failure containment ----

#[tokio::test]
async fn script_fetch_failure_does_not_affect_independent_plugin() {
    let harness = TestHarness::builder()
        .with_plugin(
            FixturePlugin::new("e", "1.0.0")
                .with_extension("app.flag", json!({}))
                .entry(EntryBehavior::ScriptMissing),
        )
        .with_plugin(FixturePlugin::new("f", "1.0.0").with_extension("app.flag", json!({})))
        .build()
        .unwrap();

    harness.load_all(&["e", "f"]).await.unwrap();

    let message = failure_message(&harness, "e");
    assert!(message.contains("main.js"), "{message}");
    assert!(is_loaded(&harness, "f"));
    assert_eq!(uids(&harness), vec!["f[0]"]);
}

#[tokio::test]
async fn throwing_script_fails_plugin_and_its_dependents() {
    let harness = TestHarness::builder()
        .with_plugin(FixturePlugin::new("base", "1.0.0").entry(EntryBehavior::Throws(
            "ReferenceError: window is not defined".into(),
        )))
        .with_plugin(FixturePlugin::new("top", "1.0.0").depends_on("base", "^1"))
        .build()
        .unwrap();

    harness.load_all(&["base", "top"]).await.unwrap();

    assert!(failure_message(&harness, "base").contains("ReferenceError"));
    assert!(failure_message(&harness, "top").contains("failed to load"));
}

#[tokio::test]
async fn announced_version_mismatch_fails_load() {
    let harness = TestHarness::builder()
        .with_plugin(
            FixturePlugin::new("g", "1.0.0").entry(EntryBehavior::RegisterAs("g@0.9.0".into())),
        )
        .build()
        .unwrap();

    harness.load_all(&["g"]).await.unwrap();

    assert!(failure_message(&harness, "g").contains("0.9.0"));
}

#[tokio::test(start_paused = true)]
async fn silent_entry_script_fails_after_callback_timeout() {
    let harness = TestHarness::builder()
        .with_loader_config(LoaderConfig {
            entry_callback_timeout_secs: 3,
            ..LoaderConfig::default()
        })
        .with_plugin(FixturePlugin::new("quiet", "1.0.0").entry(EntryBehavior::Silent))
        .build()
        .unwrap();

    let start = tokio::time::Instant::now();
    harness.load_all(&["quiet"]).await.unwrap();

    assert!(start.elapsed() >= Duration::from_secs(3));
    assert!(failure_message(&harness, "quiet").contains("not invoked within"));
}

// ---- Test 4: Registry misuse ----

#[tokio::test]
async fn duplicate_registration_is_rejected() {
    let harness = TestHarness::builder()
        .with_plugin(plugin_a())
        .build()
        .unwrap();
    harness.load_all(&["a"]).await.unwrap();
    let before = harness.registry.get_extensions();

    let err = harness.load("a").await.unwrap_err();
    assert!(matches!(err, ManifoldError::DuplicatePlugin { ref name } if name == "a"));
    assert_eq!(harness.registry.get_extensions(), before);
    assert!(is_loaded(&harness, "a"));
}

#[tokio::test]
async fn unreachable_manifest_is_returned_to_caller() {
    let harness = TestHarness::builder().build().unwrap();

    let err = harness
        .registry
        .load_plugin("https://plugins.test/nowhere/")
        .await
        .unwrap_err();
    assert!(matches!(err, ManifoldError::Fetch { .. }));
    assert!(harness.registry.list_plugins().is_empty());
}

// ---- Test 5: Enablement ----

#[tokio::test]
async fn disable_then_enable_restores_exact_extensions() {
    let harness = TestHarness::builder()
        .with_plugin(plugin_a())
        .with_plugin(FixturePlugin::new("other", "1.0.0").with_extension("app.flag", json!({})))
        .build()
        .unwrap();
    harness.load_all(&["a", "other"]).await.unwrap();

    let original: Vec<LoadedExtension> = harness.registry.get_extensions().extensions.to_vec();
    let of_a: Vec<LoadedExtension> = original
        .iter()
        .filter(|e| e.plugin_name == "a")
        .cloned()
        .collect();

    harness
        .registry
        .set_enabled("a", false, Some("user request".into()))
        .unwrap();
    let disabled = harness.registry.get_extensions();
    assert_eq!(
        disabled.extensions.iter().map(|e| e.uid.as_str()).collect::<Vec<_>>(),
        vec!["other[0]"]
    );

    harness.registry.set_enabled("a", true, None).unwrap();
    let restored = harness.registry.get_extensions();
    assert_eq!(restored.extensions.to_vec(), original);
    assert_eq!(
        restored
            .extensions
            .iter()
            .filter(|e| e.plugin_name == "a")
            .cloned()
            .collect::<Vec<_>>(),
        of_a
    );
}

// ---- Test 6: Unresolvable dependencies ----

#[tokio::test(start_paused = true)]
async fn unregistered_dependency_fails_after_grace_period() {
    let harness = TestHarness::builder()
        .with_registry_config(RegistryConfig {
            unresolved_dependency_grace_ms: 500,
            ..RegistryConfig::default()
        })
        .with_plugin(FixturePlugin::new("needy", "1.0.0").depends_on("absent", "^1"))
        .build()
        .unwrap();

    harness.load("needy").await.unwrap();
    assert_eq!(
        harness.registry.plugin_info("needy").unwrap().status,
        PluginStatus::Pending
    );

    harness.registry.settled().await;
    let message = failure_message(&harness, "needy");
    assert!(message.contains("`absent`"), "{message}");
}

#[tokio::test]
async fn dependency_cycle_fails_every_member() {
    let harness = TestHarness::builder()
        .with_plugin(FixturePlugin::new("x", "1.0.0").depends_on("y", "*"))
        .with_plugin(FixturePlugin::new("y", "1.0.0").depends_on("x", "*"))
        .with_plugin(FixturePlugin::new("free", "1.0.0"))
        .build()
        .unwrap();

    harness.load_all(&["x", "y", "free"]).await.unwrap();

    assert!(failure_message(&harness, "x").contains("circular"));
    assert!(failure_message(&harness, "y").contains("circular"));
    assert!(is_loaded(&harness, "free"));
    assert!(
        harness
            .executor
            .executed()
            .iter()
            .all(|u| u.contains("/free/")),
        "cyclic plugins must not execute scripts"
    );
}

#[tokio::test]
async fn unmet_optional_dependency_is_recorded() {
    let harness = TestHarness::builder()
        .with_plugin(
            FixturePlugin::new("widgets", "1.0.0")
                .optionally_depends_on("charts", "^2")
                .with_extension("app.flag", json!({})),
        )
        .build()
        .unwrap();

    harness.load_all(&["widgets"]).await.unwrap();

    let info = harness.registry.plugin_info("widgets").unwrap();
    assert!(matches!(info.status, PluginStatus::Loaded { enabled: true, .. }));
    assert_eq!(info.unmet_optional_dependencies.len(), 1);
    assert_eq!(info.unmet_optional_dependencies[0].name, "charts");
}

// ---- Test 7: Loader contract ----

#[tokio::test]
async fn load_plugin_never_errors_for_unreachable_scripts() {
    let fixture = FixturePlugin::new("ghost", "1.0.0").with_component("app.page", "Ghost");
    let manifest =
        parse_plugin_manifest(fixture.manifest_json().to_string().as_bytes()).unwrap();
    let loader = ScriptLoader::new(
        LoaderConfig::default(),
        Arc::new(MockFetcher::new()),
        Arc::new(MockExecutor::new()),
    );

    let result = loader.load_plugin(&manifest.into()).await;
    match result {
        PluginLoadResult::Failure {
            error_message,
            error_cause,
        } => {
            assert!(error_message.contains("ghost/main.js"), "{error_message}");
            assert!(matches!(
                error_cause.as_deref(),
                Some(ManifoldError::Fetch { .. })
            ));
        }
        PluginLoadResult::Success { .. } => panic!("load should have failed"),
    }
    assert_eq!(loader.entry_callbacks().pending_count(), 0);
}

#[tokio::test]
async fn missing_export_skips_only_that_extension() {
    let harness = TestHarness::builder()
        .with_plugin(
            FixturePlugin::new("partial", "1.0.0")
                .exposing("Panel", &["default"])
                .with_component("app.page", "Panel")
                .with_component("app.page", "Panel.Nope"),
        )
        .build()
        .unwrap();

    harness.load_all(&["partial"]).await.unwrap();

    let info = harness.registry.plugin_info("partial").unwrap();
    assert_eq!(info.extensions, 1);
    assert_eq!(info.skipped_extensions.len(), 1);
    assert_eq!(info.skipped_extensions[0].index, 1);
    assert_eq!(uids(&harness), vec!["partial[0]"]);
}

// ---- Test 8: Notification ----

#[tokio::test]
async fn listeners_see_snapshots_matching_registry_state() {
    let harness = TestHarness::builder()
        .with_plugin(plugin_a())
        .with_plugin(plugin_b())
        .build()
        .unwrap();

    let registry = harness.registry.clone();
    let revisions = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&revisions);
    let _sub = harness.registry.subscribe(move |snapshot| {
        let expected: usize = registry
            .list_plugins()
            .iter()
            .filter(|p| matches!(p.status, PluginStatus::Loaded { enabled: true, .. }))
            .map(|p| p.extensions)
            .sum();
        assert_eq!(snapshot.len(), expected);
        sink.lock().unwrap().push(snapshot.revision);
    });

    harness.load_all(&["b", "a"]).await.unwrap();
    harness.registry.set_enabled("b", false, None).unwrap();

    let revisions = revisions.lock().unwrap().clone();
    assert!(revisions.len() >= 3, "{revisions:?}");
    assert!(revisions.windows(2).all(|w| w[0] < w[1]), "{revisions:?}");
}

#[tokio::test]
async fn unsubscribe_inside_listener_stops_delivery() {
    let harness = TestHarness::builder()
        .with_plugin(plugin_a())
        .build()
        .unwrap();
    harness.load_all(&["a"]).await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let handle: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
    let counter = Arc::clone(&calls);
    let own = Arc::clone(&handle);
    let sub = harness.registry.subscribe(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(sub) = own.lock().unwrap().as_ref() {
            sub.unsubscribe();
        }
    });
    *handle.lock().unwrap() = Some(sub);

    harness.registry.set_enabled("a", false, None).unwrap();
    harness.registry.set_enabled("a", true, None).unwrap();
    harness.registry.set_enabled("a", false, None).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let entry = harness.registry.plugin_entry("a").unwrap();
    assert!(matches!(entry, PluginEntry::Loaded(ref p) if !p.enabled));
}
