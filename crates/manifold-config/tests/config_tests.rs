// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Manifold configuration system.

use manifold_config::diagnostic::ConfigError;
use manifold_config::model::ManifoldConfig;
use manifold_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};

#[test]
fn valid_toml_deserializes_into_manifold_config() {
    let toml = r#"
[loader]
manifest_file_name = "manifest.json"
entry_callback_timeout_secs = 5
fetch_timeout_secs = 12
max_manifest_bytes = 65536

[registry]
unresolved_dependency_grace_ms = 250
enable_on_load = false

[logging]
level = "debug"
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.loader.manifest_file_name, "manifest.json");
    assert_eq!(config.loader.entry_callback_timeout().as_secs(), 5);
    assert_eq!(config.loader.fetch_timeout().as_secs(), 12);
    assert_eq!(config.loader.max_manifest_bytes, 65536);
    assert_eq!(config.registry.unresolved_dependency_grace().as_millis(), 250);
    assert!(!config.registry.enable_on_load);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn empty_toml_yields_defaults() {
    let config = load_config_from_str("").expect("empty config should use defaults");
    let defaults = ManifoldConfig::default();
    assert_eq!(config.loader.manifest_file_name, "plugin-manifest.json");
    assert_eq!(
        config.loader.entry_callback_timeout_secs,
        defaults.loader.entry_callback_timeout_secs
    );
    assert!(config.registry.enable_on_load);
    assert_eq!(config.logging.level, "info");
}

#[test]
fn unknown_field_is_rejected_with_suggestion() {
    let toml = r#"
[loader]
manifest_fle_name = "x.json"
"#;

    let errors = load_and_validate_str(toml).expect_err("should reject unknown field");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "loader.manifest_fle_name");
            assert_eq!(suggestion.as_deref(), Some("loader.manifest_file_name"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn unknown_section_is_rejected() {
    let toml = r#"
[telemetry]
enabled = true
"#;
    assert!(load_config_from_str(toml).is_err());
}

#[test]
fn wrong_type_produces_invalid_type_error() {
    let toml = r#"
[registry]
enable_on_load = "yes"
"#;
    let errors = load_and_validate_str(toml).expect_err("should reject wrong type");
    match &errors[0] {
        ConfigError::InvalidType { key, span, .. } => {
            assert_eq!(key, "registry.enable_on_load");
            assert!(span.is_some(), "inline source should be located");
        }
        other => panic!("expected InvalidType, got {other:?}"),
    }
}

#[test]
fn unknown_key_points_into_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifold.toml");
    let content = "[logging]\nlevel = \"warn\"\n\n[registry]\nenable_on_lod = true\n";
    std::fs::write(&path, content).unwrap();

    let errors = load_and_validate_path(&path).expect_err("typo should be rejected");
    match &errors[0] {
        ConfigError::UnknownKey {
            key,
            suggestion,
            known,
            span,
            ..
        } => {
            assert_eq!(key, "registry.enable_on_lod");
            assert_eq!(suggestion.as_deref(), Some("registry.enable_on_load"));
            assert!(!known.contains("loader."));
            let span = span.expect("span inside the file");
            assert_eq!(
                &content[span.offset()..span.offset() + span.len()],
                "enable_on_lod"
            );
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn semantic_validation_runs_after_parse() {
    let toml = r#"
[loader]
fetch_timeout_secs = 0
"#;
    let errors = load_and_validate_str(toml).expect_err("zero timeout is invalid");
    assert_eq!(errors[0].key(), Some("loader.fetch_timeout_secs"));
    assert!(errors[0].to_string().contains("at least 1"));

    let help = miette::Diagnostic::help(&errors[0]).unwrap().to_string();
    assert!(help.contains("MANIFOLD_LOADER_FETCH_TIMEOUT_SECS"), "got: {help}");
}

#[test]
fn loads_explicit_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("manifold.toml");
    std::fs::write(&path, "[logging]\nlevel = \"warn\"\n").unwrap();

    let config = load_and_validate_path(&path).expect("file config should load");
    assert_eq!(config.logging.level, "warn");
}
