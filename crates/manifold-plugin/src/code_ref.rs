// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Code reference discovery and resolution.
//!
//! A serialized code reference is a JSON object `{ "$codeRef": "Module.export" }`
//! nested anywhere inside an extension's properties. The export part is
//! optional and defaults to `default`. Resolution happens once per load
//! against the plugin's entry module and yields [`CodeRef`] accessors.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use manifold_core::{ExportValue, ManifoldError, PluginEntryModule};
use serde_json::{Map, Value};
use tracing::warn;

use crate::extension::{Extension, LoadedExtension, SkippedExtension};
use crate::manifest::PluginRuntimeMetadata;

/// Property key marking a serialized code reference.
pub const CODE_REF_KEY: &str = "$codeRef";

const DEFAULT_EXPORT: &str = "default";

type Resolver = dyn Fn() -> Result<ExportValue, ManifoldError> + Send + Sync;

/// Resolve-on-demand accessor for a live value exported by plugin code.
#[derive(Clone)]
pub struct CodeRef {
    target: String,
    resolve: Arc<Resolver>,
}

impl CodeRef {
    /// Accessor backed by a host closure (local manifests).
    pub fn new<F>(resolve: F) -> Self
    where
        F: Fn() -> Result<ExportValue, ManifoldError> + Send + Sync + 'static,
    {
        Self {
            target: "<local>".to_string(),
            resolve: Arc::new(resolve),
        }
    }

    /// Accessor bound to an already materialized value.
    pub fn from_value<T: Any + Send + Sync>(value: T) -> Self {
        let value: ExportValue = Arc::new(value);
        Self::bound("<local>".to_string(), value)
    }

    fn bound(target: String, value: ExportValue) -> Self {
        Self {
            target,
            resolve: Arc::new(move || Ok(Arc::clone(&value))),
        }
    }

    /// The `Module.export` path this accessor was resolved from, or `<local>`.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn resolve(&self) -> Result<ExportValue, ManifoldError> {
        (self.resolve)()
    }

    /// Resolve and downcast to the type agreed on with the plugin.
    pub fn resolve_as<T: Any + Send + Sync>(&self) -> Result<Arc<T>, ManifoldError> {
        self.resolve()?
            .downcast::<T>()
            .map_err(|_| ManifoldError::MissingCodeRef {
                code_ref: self.target.clone(),
                reason: format!("export is not a `{}`", std::any::type_name::<T>()),
            })
    }
}

impl PartialEq for CodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target && Arc::ptr_eq(&self.resolve, &other.resolve)
    }
}

impl fmt::Debug for CodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CodeRef").field(&self.target).finish()
    }
}

/// Split `Module.export` into its parts; a bare `Module` means its default export.
pub fn parse_code_ref(code_ref: &str) -> Result<(&str, &str), ManifoldError> {
    let malformed = |reason: &str| ManifoldError::MissingCodeRef {
        code_ref: code_ref.to_string(),
        reason: reason.to_string(),
    };

    let (module, export) = match code_ref.split_once('.') {
        Some((module, export)) => (module, export),
        None => (code_ref, DEFAULT_EXPORT),
    };

    if module.trim().is_empty() {
        return Err(malformed("module name is empty"));
    }
    if export.trim().is_empty() {
        return Err(malformed("export name is empty"));
    }
    Ok((module, export))
}

/// Every serialized code reference inside `properties`, as `(dotted path, target)`.
///
/// Array elements are addressed by index (`routes.0.component`). A
/// `$codeRef` whose value is not a string is a validation error.
pub fn find_code_refs(properties: &Map<String, Value>) -> Result<Vec<(String, String)>, ManifoldError> {
    let mut found = Vec::new();
    for (key, value) in properties {
        collect(value, key.clone(), &mut found)?;
    }
    Ok(found)
}

fn collect(value: &Value, path: String, found: &mut Vec<(String, String)>) -> Result<(), ManifoldError> {
    match value {
        Value::Object(map) => {
            if let Some(target) = map.get(CODE_REF_KEY) {
                let Some(target) = target.as_str() else {
                    return Err(ManifoldError::Validation(format!(
                        "`{CODE_REF_KEY}` at `{path}` must be a string"
                    )));
                };
                found.push((path, target.to_string()));
                return Ok(());
            }
            for (key, nested) in map {
                collect(nested, format!("{path}.{key}"), found)?;
            }
        }
        Value::Array(items) => {
            for (index, nested) in items.iter().enumerate() {
                collect(nested, format!("{path}.{index}"), found)?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Why one extension could not be resolved.
#[derive(Debug)]
pub enum ExtensionError {
    /// Scoped to this extension; it is omitted and the load continues.
    Omitted(ManifoldError),
    /// The entry module itself is broken; the whole plugin fails.
    Fatal(ManifoldError),
}

/// Resolve one extension's code references against the entry module.
pub fn resolve_extension(
    plugin: &PluginRuntimeMetadata,
    index: usize,
    extension: &Extension,
    entry: Option<&dyn PluginEntryModule>,
) -> Result<LoadedExtension, ExtensionError> {
    let sites = find_code_refs(&extension.properties).map_err(ExtensionError::Omitted)?;
    let mut code_refs: BTreeMap<String, CodeRef> = extension.code_refs.clone();

    for (path, target) in sites {
        let Some(entry) = entry else {
            return Err(ExtensionError::Omitted(ManifoldError::MissingCodeRef {
                code_ref: target,
                reason: "plugin has no entry module to resolve against".to_string(),
            }));
        };

        let (module, export) = parse_code_ref(&target).map_err(ExtensionError::Omitted)?;
        let exports = entry
            .get(module)
            .map_err(ExtensionError::Fatal)?
            .ok_or_else(|| {
                ExtensionError::Omitted(ManifoldError::MissingCodeRef {
                    code_ref: target.clone(),
                    reason: format!("module `{module}` is not exposed by the entry module"),
                })
            })?;
        let value = exports.get(export).ok_or_else(|| {
            ExtensionError::Omitted(ManifoldError::MissingCodeRef {
                code_ref: target.clone(),
                reason: format!("module `{module}` has no export `{export}`"),
            })
        })?;

        code_refs.insert(path, CodeRef::bound(target, value));
    }

    Ok(LoadedExtension {
        uid: format!("{}[{}]", plugin.name, index),
        plugin_name: plugin.name.clone(),
        plugin_version: plugin.version.clone(),
        kind: extension.kind.clone(),
        properties: extension.properties.clone(),
        code_refs,
    })
}

/// Outcome of resolving all extensions of a plugin.
#[derive(Debug, Default)]
pub struct ResolvedExtensions {
    pub loaded: Vec<LoadedExtension>,
    pub skipped: Vec<SkippedExtension>,
}

/// Resolve every extension; per-extension failures are collected, not propagated.
pub fn resolve_extensions(
    plugin: &PluginRuntimeMetadata,
    extensions: &[Extension],
    entry: Option<&dyn PluginEntryModule>,
) -> Result<ResolvedExtensions, ManifoldError> {
    let mut resolved = ResolvedExtensions::default();

    for (index, extension) in extensions.iter().enumerate() {
        match resolve_extension(plugin, index, extension, entry) {
            Ok(loaded) => resolved.loaded.push(loaded),
            Err(ExtensionError::Omitted(err)) => {
                warn!(
                    plugin = %plugin.name,
                    extension = index,
                    kind = %extension.kind,
                    error = %err,
                    "extension omitted"
                );
                resolved.skipped.push(SkippedExtension {
                    index,
                    kind: extension.kind.clone(),
                    error_message: err.to_string(),
                });
            }
            Err(ExtensionError::Fatal(err)) => return Err(err),
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use manifold_core::{ModuleExports, StaticEntryModule};
    use serde_json::json;

    fn metadata() -> PluginRuntimeMetadata {
        PluginRuntimeMetadata::new("console", semver::Version::new(1, 0, 0))
    }

    fn bundled_extension(properties: Value) -> Extension {
        let Value::Object(properties) = properties else {
            panic!("properties must be an object");
        };
        Extension {
            kind: "console.page".to_string(),
            properties,
            code_refs: BTreeMap::new(),
        }
    }

    fn entry() -> StaticEntryModule {
        StaticEntryModule::new().with_module(
            "Pages",
            ModuleExports::new()
                .with_export("default", "home-page".to_string())
                .with_export("settings", "settings-page".to_string()),
        )
    }

    struct BrokenEntry;

    impl PluginEntryModule for BrokenEntry {
        fn get(&self, module: &str) -> Result<Option<ModuleExports>, ManifoldError> {
            Err(ManifoldError::EntryModule {
                plugin: "console".into(),
                message: format!("module factory for `{module}` threw"),
            })
        }
    }

    #[test]
    fn parse_code_ref_defaults_export() {
        assert_eq!(parse_code_ref("Pages").unwrap(), ("Pages", "default"));
        assert_eq!(parse_code_ref("Pages.settings").unwrap(), ("Pages", "settings"));
        assert!(parse_code_ref(".settings").is_err());
        assert!(parse_code_ref("Pages.").is_err());
    }

    #[test]
    fn find_code_refs_walks_nested_properties() {
        let ext = bundled_extension(json!({
            "path": "/home",
            "component": { "$codeRef": "Pages" },
            "routes": [
                { "name": "a", "handler": { "$codeRef": "Pages.settings" } }
            ]
        }));

        let mut refs = find_code_refs(&ext.properties).unwrap();
        refs.sort();
        assert_eq!(
            refs,
            vec![
                ("component".to_string(), "Pages".to_string()),
                ("routes.0.handler".to_string(), "Pages.settings".to_string()),
            ]
        );
    }

    #[test]
    fn find_code_refs_rejects_non_string_target() {
        let ext = bundled_extension(json!({ "component": { "$codeRef": 7 } }));
        assert!(matches!(
            find_code_refs(&ext.properties),
            Err(ManifoldError::Validation(_))
        ));
    }

    #[test]
    fn resolves_code_refs_against_entry_module() {
        let ext = bundled_extension(json!({ "component": { "$codeRef": "Pages.settings" } }));
        let entry = entry();

        let loaded = resolve_extension(&metadata(), 3, &ext, Some(&entry)).unwrap();
        assert_eq!(loaded.uid, "console[3]");
        assert_eq!(loaded.plugin_name, "console");
        let page = loaded.code_ref("component").unwrap().resolve_as::<String>().unwrap();
        assert_eq!(page.as_str(), "settings-page");
    }

    #[test]
    fn missing_export_omits_only_that_extension() {
        let good = bundled_extension(json!({ "component": { "$codeRef": "Pages" } }));
        let bad = bundled_extension(json!({ "component": { "$codeRef": "Pages.nope" } }));
        let entry = entry();

        let resolved = resolve_extensions(&metadata(), &[good, bad], Some(&entry)).unwrap();
        assert_eq!(resolved.loaded.len(), 1);
        assert_eq!(resolved.skipped.len(), 1);
        assert_eq!(resolved.skipped[0].index, 1);
        assert!(resolved.skipped[0].error_message.contains("no export `nope`"));
    }

    #[test]
    fn unexposed_module_is_extension_scoped() {
        let ext = bundled_extension(json!({ "component": { "$codeRef": "Hidden" } }));
        let entry = entry();
        let err = resolve_extension(&metadata(), 0, &ext, Some(&entry)).unwrap_err();
        assert!(matches!(err, ExtensionError::Omitted(ManifoldError::MissingCodeRef { .. })));
    }

    #[test]
    fn broken_entry_module_fails_whole_plugin() {
        let ext = bundled_extension(json!({ "component": { "$codeRef": "Pages" } }));
        let result = resolve_extensions(&metadata(), &[ext], Some(&BrokenEntry));
        assert!(matches!(result, Err(ManifoldError::EntryModule { .. })));
    }

    #[test]
    fn local_code_refs_pass_through() {
        let ext = Extension::new("console.action")
            .with_property("label", json!("Run"))
            .with_code_ref("handler", CodeRef::from_value(5_i32));

        let loaded = resolve_extension(&metadata(), 0, &ext, None).unwrap();
        assert_eq!(*loaded.code_ref("handler").unwrap().resolve_as::<i32>().unwrap(), 5);
    }

    #[test]
    fn serialized_ref_without_entry_module_is_omitted() {
        let ext = bundled_extension(json!({ "component": { "$codeRef": "Pages" } }));
        assert!(matches!(
            resolve_extension(&metadata(), 0, &ext, None),
            Err(ExtensionError::Omitted(_))
        ));
    }

    #[test]
    fn resolve_as_wrong_type_is_reported() {
        let code_ref = CodeRef::from_value(1_u8);
        assert!(code_ref.resolve_as::<String>().is_err());
    }
}
