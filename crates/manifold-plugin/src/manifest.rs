// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin manifest model and JSON parsing.
//!
//! Two manifest variants exist: bundled manifests produced by a build step
//! and consumed verbatim as JSON, and local manifests constructed in the host
//! with live code references. Both share [`PluginRuntimeMetadata`].

use std::collections::BTreeMap;

use manifold_core::{ManifoldError, RegistrationMethod};
use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::code_ref::{find_code_refs, parse_code_ref};
use crate::extension::Extension;
use crate::range::VersionRange;

/// Identity and dependency metadata shared by every manifest variant.
///
/// Only one plugin with a given `name` may live in a registry at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginRuntimeMetadata {
    pub name: String,
    pub version: Version,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, VersionRange>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub optional_dependencies: BTreeMap<String, VersionRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_properties: Option<Map<String, Value>>,
}

impl PluginRuntimeMetadata {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            dependencies: BTreeMap::new(),
            optional_dependencies: BTreeMap::new(),
            custom_properties: None,
        }
    }
}

/// Bundled plugin manifest, generated by the plugin's build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginManifest {
    #[serde(flatten)]
    pub metadata: PluginRuntimeMetadata,
    /// Resolution root for every asset the plugin references.
    #[serde(rename = "baseURL")]
    pub base_url: String,
    #[serde(default)]
    pub extensions: Vec<Extension>,
    /// Scripts to fetch and execute, in order, relative to `base_url`.
    pub load_scripts: Vec<String>,
    pub registration_method: RegistrationMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_hash: Option<String>,
}

/// Manifest created directly in the host; it has no scripts and no entry module.
#[derive(Debug, Clone)]
pub struct LocalPluginManifest {
    pub metadata: PluginRuntimeMetadata,
    pub extensions: Vec<Extension>,
}

impl LocalPluginManifest {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            metadata: PluginRuntimeMetadata::new(name, version),
            extensions: Vec::new(),
        }
    }

    pub fn with_dependency(mut self, name: &str, range: VersionRange) -> Self {
        self.metadata.dependencies.insert(name.to_string(), range);
        self
    }

    pub fn with_optional_dependency(mut self, name: &str, range: VersionRange) -> Self {
        self.metadata
            .optional_dependencies
            .insert(name.to_string(), range);
        self
    }

    pub fn with_extension(mut self, extension: Extension) -> Self {
        self.extensions.push(extension);
        self
    }
}

/// Either manifest variant; matches on it are exhaustive by construction.
#[derive(Debug, Clone)]
pub enum AnyPluginManifest {
    Bundled(PluginManifest),
    Local(LocalPluginManifest),
}

impl AnyPluginManifest {
    pub fn metadata(&self) -> &PluginRuntimeMetadata {
        match self {
            AnyPluginManifest::Bundled(m) => &m.metadata,
            AnyPluginManifest::Local(m) => &m.metadata,
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata().name
    }

    pub fn version(&self) -> &Version {
        &self.metadata().version
    }

    pub fn extensions(&self) -> &[Extension] {
        match self {
            AnyPluginManifest::Bundled(m) => &m.extensions,
            AnyPluginManifest::Local(m) => &m.extensions,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, AnyPluginManifest::Local(_))
    }
}

impl From<PluginManifest> for AnyPluginManifest {
    fn from(manifest: PluginManifest) -> Self {
        AnyPluginManifest::Bundled(manifest)
    }
}

impl From<LocalPluginManifest> for AnyPluginManifest {
    fn from(manifest: LocalPluginManifest) -> Self {
        AnyPluginManifest::Local(manifest)
    }
}

pub fn is_local_plugin_manifest(manifest: &AnyPluginManifest) -> bool {
    manifest.is_local()
}

pub fn is_standard_plugin_manifest(manifest: &AnyPluginManifest) -> bool {
    !manifest.is_local()
}

/// Parse and validate a bundled manifest from its JSON wire form.
///
/// `baseURL` must already be absolute here; the loader resolves relative
/// base URLs against the manifest location before validating.
pub fn parse_plugin_manifest(json: &[u8]) -> Result<PluginManifest, ManifoldError> {
    let manifest: PluginManifest = serde_json::from_slice(json)
        .map_err(|e| ManifoldError::Validation(format!("malformed manifest JSON: {e}")))?;
    validate_plugin_manifest(&manifest)?;
    Ok(manifest)
}

/// Schema rules for a bundled manifest beyond what serde enforces.
pub fn validate_plugin_manifest(manifest: &PluginManifest) -> Result<(), ManifoldError> {
    validate_metadata(&manifest.metadata)?;
    let name = &manifest.metadata.name;

    let base = Url::parse(&manifest.base_url).map_err(|e| {
        ManifoldError::Validation(format!(
            "plugin `{name}`: baseURL `{}` is not an absolute URL: {e}",
            manifest.base_url
        ))
    })?;
    if base.cannot_be_a_base() {
        return Err(ManifoldError::Validation(format!(
            "plugin `{name}`: baseURL `{}` cannot be used to resolve assets",
            manifest.base_url
        )));
    }

    if manifest.load_scripts.is_empty() {
        return Err(ManifoldError::Validation(format!(
            "plugin `{name}`: loadScripts must list at least one script"
        )));
    }
    if let Some(blank) = manifest.load_scripts.iter().position(|s| s.trim().is_empty()) {
        return Err(ManifoldError::Validation(format!(
            "plugin `{name}`: loadScripts[{blank}] must not be empty"
        )));
    }

    for (index, extension) in manifest.extensions.iter().enumerate() {
        validate_extension(name, index, extension)?;
        for (path, target) in find_code_refs(&extension.properties)? {
            parse_code_ref(&target).map_err(|e| {
                ManifoldError::Validation(format!(
                    "plugin `{name}`: extensions[{index}].{path}: {e}"
                ))
            })?;
        }
    }

    Ok(())
}

/// Schema rules for a local manifest.
pub fn validate_local_manifest(manifest: &LocalPluginManifest) -> Result<(), ManifoldError> {
    validate_metadata(&manifest.metadata)?;
    for (index, extension) in manifest.extensions.iter().enumerate() {
        validate_extension(&manifest.metadata.name, index, extension)?;
    }
    Ok(())
}

/// Validate whichever variant is given.
pub fn validate_any_manifest(manifest: &AnyPluginManifest) -> Result<(), ManifoldError> {
    match manifest {
        AnyPluginManifest::Bundled(m) => validate_plugin_manifest(m),
        AnyPluginManifest::Local(m) => validate_local_manifest(m),
    }
}

fn validate_metadata(metadata: &PluginRuntimeMetadata) -> Result<(), ManifoldError> {
    let name = metadata.name.as_str();
    if name.trim().is_empty() {
        return Err(ManifoldError::Validation(
            "plugin name must not be empty".to_string(),
        ));
    }
    if name.trim() != name {
        return Err(ManifoldError::Validation(format!(
            "plugin name `{name}` must not have leading or trailing whitespace"
        )));
    }

    if metadata.dependencies.contains_key(name) || metadata.optional_dependencies.contains_key(name)
    {
        return Err(ManifoldError::Validation(format!(
            "plugin `{name}` must not depend on itself"
        )));
    }

    if let Some(both) = metadata
        .dependencies
        .keys()
        .find(|dep| metadata.optional_dependencies.contains_key(*dep))
    {
        return Err(ManifoldError::Validation(format!(
            "plugin `{name}`: `{both}` is listed as both a required and an optional dependency"
        )));
    }

    Ok(())
}

fn validate_extension(plugin: &str, index: usize, extension: &Extension) -> Result<(), ManifoldError> {
    if extension.kind.trim().is_empty() {
        return Err(ManifoldError::Validation(format!(
            "plugin `{plugin}`: extensions[{index}] must declare a type"
        )));
    }
    Ok(())
}
