// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Extension descriptors as declared by manifests and as exposed once loaded.

use std::collections::BTreeMap;
use std::fmt;

use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::code_ref::CodeRef;

/// A declarative contribution of a plugin.
///
/// Bundled manifests carry code references inside `properties` as
/// `{ "$codeRef": "Module.export" }` objects. Local manifests attach live
/// accessors in `code_refs`, keyed by dotted property path.
#[derive(Clone, Serialize, Deserialize)]
pub struct Extension {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
    #[serde(skip)]
    pub code_refs: BTreeMap<String, CodeRef>,
}

impl Extension {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            properties: Map::new(),
            code_refs: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, key: &str, value: Value) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }

    /// Attach a live code reference at a dotted property path.
    pub fn with_code_ref(mut self, path: &str, code_ref: CodeRef) -> Self {
        self.code_refs.insert(path.to_string(), code_ref);
        self
    }
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("kind", &self.kind)
            .field("properties", &self.properties)
            .field("code_refs", &self.code_refs.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// An extension whose code references are resolved, annotated with its owner.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedExtension {
    /// Stable identifier: `<plugin>[<index in manifest>]`.
    pub uid: String,
    pub plugin_name: String,
    pub plugin_version: Version,
    #[serde(rename = "type")]
    pub kind: String,
    pub properties: Map<String, Value>,
    #[serde(skip)]
    pub code_refs: BTreeMap<String, CodeRef>,
}

impl LoadedExtension {
    /// Resolved code reference at a dotted property path.
    pub fn code_ref(&self, path: &str) -> Option<&CodeRef> {
        self.code_refs.get(path)
    }
}

impl PartialEq for LoadedExtension {
    fn eq(&self, other: &Self) -> bool {
        self.uid == other.uid
            && self.plugin_name == other.plugin_name
            && self.plugin_version == other.plugin_version
            && self.kind == other.kind
            && self.properties == other.properties
            && self.code_refs == other.code_refs
    }
}

impl fmt::Debug for LoadedExtension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedExtension")
            .field("uid", &self.uid)
            .field("kind", &self.kind)
            .field("properties", &self.properties)
            .field("code_refs", &self.code_refs.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// An extension left out of a successful load because a code reference failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedExtension {
    pub index: usize,
    pub kind: String,
    pub error_message: String,
}
