// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the loader, the registry, and host collaborators.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A live value exported by plugin code.
///
/// Consumers downcast it to the concrete type the host and the plugin agreed on.
pub type ExportValue = Arc<dyn Any + Send + Sync>;

/// How a bundled plugin hands its entry module to the host once its scripts ran.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RegistrationMethod {
    /// The plugin's entry script invokes the host's entry callback.
    Callback,
    /// The host retrieves the entry module through its own provider.
    Custom,
}

/// Named exports of a single module exposed by a plugin's entry module.
#[derive(Clone, Default)]
pub struct ModuleExports {
    exports: HashMap<String, ExportValue>,
}

impl ModuleExports {
    /// Create an empty export set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion of a typed export.
    pub fn with_export<T: Any + Send + Sync>(mut self, name: &str, value: T) -> Self {
        self.insert(name, Arc::new(value));
        self
    }

    /// Insert an already type-erased export, replacing any previous value.
    pub fn insert(&mut self, name: &str, value: ExportValue) {
        self.exports.insert(name.to_string(), value);
    }

    /// Look up an export by name.
    pub fn get(&self, name: &str) -> Option<ExportValue> {
        self.exports.get(name).cloned()
    }

    /// Sorted list of export names.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.exports.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for ModuleExports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleExports")
            .field("exports", &self.names())
            .finish()
    }
}

/// Plugin identity as carried by an entry callback: `name@version` or a bare `name`.
///
/// Scoped names such as `@acme/console@1.2.0` are split on the last `@`
/// that is not the first character.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PluginId {
    pub name: String,
    pub version: Option<String>,
}

impl PluginId {
    /// Identity with an explicit version.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Some(version.into()),
        }
    }
}

impl FromStr for PluginId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rfind('@') {
            Some(pos) if pos > 0 => Ok(Self {
                name: s[..pos].to_string(),
                version: Some(s[pos + 1..].to_string()),
            }),
            _ => Ok(Self {
                name: s.to_string(),
                version: None,
            }),
        }
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}@{}", self.name, version),
            None => write!(f, "{}", self.name),
        }
    }
}
