// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration diagnostics.
//!
//! Figment errors are mapped onto [`ConfigError`]s keyed by the full dotted
//! setting name (`loader.fetch_timeout_secs`). Unknown keys are matched
//! against the keys of [`ManifoldConfig`] itself, so suggestions stay in step
//! with the model, and every setting error names the `MANIFOLD_*` variable
//! that overrides it.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use std::path::Path;

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::model::ManifoldConfig;

const SUGGESTION_THRESHOLD: f64 = 0.8;

/// Source name used for configuration passed as a string.
pub(crate) const INLINE_SOURCE: &str = "<inline>";

/// A configuration problem, renderable through miette.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(manifold::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), known))
    )]
    UnknownKey {
        key: String,
        suggestion: Option<String>,
        /// Keys accepted where this one was found.
        known: String,
        #[label("not a manifold setting")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: found {found}, expected {expected}")]
    #[diagnostic(
        code(manifold::config::invalid_type),
        help("set it in manifold.toml or through {}", env_var(key))
    )]
    InvalidType {
        key: String,
        found: String,
        expected: String,
        #[label("wrong type")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` is invalid: {message}")]
    #[diagnostic(
        code(manifold::config::validation),
        help("override it in manifold.toml or through {}", env_var(key))
    )]
    Validation { key: String, message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(manifold::config::other))]
    Other(String),
}

impl ConfigError {
    /// The dotted key the error is about, if it concerns a single setting.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::UnknownKey { key, .. }
            | Self::InvalidType { key, .. }
            | Self::Validation { key, .. } => Some(key),
            Self::Other(_) => None,
        }
    }
}

fn unknown_key_help(suggestion: Option<&str>, known: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? accepted here: {known}"),
        None => format!("accepted here: {known}"),
    }
}

/// Environment variable overriding `key`, e.g. `MANIFOLD_LOADER_FETCH_TIMEOUT_SECS`.
pub fn env_var(key: &str) -> String {
    format!("MANIFOLD_{}", key.replace('.', "_").to_uppercase())
}

/// Every dotted key the configuration model accepts.
pub fn known_keys() -> Vec<String> {
    let Ok(toml::Value::Table(root)) = toml::Value::try_from(ManifoldConfig::default()) else {
        return Vec::new();
    };
    root.iter()
        .flat_map(|(section, value)| match value {
            toml::Value::Table(fields) => fields
                .keys()
                .map(|field| format!("{section}.{field}"))
                .collect::<Vec<_>>(),
            _ => vec![section.clone()],
        })
        .collect()
}

/// Keys that are valid siblings of `key`: the section's fields, or the sections.
fn siblings(key: &str, known: &[String]) -> Vec<String> {
    match key.rsplit_once('.') {
        Some((section, _)) => known
            .iter()
            .filter(|k| k.rsplit_once('.').is_some_and(|(s, _)| s == section))
            .cloned()
            .collect(),
        None => {
            let mut sections: Vec<String> = known
                .iter()
                .map(|k| k.split('.').next().unwrap_or(k).to_string())
                .collect();
            sections.dedup();
            sections
        }
    }
}

fn leaf(key: &str) -> &str {
    key.rsplit('.').next().unwrap_or(key)
}

/// Closest candidate to `key` by Jaro-Winkler similarity of the last segment.
pub fn suggest_key(key: &str, candidates: &[String]) -> Option<String> {
    candidates
        .iter()
        .map(|candidate| (strsim::jaro_winkler(leaf(key), leaf(candidate)), candidate))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, candidate)| candidate.clone())
}

/// Convert a `figment::Error` (which may hold several errors) into diagnostics.
///
/// `toml_sources` are `(path, content)` pairs used to point at the offending line.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    let known = known_keys();

    err.into_iter()
        .map(|error| {
            let mut path: Vec<String> = error.path.clone();
            match &error.kind {
                Kind::UnknownField(field, _) => {
                    path.push(field.clone());
                    let key = path.join(".");
                    let candidates = siblings(&key, &known);
                    let (span, src) = locate_in_sources(&error, &key, toml_sources);
                    ConfigError::UnknownKey {
                        suggestion: suggest_key(&key, &candidates),
                        known: candidates.join(", "),
                        key,
                        span,
                        src,
                    }
                }
                Kind::InvalidType(found, expected) => {
                    let key = path.join(".");
                    let (span, src) = locate_in_sources(&error, &key, toml_sources);
                    ConfigError::InvalidType {
                        key,
                        found: found.to_string(),
                        expected: expected.clone(),
                        span,
                        src,
                    }
                }
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

fn locate_in_sources(
    error: &figment::Error,
    key: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let origin = error.metadata.as_ref().and_then(|m| m.source.as_ref());
    let source = match origin {
        Some(figment::Source::File(file)) => {
            toml_sources.iter().find(|(path, _)| Path::new(path) == file)
        }
        _ => toml_sources.iter().find(|(path, _)| path == INLINE_SOURCE),
    };

    source
        .and_then(|(path, content)| {
            locate_key(content, key)
                .map(|span| (span, NamedSource::new(path, content.clone())))
        })
        .map_or((None, None), |(span, src)| (Some(span), Some(src)))
}

/// Span of the dotted `key` inside TOML `content`.
///
/// `loader.fetch_timeout_secs` matches a `fetch_timeout_secs =` line under the
/// `[loader]` header; a bare section name matches its header.
pub fn locate_key(content: &str, key: &str) -> Option<SourceSpan> {
    let (section, field) = key.rsplit_once('.').unwrap_or(("", key));
    let mut current = "";
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        let body = line.trim();

        if let Some(header) = body.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
            current = header.trim();
            if section.is_empty() && current == field {
                let at = line.find(field).unwrap_or(indent);
                return Some(SourceSpan::new((offset + at).into(), field.len()));
            }
        } else if current == section
            && body
                .strip_prefix(field)
                .is_some_and(|rest| rest.trim_start().starts_with('='))
        {
            return Some(SourceSpan::new((offset + indent).into(), field.len()));
        }

        offset += line.len();
    }
    None
}

/// Print every error to stderr through miette's report handler.
pub fn render_errors(errors: Vec<ConfigError>) {
    for error in errors {
        eprintln!("{:?}", miette::Report::new(error));
    }
}
