// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! npm-style dependency version ranges.
//!
//! Manifests come out of JavaScript build tooling, so their ranges follow npm
//! rules: a bare version is an exact match, comparators of one set are
//! separated by whitespace, `A - B` is an inclusive span, `x`/`X`/`*` are
//! wildcards, and `||` joins alternatives. Each alternative is translated into
//! a [`VersionReq`]; a version satisfies the range if any alternative matches.

use std::fmt;
use std::str::FromStr;

use manifold_core::ManifoldError;
use semver::{Version, VersionReq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

const OPERATOR_CHARS: &[char] = &['<', '>', '=', '^', '~'];

/// A dependency range as written in a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    raw: String,
    alternatives: Vec<VersionReq>,
}

impl VersionRange {
    /// The range every version satisfies (`*`).
    pub fn any() -> Self {
        Self {
            raw: "*".to_string(),
            alternatives: vec![VersionReq::STAR],
        }
    }

    pub fn parse(range: &str) -> Result<Self, ManifoldError> {
        let invalid = |reason: String| {
            ManifoldError::Validation(format!("version range `{range}`: {reason}"))
        };

        let alternatives = range
            .split("||")
            .map(|set| {
                let translated = translate_set(set).map_err(invalid)?;
                VersionReq::parse(&translated).map_err(|e| invalid(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: range.trim().to_string(),
            alternatives,
        })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Rewrite one npm comparator set into Cargo requirement syntax.
fn translate_set(set: &str) -> Result<String, String> {
    let tokens: Vec<&str> = set.split_whitespace().collect();
    match tokens.as_slice() {
        [] => return Ok("*".to_string()),
        [low, "-", high] => {
            return Ok(format!("{}, {}", comparator(">=", low), comparator("<=", high)));
        }
        _ => {}
    }

    let mut comparators = Vec::new();
    let mut operator: Option<&str> = None;
    for token in tokens {
        if token == "-" {
            return Err("a hyphen range needs exactly one version on each side".to_string());
        }
        if token.chars().all(|c| OPERATOR_CHARS.contains(&c)) {
            if operator.replace(token).is_some() {
                return Err(format!("operator `{token}` follows another operator"));
            }
            continue;
        }

        let split = token
            .find(|c: char| !OPERATOR_CHARS.contains(&c))
            .unwrap_or(token.len());
        let (inline_op, version) = token.split_at(split);
        let op = match (operator.take(), inline_op) {
            (Some(_), op) if !op.is_empty() => {
                return Err(format!("operator `{op}` follows another operator"));
            }
            (Some(op), _) => op,
            (None, op) => op,
        };
        comparators.push(comparator(op, version));
    }
    if let Some(op) = operator {
        return Err(format!("operator `{op}` is missing a version"));
    }

    Ok(comparators.join(", "))
}

fn comparator(op: &str, version: &str) -> String {
    let op = if op == "~>" { "~" } else { op };
    let version = version.strip_prefix('v').unwrap_or(version);

    let total = version.split('.').count();
    let parts: Vec<&str> = version
        .split('.')
        .take_while(|part| !matches!(*part, "x" | "X" | "*"))
        .collect();
    if parts.is_empty() {
        return "*".to_string();
    }
    let core = parts.join(".");
    let wildcard = parts.len() < total;

    match op {
        "" | "=" if wildcard => format!("{core}.*"),
        "" => format!("={core}"),
        op => format!("{op}{core}"),
    }
}

impl FromStr for VersionRange {
    type Err = ManifoldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for VersionRange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}
