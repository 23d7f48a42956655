// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dependency eligibility and deadlock detection.
//!
//! [`resolve_dependencies`] is a pure function over the registry's current
//! view. A pending plugin is eligible when every required dependency is a
//! loaded plugin whose version matches the requested range. Plugins that can
//! never become eligible are reported as doomed: they depend on a failed
//! plugin, on a version that does not match, or on a chain of pending plugins
//! that can never load (cycles included).
//!
//! Viability is a least fixed point computed with a worklist: a pending
//! plugin is viable once each of its required dependencies is loaded, in
//! flight, not registered yet, or a viable pending plugin (always with a
//! matching version). Whatever is not viable when a full pass adds nothing
//! is doomed.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use semver::Version;
use serde::Serialize;

use crate::manifest::PluginRuntimeMetadata;
use crate::range::VersionRange;

/// How a registered plugin can act as a dependency provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState<'a> {
    /// Waiting for its own dependencies.
    Pending(&'a Version),
    /// Its load is in progress.
    Loading(&'a Version),
    Loaded(&'a Version),
    Failed,
}

/// Why a dependency is not satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnmetReason {
    NotRegistered,
    /// Registered with a matching version but not loaded yet.
    NotLoaded,
    Failed,
    VersionMismatch { found: Version },
    /// The provider is pending but can itself never load.
    Unresolvable,
}

/// One unsatisfied dependency of a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnmetDependency {
    pub name: String,
    pub range: VersionRange,
    pub reason: UnmetReason,
}

impl fmt::Display for UnmetDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (name, range) = (&self.name, &self.range);
        match &self.reason {
            UnmetReason::NotRegistered => {
                write!(f, "dependency `{name}` ({range}) is not registered")
            }
            UnmetReason::NotLoaded => write!(f, "dependency `{name}` ({range}) is not loaded yet"),
            UnmetReason::Failed => write!(f, "dependency `{name}` ({range}) failed to load"),
            UnmetReason::VersionMismatch { found } => write!(
                f,
                "dependency `{name}` requires version {range} but {found} is registered"
            ),
            UnmetReason::Unresolvable => write!(
                f,
                "dependency `{name}` ({range}) can never be loaded (circular or unsatisfiable dependency chain)"
            ),
        }
    }
}

/// Join unmet dependencies into one error message.
pub fn describe_unmet(unmet: &[UnmetDependency]) -> String {
    unmet
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Outcome of one resolver pass.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Resolution {
    /// Candidates whose required dependencies are all loaded.
    pub eligible: Vec<String>,
    /// Candidates that can never become eligible.
    pub doomed: BTreeMap<String, Vec<UnmetDependency>>,
    /// Viable candidates still waiting, with what they wait for.
    pub waiting: BTreeMap<String, Vec<UnmetDependency>>,
    /// Unsatisfied optional dependencies of eligible candidates.
    pub optional_unmet: BTreeMap<String, Vec<UnmetDependency>>,
}

impl Resolution {
    /// True when the pass would change nothing.
    pub fn is_fixed_point(&self) -> bool {
        self.eligible.is_empty() && self.doomed.is_empty()
    }
}

enum Requirement<'a> {
    Satisfied,
    /// Satisfiable later without depending on another candidate.
    Wait(UnmetReason),
    /// Satisfiable only if this candidate becomes viable.
    Candidate(&'a str),
    Never(UnmetReason),
}

fn classify<'a>(
    range: &VersionRange,
    provider: Option<(&'a str, &ProviderState<'_>)>,
    candidates: &BTreeMap<&str, &PluginRuntimeMetadata>,
) -> Requirement<'a> {
    match provider {
        None => Requirement::Wait(UnmetReason::NotRegistered),
        Some((_, ProviderState::Failed)) => Requirement::Never(UnmetReason::Failed),
        Some((_, ProviderState::Loaded(version))) => {
            if range.matches(version) {
                Requirement::Satisfied
            } else {
                Requirement::Never(UnmetReason::VersionMismatch {
                    found: (*version).clone(),
                })
            }
        }
        Some((name, ProviderState::Loading(version) | ProviderState::Pending(version))) => {
            if !range.matches(version) {
                Requirement::Never(UnmetReason::VersionMismatch {
                    found: (*version).clone(),
                })
            } else if candidates.contains_key(name) {
                Requirement::Candidate(name)
            } else {
                Requirement::Wait(UnmetReason::NotLoaded)
            }
        }
    }
}

/// Run one resolver pass.
///
/// `providers` describes every registered plugin. `candidates` are the
/// pending plugins not yet handed to the loader; each must also appear in
/// `providers` as [`ProviderState::Pending`].
pub fn resolve_dependencies(
    candidates: &BTreeMap<&str, &PluginRuntimeMetadata>,
    providers: &BTreeMap<&str, ProviderState<'_>>,
) -> Resolution {
    let lookup = |name: &str| providers.get_key_value(name).map(|(k, v)| (*k, v));

    let mut requirements: BTreeMap<&str, Vec<(&str, &VersionRange, Requirement<'_>)>> =
        BTreeMap::new();
    for (&name, metadata) in candidates {
        let reqs = metadata
            .dependencies
            .iter()
            .map(|(dep, range)| {
                (
                    dep.as_str(),
                    range,
                    classify(range, lookup(dep), candidates),
                )
            })
            .collect();
        requirements.insert(name, reqs);
    }

    // Least fixed point of viability.
    let mut viable: BTreeSet<&str> = BTreeSet::new();
    loop {
        let before = viable.len();
        for (&name, reqs) in &requirements {
            if viable.contains(name) {
                continue;
            }
            let ok = reqs.iter().all(|(_, _, req)| match req {
                Requirement::Satisfied | Requirement::Wait(_) => true,
                Requirement::Candidate(provider) => viable.contains(provider),
                Requirement::Never(_) => false,
            });
            if ok {
                viable.insert(name);
            }
        }
        if viable.len() == before {
            break;
        }
    }

    let mut resolution = Resolution::default();
    for (&name, reqs) in &requirements {
        let unmet: Vec<UnmetDependency> = reqs
            .iter()
            .filter_map(|(dep, range, req)| {
                let reason = match req {
                    Requirement::Satisfied => return None,
                    Requirement::Wait(reason) | Requirement::Never(reason) => reason.clone(),
                    Requirement::Candidate(provider) if viable.contains(provider) => {
                        UnmetReason::NotLoaded
                    }
                    Requirement::Candidate(_) => UnmetReason::Unresolvable,
                };
                Some(UnmetDependency {
                    name: dep.to_string(),
                    range: (*range).clone(),
                    reason,
                })
            })
            .collect();

        if !viable.contains(name) {
            // Only the reasons that make it doomed, not transient ones.
            let fatal: Vec<UnmetDependency> = unmet
                .into_iter()
                .filter(|u| {
                    matches!(
                        u.reason,
                        UnmetReason::Failed
                            | UnmetReason::VersionMismatch { .. }
                            | UnmetReason::Unresolvable
                    )
                })
                .collect();
            resolution.doomed.insert(name.to_string(), fatal);
        } else if unmet.is_empty() {
            resolution.eligible.push(name.to_string());
            let optional = unmet_optional(candidates[name], providers);
            if !optional.is_empty() {
                resolution.optional_unmet.insert(name.to_string(), optional);
            }
        } else {
            resolution.waiting.insert(name.to_string(), unmet);
        }
    }

    resolution
}

fn unmet_optional(
    metadata: &PluginRuntimeMetadata,
    providers: &BTreeMap<&str, ProviderState<'_>>,
) -> Vec<UnmetDependency> {
    metadata
        .optional_dependencies
        .iter()
        .filter_map(|(dep, range)| {
            let reason = match providers.get(dep.as_str()) {
                None => UnmetReason::NotRegistered,
                Some(ProviderState::Loaded(version)) if range.matches(version) => {
                    return None;
                }
                Some(ProviderState::Failed) => UnmetReason::Failed,
                Some(
                    ProviderState::Loaded(version)
                    | ProviderState::Loading(version)
                    | ProviderState::Pending(version),
                ) if !range.matches(version) => UnmetReason::VersionMismatch {
                    found: (*version).clone(),
                },
                Some(_) => UnmetReason::NotLoaded,
            };
            Some(UnmetDependency {
                name: dep.clone(),
                range: range.clone(),
                reason,
            })
        })
        .collect()
}

/// Offline activation plan, assuming every eligible plugin loads successfully.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationPlan {
    /// Waves of plugins that could load in parallel, in activation order.
    pub waves: Vec<Vec<String>>,
    /// Plugins that could never activate, with the reasons.
    pub unresolved: BTreeMap<String, Vec<UnmetDependency>>,
    /// Unsatisfied optional dependencies noted along the way.
    pub optional_unmet: BTreeMap<String, Vec<UnmetDependency>>,
}

/// Simulate the registry's activation order for a fixed set of manifests.
///
/// Unlike the live registry, a dependency that is not in `manifests` is
/// final here, so plugins waiting on it are reported as unresolved.
pub fn activation_order(manifests: &[&PluginRuntimeMetadata]) -> ActivationPlan {
    let mut plan = ActivationPlan::default();
    let mut loaded: BTreeSet<&str> = BTreeSet::new();
    let mut failed: BTreeSet<&str> = BTreeSet::new();

    loop {
        let candidates: BTreeMap<&str, &PluginRuntimeMetadata> = manifests
            .iter()
            .filter(|m| !loaded.contains(m.name.as_str()) && !failed.contains(m.name.as_str()))
            .map(|m| (m.name.as_str(), *m))
            .collect();
        if candidates.is_empty() {
            break;
        }

        let providers: BTreeMap<&str, ProviderState<'_>> = manifests
            .iter()
            .map(|m| {
                let name = m.name.as_str();
                let state = if loaded.contains(name) {
                    ProviderState::Loaded(&m.version)
                } else if failed.contains(name) {
                    ProviderState::Failed
                } else {
                    ProviderState::Pending(&m.version)
                };
                (name, state)
            })
            .collect();

        let resolution = resolve_dependencies(&candidates, &providers);

        for (name, unmet) in resolution.doomed {
            if let Some(m) = manifests.iter().find(|m| m.name == name) {
                failed.insert(m.name.as_str());
            }
            plan.unresolved.insert(name, unmet);
        }
        plan.optional_unmet.extend(resolution.optional_unmet);

        if resolution.eligible.is_empty() {
            // Nothing more can load: whatever waits, waits on a missing plugin.
            for (name, unmet) in resolution.waiting {
                plan.unresolved.insert(name, unmet);
            }
            break;
        }

        for name in &resolution.eligible {
            if let Some(m) = manifests.iter().find(|m| &m.name == name) {
                loaded.insert(m.name.as_str());
            }
        }
        plan.waves.push(resolution.eligible);
    }

    plan
}
