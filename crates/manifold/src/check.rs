// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `manifold check` command implementation.
//!
//! Validates a set of bundled manifest files and simulates the order in
//! which a registry would activate them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use manifold_core::ManifoldError;
use manifold_plugin::manifest::validate_plugin_manifest;
use manifold_plugin::{
    activation_order, describe_unmet, ActivationPlan, PluginManifest, PluginRuntimeMetadata,
};
use serde::Serialize;
use url::Url;

/// A manifest file that could not be used.
#[derive(Debug, Serialize)]
pub struct InvalidManifest {
    pub path: String,
    pub error: String,
}

/// Structured output for `--json` mode.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub invalid: Vec<InvalidManifest>,
    #[serde(flatten)]
    pub plan: ActivationPlan,
}

impl CheckReport {
    /// True when every manifest is valid and every plugin can activate.
    pub fn passed(&self) -> bool {
        self.invalid.is_empty() && self.plan.unresolved.is_empty()
    }
}

/// Read one manifest file.
///
/// A relative `baseURL` is resolved against the file's own location.
fn read_manifest(path: &Path) -> Result<PluginManifest, ManifoldError> {
    let bytes = std::fs::read(path)
        .map_err(|e| ManifoldError::Validation(format!("cannot read {}: {e}", path.display())))?;
    let mut manifest: PluginManifest = serde_json::from_slice(&bytes)
        .map_err(|e| ManifoldError::Validation(format!("malformed manifest JSON: {e}")))?;

    let absolute = std::path::absolute(path)
        .map_err(|e| ManifoldError::Validation(format!("cannot resolve {}: {e}", path.display())))?;
    let location = Url::from_file_path(&absolute).map_err(|()| {
        ManifoldError::Validation(format!("{} is not a valid file location", absolute.display()))
    })?;
    let base = location.join(&manifest.base_url).map_err(|e| {
        ManifoldError::Validation(format!(
            "plugin `{}`: baseURL `{}`: {e}",
            manifest.metadata.name, manifest.base_url
        ))
    })?;
    manifest.base_url = base.to_string();

    validate_plugin_manifest(&manifest)?;
    Ok(manifest)
}

/// Validate `paths` and compute the activation plan of the valid manifests.
pub fn check(paths: &[PathBuf]) -> CheckReport {
    let mut invalid = Vec::new();
    let mut manifests: BTreeMap<String, (PathBuf, PluginManifest)> = BTreeMap::new();

    for path in paths {
        let manifest = match read_manifest(path) {
            Ok(manifest) => manifest,
            Err(e) => {
                invalid.push(InvalidManifest {
                    path: path.display().to_string(),
                    error: e.to_string(),
                });
                continue;
            }
        };

        let name = manifest.metadata.name.clone();
        if let Some((first, _)) = manifests.get(&name) {
            invalid.push(InvalidManifest {
                path: path.display().to_string(),
                error: format!(
                    "{}; first declared in {}",
                    ManifoldError::DuplicatePlugin { name },
                    first.display()
                ),
            });
            continue;
        }
        manifests.insert(name, (path.clone(), manifest));
    }

    let metadata: Vec<&PluginRuntimeMetadata> =
        manifests.values().map(|(_, m)| &m.metadata).collect();
    let plan = activation_order(&metadata);
    tracing::debug!(
        valid = manifests.len(),
        invalid = invalid.len(),
        waves = plan.waves.len(),
        "manifest check complete"
    );

    CheckReport { invalid, plan }
}

/// Run the `manifold check` command.
///
/// Returns `Ok(false)` when any manifest is invalid or any plugin could
/// never activate.
pub fn run_check(paths: &[PathBuf], json: bool, use_color: bool) -> Result<bool, ManifoldError> {
    let report = check(paths);

    if json {
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|e| ManifoldError::Internal(format!("failed to render report: {e}")))?;
        println!("{rendered}");
    } else {
        print_report(&report, use_color);
    }
    Ok(report.passed())
}

fn print_report(report: &CheckReport, use_color: bool) {
    println!();
    for entry in &report.invalid {
        print_line(use_color, false, &entry.path, &entry.error);
    }

    if !report.plan.waves.is_empty() {
        println!("  Activation order");
        println!("  {}", "-".repeat(35));
        for (index, wave) in report.plan.waves.iter().enumerate() {
            println!("    {}. {}", index + 1, wave.join(", "));
        }
        println!();
    }

    for (name, unmet) in &report.plan.unresolved {
        print_line(use_color, false, name, &describe_unmet(unmet));
    }
    for (name, unmet) in &report.plan.optional_unmet {
        println!("  [--] {name}: optional {}", describe_unmet(unmet));
    }

    let summary = if report.passed() {
        "all plugins can activate".to_string()
    } else {
        format!(
            "{} invalid manifest(s), {} unresolved plugin(s)",
            report.invalid.len(),
            report.plan.unresolved.len()
        )
    };
    print_line(use_color, report.passed(), "check", &summary);
    println!();
}

fn print_line(use_color: bool, ok: bool, subject: &str, message: &str) {
    if use_color {
        use colored::Colorize;
        let badge = if ok { "✓".green() } else { "✗".red() };
        println!("  {badge} {}: {message}", subject.bold());
    } else {
        let badge = if ok { "[OK]" } else { "[FAIL]" };
        println!("  {badge} {subject}: {message}");
    }
}
