// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `manifold inspect` command implementation.
//!
//! Fetches a plugin's bundled manifest over HTTP through the same loader the
//! registry uses, so relative `baseURL` resolution, size limits, and schema
//! validation behave exactly as they would at runtime. Scripts are listed,
//! never executed.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use manifold_config::ManifoldConfig;
use manifold_core::{EntryCallback, ManifoldError, PluginScript, ScriptExecutor};
use manifold_plugin::code_ref::find_code_refs;
use manifold_plugin::{HttpFetcher, PluginLoader, PluginManifest, ScriptLoader, VersionRange};
use serde::Serialize;
use url::Url;

/// Executor for a loader that is only used to fetch manifests.
struct NoExecution;

#[async_trait]
impl ScriptExecutor for NoExecution {
    async fn execute(
        &self,
        script: PluginScript,
        _callback: EntryCallback,
    ) -> Result<(), ManifoldError> {
        Err(ManifoldError::Internal(format!(
            "inspect does not execute scripts ({})",
            script.url
        )))
    }
}

/// Code reference site within an extension.
#[derive(Debug, Serialize)]
pub struct CodeRefSite {
    pub path: String,
    pub target: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionSummary {
    pub index: usize,
    #[serde(rename = "type")]
    pub kind: String,
    pub code_refs: Vec<CodeRefSite>,
}

/// Structured output for `--json` mode.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectReport {
    pub manifest_url: String,
    pub name: String,
    pub version: String,
    #[serde(rename = "baseURL")]
    pub base_url: String,
    pub registration_method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_hash: Option<String>,
    pub dependencies: BTreeMap<String, String>,
    pub optional_dependencies: BTreeMap<String, String>,
    pub load_scripts: Vec<String>,
    pub extensions: Vec<ExtensionSummary>,
}

impl InspectReport {
    fn new(manifest_url: &Url, manifest: &PluginManifest) -> Result<Self, ManifoldError> {
        let metadata = &manifest.metadata;
        let base = Url::parse(&manifest.base_url)
            .map_err(|e| ManifoldError::Validation(format!("baseURL: {e}")))?;

        let load_scripts = manifest
            .load_scripts
            .iter()
            .map(|script| {
                base.join(script)
                    .map(|url| url.to_string())
                    .map_err(|e| ManifoldError::Validation(format!("loadScripts `{script}`: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let extensions = manifest
            .extensions
            .iter()
            .enumerate()
            .map(|(index, extension)| {
                Ok(ExtensionSummary {
                    index,
                    kind: extension.kind.clone(),
                    code_refs: find_code_refs(&extension.properties)?
                        .into_iter()
                        .map(|(path, target)| CodeRefSite { path, target })
                        .collect(),
                })
            })
            .collect::<Result<Vec<_>, ManifoldError>>()?;

        let ranges = |deps: &BTreeMap<String, VersionRange>| {
            deps.iter()
                .map(|(name, range)| (name.clone(), range.to_string()))
                .collect()
        };

        Ok(Self {
            manifest_url: manifest_url.to_string(),
            name: metadata.name.clone(),
            version: metadata.version.to_string(),
            base_url: manifest.base_url.clone(),
            registration_method: manifest.registration_method.to_string(),
            build_hash: manifest.build_hash.clone(),
            dependencies: ranges(&metadata.dependencies),
            optional_dependencies: ranges(&metadata.optional_dependencies),
            load_scripts,
            extensions,
        })
    }
}

/// Fetch and summarize the manifest of the plugin at `base_url`.
pub async fn inspect(config: &ManifoldConfig, base_url: &str) -> Result<InspectReport, ManifoldError> {
    let fetcher = HttpFetcher::new(config.loader.fetch_timeout())?;
    let loader = ScriptLoader::new(config.loader.clone(), Arc::new(fetcher), Arc::new(NoExecution));

    let manifest_url = loader.manifest_url(base_url)?;
    let manifest = loader.load_plugin_manifest(&manifest_url).await?;
    InspectReport::new(&manifest_url, &manifest)
}

/// Run the `manifold inspect` command.
///
/// Returns `Ok(true)` when the manifest is valid; fetch and validation
/// failures are returned as errors.
pub async fn run_inspect(
    config: &ManifoldConfig,
    base_url: &str,
    json: bool,
    use_color: bool,
) -> Result<bool, ManifoldError> {
    let report = inspect(config, base_url).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        print_report(&report, use_color);
    }
    Ok(true)
}

fn print_report(report: &InspectReport, use_color: bool) {
    println!();
    if use_color {
        use colored::Colorize;
        println!(
            "  {} {}@{}",
            "✓".green(),
            report.name.bold(),
            report.version
        );
    } else {
        println!("  [OK] {}@{}", report.name, report.version);
    }
    println!("  {}", "-".repeat(35));
    println!("    Manifest:     {}", report.manifest_url);
    println!("    Base URL:     {}", report.base_url);
    println!("    Registration: {}", report.registration_method);
    if let Some(hash) = &report.build_hash {
        println!("    Build hash:   {hash}");
    }

    print_ranges("Requires", &report.dependencies);
    print_ranges("Optional", &report.optional_dependencies);

    println!("    Scripts:");
    for script in &report.load_scripts {
        println!("      {script}");
    }

    println!("    Extensions:   {}", report.extensions.len());
    for extension in &report.extensions {
        println!("      [{}] {}", extension.index, extension.kind);
        for site in &extension.code_refs {
            println!("          {} -> {}", site.path, site.target);
        }
    }
    println!();
}

fn print_ranges(label: &str, ranges: &BTreeMap<String, String>) {
    if ranges.is_empty() {
        return;
    }
    let joined = ranges
        .iter()
        .map(|(name, range)| format!("{name} {range}"))
        .collect::<Vec<_>>()
        .join(", ");
    println!("    {label:<13} {joined}");
}
