// SPDX-FileCopyrightText: 2026 Manifold Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Manifold - plugin manifest tooling.
//!
//! This is the binary entry point for the `manifold` CLI.

mod check;
mod inspect;

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Manifold - inspect plugin manifests and check dependency resolution.
#[derive(Parser, Debug)]
#[command(name = "manifold", version, about, long_about = None)]
struct Cli {
    /// Use this configuration file instead of the standard search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Disable colored output.
    #[arg(long, global = true)]
    plain: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch and validate the manifest of the plugin served at a base URL.
    Inspect {
        /// Plugin base URL; must end with `/`.
        base_url: String,
        /// Output structured JSON.
        #[arg(long)]
        json: bool,
    },
    /// Validate manifest files and simulate their activation order.
    Check {
        /// Bundled manifest files (JSON).
        #[arg(required = true)]
        manifests: Vec<PathBuf>,
        /// Output structured JSON.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => manifold_config::load_and_validate_path(path),
        None => manifold_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            manifold_config::render_errors(errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.logging.level);
    let use_color = !cli.plain && std::io::stdout().is_terminal();

    let outcome = match cli.command {
        Commands::Inspect { base_url, json } => {
            inspect::run_inspect(&config, &base_url, json, use_color).await
        }
        Commands::Check { manifests, json } => check::run_check(&manifests, json, use_color),
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            eprintln!("manifold: {e}");
            std::process::exit(1);
        }
    }
}

/// Install the global subscriber; `RUST_LOG` overrides the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("manifold={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
