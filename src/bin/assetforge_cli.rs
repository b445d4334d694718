//! AssetForge CLI - build front-end assets from a JSON config
//!
//! Commands: build, validate, match
//! Outputs JSON to stdout, logs to stderr
//! Exit codes: 0 passed, 1 fatal error, 2 build failed

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

use assetforge_core::config::DEFAULT_CONFIG_FILE;
use assetforge_core::diagnostics::Diagnostic;
use assetforge_core::{BuildConfig, BuildMode, Pipeline, PipelineError};

#[derive(Parser)]
#[command(name = "assetforge-cli")]
#[command(about = "AssetForge CLI - rule-driven asset build pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the build configuration
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Log progress at info level (RUST_LOG takes precedence)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full build
    Build {
        /// development or production
        #[arg(short, long)]
        mode: Option<BuildMode>,

        /// Source directory
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Output directory (removed and rewritten)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Treat budget violations as errors
        #[arg(long)]
        strict: bool,
    },

    /// Load and validate the config, print it fully resolved
    Validate,

    /// Show which rules and stages apply to source paths
    Match {
        /// Source-relative paths
        #[arg(required = true)]
        paths: Vec<String>,
    },
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to serialize output: {e}"),
    }
}

fn fatal(error: &PipelineError) -> ExitCode {
    let diagnostic = match error {
        PipelineError::NamingCollision(c) => Some(Diagnostic::from(c)),
        _ => None,
    };
    print_json(&serde_json::json!({
        "success": false,
        "error": error.to_string(),
        "diagnostic": diagnostic,
    }));
    ExitCode::FAILURE
}

/// A missing default config file means "all defaults".
fn load_config(path: &Path) -> Result<BuildConfig, PipelineError> {
    if !path.exists() && path == Path::new(DEFAULT_CONFIG_FILE) {
        info!("no {} found, using defaults", DEFAULT_CONFIG_FILE);
        return Ok(BuildConfig::default());
    }
    Ok(BuildConfig::load(path)?)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    let mut config = match load_config(&cli.config) {
        Ok(c) => c,
        Err(e) => return fatal(&e),
    };

    match cli.command {
        Commands::Build { mode, source, out, strict } => {
            if let Some(mode) = mode {
                config.mode = mode;
            }
            if let Some(source) = source {
                config.source_dir = source;
            }
            if let Some(out) = out {
                config.output_dir = out;
            }
            config.strict_budgets |= strict;

            let report = match Pipeline::new(config).and_then(Pipeline::run) {
                Ok(r) => r,
                Err(e) => return fatal(&e),
            };
            print_json(&report);
            if report.passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }

        Commands::Validate => match config.validate() {
            Ok(()) => {
                print_json(&serde_json::json!({ "valid": true, "config": config }));
                ExitCode::SUCCESS
            }
            Err(e) => {
                print_json(&serde_json::json!({ "valid": false, "error": e.to_string() }));
                ExitCode::FAILURE
            }
        },

        Commands::Match { paths } => {
            let matcher = match config.rule_matcher() {
                Ok(m) => m,
                Err(e) => return fatal(&e.into()),
            };
            let plans: Vec<_> = paths
                .iter()
                .map(|path| {
                    let plan = matcher.plan(path);
                    serde_json::json!({
                        "path": path,
                        "verbatim": plan.is_empty(),
                        "plan": plan,
                    })
                })
                .collect();
            print_json(&plans);
            ExitCode::SUCCESS
        }
    }
}
