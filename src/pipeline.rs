//! Pipeline Orchestrator - single entry point for a build
//!
//! ```text
//! Clean -> Scan -> Transform -> Name -> Optimize -> Audit -> Write -> Done
//!                                                                  \-> Failed
//! ```
//!
//! Per-asset failures are collected and the machine keeps going, so a failed
//! build still writes every artifact that did succeed. Only configuration
//! defects (naming collisions, missing entries) and I/O errors abort.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::asset::{SourceAsset, SourceSet};
use crate::budget::BudgetChecker;
use crate::config::{BuildConfig, BuildMode, ConfigError};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::hashing::compute_manifest_hash;
use crate::manifest::{ArtifactSummary, BuildManifest, CollisionError, Insertion};
use crate::naming::OutputNamer;
use crate::optimizer::Optimizer;
use crate::rules::{RuleMatcher, StagePlan};
use crate::stages::{run_chain, static_copy, StageContext, TransformResult};
use crate::ENGINE_VERSION;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    NamingCollision(#[from] CollisionError),

    #[error("Entry point not found in source tree: {0}")]
    MissingEntry(String),

    #[error("Failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PipelineError + '_ {
    move |source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    Clean,
    Scan,
    Transform,
    Name,
    Optimize,
    Audit,
    Write,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub build_id: String,
    pub engine_version: String,
    pub mode: BuildMode,
    pub verdict: Verdict,
    pub states: Vec<BuildState>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub output_dir: PathBuf,
    pub artifacts: Vec<ArtifactSummary>,
    pub manifest_hash: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl BuildReport {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }

    pub fn artifact(&self, path: &str) -> Option<&ArtifactSummary> {
        self.artifacts.iter().find(|a| a.path == path)
    }
}

/// What the transform phase made of one source asset.
enum Outcome {
    Transformed(TransformResult),
    /// No rule matched.
    Verbatim,
    /// Recorded as a diagnostic; contributes nothing.
    Failed,
    /// A partial, only ever consumed by its importers.
    Skipped,
}

/// One build. Consumed by `run`; a new build needs a new pipeline.
pub struct Pipeline {
    config: BuildConfig,
    states: Vec<BuildState>,
}

impl Pipeline {
    pub fn new(config: BuildConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            states: Vec::new(),
        })
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    pub fn run(mut self) -> Result<BuildReport, PipelineError> {
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(n) = self.config.concurrency {
            builder = builder.num_threads(n);
        }
        let pool = builder.build()?;
        pool.install(|| self.execute())
    }

    fn enter(&mut self, state: BuildState) {
        info!(state = ?state, "entering state");
        self.states.push(state);
    }

    fn execute(&mut self) -> Result<BuildReport, PipelineError> {
        let started_at = Utc::now();
        let build_id = Uuid::new_v4().to_string();
        let matcher = self.config.rule_matcher()?;
        let ignore = self.config.ignore_patterns()?;
        let mut diagnostics = Diagnostics::default();
        info!(build_id = %build_id, mode = ?self.config.mode, "build started");

        // Clean
        self.enter(BuildState::Clean);
        let output_dir = self.config.output_dir.clone();
        if output_dir.exists() {
            fs::remove_dir_all(&output_dir).map_err(io_error(&output_dir))?;
            debug!(dir = %output_dir.display(), "removed previous output");
        }

        // Scan
        self.enter(BuildState::Scan);
        let source_root = fs::canonicalize(&self.config.source_dir).map_err(io_error(&self.config.source_dir))?;
        let static_dir = self.config.static_dir().and_then(|d| fs::canonicalize(d).ok());
        let skip: Vec<PathBuf> = static_dir.iter().cloned().collect();
        let sources = SourceSet::scan(&source_root, &skip, &ignore).map_err(io_error(&source_root))?;
        for entry in &self.config.entry_points {
            if sources.get(entry).is_none() {
                return Err(PipelineError::MissingEntry(entry.clone()));
            }
        }
        info!(count = sources.len(), "sources scanned");

        // Transform
        self.enter(BuildState::Transform);
        let (outcomes, consumed) = self.transform(&matcher, &sources, &mut diagnostics);

        // Name
        self.enter(BuildState::Name);
        let namer = OutputNamer::new(&self.config);
        let mut manifest = BuildManifest::new();
        for (asset, outcome) in sources.iter().zip(outcomes) {
            match outcome {
                Outcome::Transformed(_) | Outcome::Verbatim
                    if consumed.contains(&asset.rel_path) && !namer.is_entry(&asset.rel_path) =>
                {
                    debug!(path = %asset.rel_path, "consumed by another asset, not emitted");
                }
                Outcome::Transformed(result) => {
                    let named = namer.transformed(asset, result);
                    match manifest.insert(named.primary)? {
                        Insertion::Added => {
                            if let Some(map) = named.source_map {
                                manifest.insert(map)?;
                            }
                        }
                        Insertion::Deduplicated => {
                            debug!(path = %asset.rel_path, "identical output already named, sidecar dropped");
                        }
                    }
                }
                Outcome::Verbatim => {
                    manifest.insert(namer.verbatim(asset))?;
                }
                Outcome::Failed | Outcome::Skipped => {}
            }
        }
        if let Some(dir) = &static_dir {
            let label = self
                .config
                .static_copy_from
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            for file in static_copy::collect(dir).map_err(io_error(dir))? {
                manifest.insert(namer.static_file(file, &label))?;
            }
        }

        // Optimize
        self.enter(BuildState::Optimize);
        if self.config.mode.is_production() {
            diagnostics.extend(Optimizer::new(&self.config.optimization).run(&mut manifest));
        } else {
            debug!("development mode, optimizer skipped");
        }

        // Audit
        self.enter(BuildState::Audit);
        if self.config.mode.is_production() {
            let checker = BudgetChecker::new(self.config.strict_budgets);
            diagnostics.extend(checker.check(&manifest, &self.config.budgets));
        }

        // Write
        self.enter(BuildState::Write);
        write_manifest(&output_dir, &manifest)?;

        let verdict = if diagnostics.has_errors() {
            self.enter(BuildState::Failed);
            Verdict::Failed
        } else {
            self.enter(BuildState::Done);
            Verdict::Passed
        };

        let manifest_hash = compute_manifest_hash(&manifest.digests())?;
        info!(
            verdict = ?verdict,
            artifacts = manifest.len(),
            diagnostics = diagnostics.len(),
            manifest_hash = %manifest_hash,
            "build finished"
        );

        Ok(BuildReport {
            build_id,
            engine_version: ENGINE_VERSION.to_string(),
            mode: self.config.mode,
            verdict,
            states: self.states.clone(),
            started_at,
            finished_at: Utc::now(),
            output_dir,
            artifacts: manifest.summaries(),
            manifest_hash,
            diagnostics: diagnostics.into_vec(),
        })
    }

    /// Run the pre phase for every asset, then the main phase. Returns one
    /// outcome per asset (in source order) and every consumed source path.
    fn transform(
        &self,
        matcher: &RuleMatcher,
        sources: &SourceSet,
        diagnostics: &mut Diagnostics,
    ) -> (Vec<Outcome>, BTreeSet<String>) {
        let defines = self.config.effective_defines();
        let assets: Vec<(&SourceAsset, StagePlan)> =
            sources.iter().map(|a| (a, matcher.plan(&a.rel_path))).collect();

        let no_pre = HashMap::new();
        let pre_ctx = StageContext {
            config: &self.config,
            sources,
            defines: &defines,
            pre_outputs: &no_pre,
        };
        let pre_results: Vec<Option<Result<TransformResult, String>>> = assets
            .par_iter()
            .map(|(asset, plan)| {
                if plan.pre.is_empty() || asset.is_partial() {
                    return None;
                }
                Some(run_chain(&plan.pre, asset, None, &pre_ctx).map_err(|e| e.to_string()))
            })
            .collect();

        let mut pre_outputs = HashMap::new();
        let mut pre_failed = BTreeSet::new();
        for ((asset, _), result) in assets.iter().zip(pre_results) {
            match result {
                Some(Ok(out)) => {
                    pre_outputs.insert(asset.rel_path.clone(), out);
                }
                Some(Err(message)) => {
                    error!(path = %asset.rel_path, error = %message, "pre stage failed");
                    diagnostics.push(Diagnostic::parse_error(&asset.rel_path, message));
                    pre_failed.insert(asset.rel_path.clone());
                }
                None => {}
            }
        }

        let main_ctx = StageContext {
            pre_outputs: &pre_outputs,
            ..pre_ctx
        };
        let main_results: Vec<Result<Outcome, String>> = assets
            .par_iter()
            .map(|(asset, plan)| {
                if asset.is_partial() {
                    return Ok(Outcome::Skipped);
                }
                if pre_failed.contains(&asset.rel_path) {
                    return Ok(Outcome::Failed);
                }
                if plan.is_empty() {
                    return Ok(Outcome::Verbatim);
                }
                let start = pre_outputs.get(&asset.rel_path).cloned();
                if plan.main.is_empty() {
                    return Ok(start.map_or(Outcome::Verbatim, Outcome::Transformed));
                }
                run_chain(&plan.main, asset, start, &main_ctx)
                    .map(Outcome::Transformed)
                    .map_err(|e| e.to_string())
            })
            .collect();

        let mut consumed: BTreeSet<String> = pre_outputs.values().flat_map(|r| r.consumed.iter().cloned()).collect();
        let mut outcomes = Vec::with_capacity(main_results.len());
        for ((asset, _), result) in assets.iter().zip(main_results) {
            match result {
                Ok(outcome) => {
                    if let Outcome::Transformed(r) = &outcome {
                        consumed.extend(r.consumed.iter().cloned());
                    }
                    outcomes.push(outcome);
                }
                Err(message) => {
                    error!(path = %asset.rel_path, error = %message, "transform failed");
                    diagnostics.push(Diagnostic::parse_error(&asset.rel_path, message));
                    outcomes.push(Outcome::Failed);
                }
            }
        }

        info!(
            transformed = outcomes.iter().filter(|o| matches!(o, Outcome::Transformed(_))).count(),
            failed = outcomes.iter().filter(|o| matches!(o, Outcome::Failed)).count(),
            "transform phase complete"
        );
        (outcomes, consumed)
    }
}

/// The only place the pipeline writes to disk.
fn write_manifest(output_dir: &Path, manifest: &BuildManifest) -> Result<(), PipelineError> {
    fs::create_dir_all(output_dir).map_err(io_error(output_dir))?;
    for artifact in manifest.iter() {
        let path = output_dir.join(&artifact.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        fs::write(&path, &artifact.content).map_err(io_error(&path))?;
        debug!(path = %artifact.path, size = artifact.content.len(), "wrote artifact");
    }
    Ok(())
}
