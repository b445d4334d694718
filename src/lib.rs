//! AssetForge Core - rule-driven front-end asset build pipeline
//!
//! # Guarantees
//! 1. Rules Decide, Stages Execute
//! 2. One Bad Asset Never Hides Another
//! 3. Clean Before Write
//! 4. Deterministic Output
//! 5. Entries Keep Their Names, Everything Else Is Fingerprinted
//! 6. The Build Mode Is Fixed At Start

pub mod asset;
pub mod budget;
pub mod config;
pub mod diagnostics;
pub mod hashing;
pub mod manifest;
pub mod naming;
pub mod optimizer;
pub mod pipeline;
pub mod rules;
pub mod script;
pub mod scss;
pub mod stages;

pub use asset::{AssetKind, SourceAsset, SourceSet};
pub use budget::{BudgetChecker, BudgetRule, BudgetViolation};
pub use config::{BuildConfig, BuildMode, ConfigError, SizeBudget, SourceMapMode};
pub use diagnostics::{Diagnostic, DiagnosticKind, Severity};
pub use hashing::{canonical_json, compute_manifest_hash, content_hash};
pub use manifest::{ArtifactSummary, BuildManifest, Insertion, OutputArtifact};
pub use pipeline::{BuildReport, BuildState, Pipeline, PipelineError, Verdict};
pub use rules::{Enforce, RuleMatcher, RuleSpec, StageId, StagePlan};
pub use stages::{Stage, TransformError, TransformResult};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
