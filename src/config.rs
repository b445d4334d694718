//! Build Configuration - the declarative side of the pipeline
//!
//! An empty JSON object is a complete configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::asset::AssetKind;
use crate::rules::{default_rules, RuleError, RuleMatcher, RuleSpec};
use crate::ENGINE_VERSION;

pub const DEFAULT_CONFIG_FILE: &str = "assetforge.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error("Invalid ignore pattern {0:?}: {1}")]
    IgnorePattern(String, glob::PatternError),

    #[error("Config requires engine >= {0}, current is {1}")]
    EngineVersionMismatch(String, String),

    #[error("Invalid engine version requirement: {0}")]
    InvalidVersion(String),

    #[error("At least one entry point is required")]
    NoEntryPoints,

    #[error("Output directory {0} would contain or equal the source directory")]
    UnsafeOutputDir(PathBuf),
}

/// The one process-wide flag. Fixed at build start, read-only afterwards.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Development,
    #[default]
    Production,
}

impl BuildMode {
    pub fn is_production(&self) -> bool {
        *self == Self::Production
    }
}

impl std::str::FromStr for BuildMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceMapMode {
    None,
    #[default]
    File,
    Inline,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationConfig {
    #[serde(default = "default_true")]
    pub minify: bool,
    #[serde(default = "default_image_quality")]
    pub image_quality: u8,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            minify: true,
            image_quality: default_image_quality(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SizeBudget {
    #[serde(default = "default_budget_kinds")]
    pub kinds: Vec<AssetKind>,
    #[serde(default = "default_max_size")]
    pub max_asset_size: u64,
    #[serde(default = "default_max_size")]
    pub max_entry_size: u64,
}

impl Default for SizeBudget {
    fn default() -> Self {
        Self {
            kinds: default_budget_kinds(),
            max_asset_size: default_max_size(),
            max_entry_size: default_max_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    #[serde(default = "default_engine_min_version")]
    pub engine_min_version: String,
    #[serde(default)]
    pub mode: BuildMode,
    #[serde(default = "default_source_dir")]
    pub source_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_entry_points")]
    pub entry_points: Vec<String>,
    #[serde(default = "default_static_copy_from")]
    pub static_copy_from: Option<PathBuf>,
    #[serde(default = "default_resolve_dirs")]
    pub resolve_dirs: Vec<String>,
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,
    #[serde(default = "default_rules")]
    pub rules: Vec<RuleSpec>,
    #[serde(default = "default_budgets")]
    pub budgets: Vec<SizeBudget>,
    #[serde(default)]
    pub strict_budgets: bool,
    #[serde(default)]
    pub optimization: OptimizationConfig,
    #[serde(default)]
    pub define: BTreeMap<String, String>,
    #[serde(default)]
    pub source_maps: SourceMapMode,
    #[serde(default = "default_hash_length")]
    pub hash_length: usize,
    #[serde(default)]
    pub concurrency: Option<usize>,
}

fn default_true() -> bool { true }
fn default_image_quality() -> u8 { 80 }
fn default_max_size() -> u64 { 250_000 }
fn default_budget_kinds() -> Vec<AssetKind> { vec![AssetKind::Script, AssetKind::Style] }
fn default_budgets() -> Vec<SizeBudget> { vec![SizeBudget::default()] }
fn default_engine_min_version() -> String { "0.1.0".to_string() }
fn default_source_dir() -> PathBuf { PathBuf::from(".") }
fn default_output_dir() -> PathBuf { PathBuf::from("public") }
fn default_static_copy_from() -> Option<PathBuf> { Some(PathBuf::from("shared")) }
fn default_hash_length() -> usize { 20 }
fn default_ignore() -> Vec<String> { vec![".git/**".to_string()] }

fn default_entry_points() -> Vec<String> {
    vec!["app/index.js".to_string(), "styles/index.scss".to_string()]
}

fn default_resolve_dirs() -> Vec<String> {
    vec!["app".to_string(), "shared".to_string(), "styles".to_string()]
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            engine_min_version: default_engine_min_version(),
            mode: BuildMode::default(),
            source_dir: default_source_dir(),
            output_dir: default_output_dir(),
            entry_points: default_entry_points(),
            static_copy_from: default_static_copy_from(),
            resolve_dirs: default_resolve_dirs(),
            ignore: default_ignore(),
            rules: default_rules(),
            budgets: default_budgets(),
            strict_budgets: false,
            optimization: OptimizationConfig::default(),
            define: BTreeMap::new(),
            source_maps: SourceMapMode::default(),
            hash_length: default_hash_length(),
            concurrency: None,
        }
    }
}

impl BuildConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a config file. Relative `sourceDir`/`outputDir` are resolved
    /// against the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json(&content)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    fn rebase(&mut self, base: &Path) {
        if self.source_dir.is_relative() {
            self.source_dir = base.join(&self.source_dir);
        }
        if self.output_dir.is_relative() {
            self.output_dir = base.join(&self.output_dir);
        }
    }

    /// `staticCopyFrom` resolved against the source directory.
    pub fn static_dir(&self) -> Option<PathBuf> {
        self.static_copy_from.as_ref().map(|d| {
            if d.is_relative() {
                self.source_dir.join(d)
            } else {
                d.clone()
            }
        })
    }

    /// Definitions substituted into scripts. `IS_DEVELOPMENT` follows the
    /// build mode unless explicitly set.
    pub fn effective_defines(&self) -> BTreeMap<String, String> {
        let mut defines = self.define.clone();
        defines
            .entry("IS_DEVELOPMENT".to_string())
            .or_insert_with(|| (!self.mode.is_production()).to_string());
        defines
    }

    pub fn effective_hash_length(&self) -> usize {
        self.hash_length.clamp(8, 64)
    }

    pub fn rule_matcher(&self) -> Result<RuleMatcher, ConfigError> {
        Ok(RuleMatcher::new(&self.rules)?)
    }

    pub fn ignore_patterns(&self) -> Result<Vec<glob::Pattern>, ConfigError> {
        self.ignore
            .iter()
            .map(|p| glob::Pattern::new(p).map_err(|e| ConfigError::IgnorePattern(p.clone(), e)))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.check_engine_version()?;
        self.rule_matcher()?;
        self.ignore_patterns()?;

        if self.entry_points.is_empty() {
            return Err(ConfigError::NoEntryPoints);
        }

        let source = normalize(&self.source_dir);
        let output = normalize(&self.output_dir);
        if source.starts_with(&output) {
            return Err(ConfigError::UnsafeOutputDir(self.output_dir.clone()));
        }

        Ok(())
    }

    fn check_engine_version(&self) -> Result<(), ConfigError> {
        let engine_ver = semver::Version::parse(ENGINE_VERSION)
            .map_err(|_| ConfigError::InvalidVersion(ENGINE_VERSION.to_string()))?;
        let min_ver = semver::Version::parse(&self.engine_min_version)
            .map_err(|_| ConfigError::InvalidVersion(self.engine_min_version.clone()))?;

        if engine_ver < min_ver {
            return Err(ConfigError::EngineVersionMismatch(
                self.engine_min_version.clone(),
                ENGINE_VERSION.to_string(),
            ));
        }
        Ok(())
    }
}

/// Absolute, lexically normalized path. Falls back to the lexical form when
/// the path does not exist yet.
fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    let absolute = if path.is_relative() {
        std::env::current_dir().map(|d| d.join(path)).unwrap_or_else(|_| path.to_path_buf())
    } else {
        path.to_path_buf()
    };
    let mut out = PathBuf::new();
    for c in absolute.components() {
        match c {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::StageId;

    #[test]
    fn test_empty_object_is_default() {
        let config = BuildConfig::from_json("{}").unwrap();
        assert_eq!(config, BuildConfig::default());
        assert_eq!(config.mode, BuildMode::Production);
        assert_eq!(config.optimization.image_quality, 80);
        assert_eq!(config.budgets[0].max_asset_size, 250_000);
        assert_eq!(config.rules.len(), 5);
    }

    #[test]
    fn test_camel_case_keys() {
        let config = BuildConfig::from_json(
            r#"{
                "mode": "development",
                "entryPoints": ["src/main.js"],
                "staticCopyFrom": null,
                "strictBudgets": true,
                "optimization": {"imageQuality": 60},
                "rules": [{"test": "\\.js$", "use": ["script"]}]
            }"#,
        )
        .unwrap();
        assert_eq!(config.mode, BuildMode::Development);
        assert_eq!(config.entry_points, vec!["src/main.js"]);
        assert!(config.static_copy_from.is_none());
        assert!(config.strict_budgets);
        assert!(config.optimization.minify);
        assert_eq!(config.optimization.image_quality, 60);
        assert_eq!(config.rules[0].stages, vec![StageId::Script]);
    }

    #[test]
    fn test_is_development_define_follows_mode() {
        let mut config = BuildConfig::default();
        assert_eq!(config.effective_defines()["IS_DEVELOPMENT"], "false");
        config.mode = BuildMode::Development;
        assert_eq!(config.effective_defines()["IS_DEVELOPMENT"], "true");
        config.define.insert("IS_DEVELOPMENT".into(), "false".into());
        assert_eq!(config.effective_defines()["IS_DEVELOPMENT"], "false");
    }

    #[test]
    fn test_engine_version_gate() {
        let config = BuildConfig {
            engine_min_version: "99.0.0".to_string(),
            ..BuildConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::EngineVersionMismatch(..))));
    }

    #[test]
    fn test_output_dir_may_not_contain_sources() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("site")).unwrap();
        let config = BuildConfig {
            source_dir: dir.path().join("site"),
            output_dir: dir.path().to_path_buf(),
            ..BuildConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::UnsafeOutputDir(_))));

        let same = BuildConfig {
            source_dir: dir.path().to_path_buf(),
            output_dir: dir.path().join("."),
            ..BuildConfig::default()
        };
        assert!(matches!(same.validate(), Err(ConfigError::UnsafeOutputDir(_))));
    }

    #[test]
    fn test_no_entry_points_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = BuildConfig {
            source_dir: dir.path().to_path_buf(),
            output_dir: dir.path().join("public"),
            entry_points: vec![],
            ..BuildConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::NoEntryPoints)));
    }

    #[test]
    fn test_load_rebases_relative_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        fs::write(&path, r#"{"outputDir": "dist"}"#).unwrap();
        let config = BuildConfig::load(&path).unwrap();
        assert_eq!(config.output_dir, dir.path().join("dist"));
        assert_eq!(config.source_dir, dir.path().join("."));
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("dev".parse::<BuildMode>().unwrap(), BuildMode::Development);
        assert_eq!("production".parse::<BuildMode>().unwrap(), BuildMode::Production);
        assert!("staging".parse::<BuildMode>().is_err());
    }
}
