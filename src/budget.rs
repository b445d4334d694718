//! Budget Checker - Rule/Policy Separation
//!
//! Rules measure the manifest and produce violations.
//! Policy (strict or not) decides how severe they are.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::asset::AssetKind;
use crate::config::SizeBudget;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Severity};
use crate::manifest::{BuildManifest, OutputArtifact};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BudgetViolation {
    pub rule: String,
    /// Offending artifact, or `None` for aggregate rules.
    pub path: Option<String>,
    pub threshold: u64,
    pub actual: u64,
}

/// Budget rule trait - produces violations
pub trait BudgetRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn check(&self, artifacts: &[&OutputArtifact], budget: &SizeBudget) -> Vec<BudgetViolation>;
}

/// Artifacts a budget applies to. Images never count, whatever the filter says.
fn in_scope<'m>(manifest: &'m BuildManifest, budget: &SizeBudget) -> Vec<&'m OutputArtifact> {
    manifest
        .iter()
        .filter(|a| a.kind != AssetKind::Image && budget.kinds.contains(&a.kind))
        .collect()
}

// --- Concrete Rules ---

pub struct MaxAssetSizeRule;

impl BudgetRule for MaxAssetSizeRule {
    fn name(&self) -> &'static str { "max_asset_size" }

    fn check(&self, artifacts: &[&OutputArtifact], budget: &SizeBudget) -> Vec<BudgetViolation> {
        artifacts
            .iter()
            .filter(|a| a.size() > budget.max_asset_size)
            .map(|a| BudgetViolation {
                rule: self.name().to_string(),
                path: Some(a.path.clone()),
                threshold: budget.max_asset_size,
                actual: a.size(),
            })
            .collect()
    }
}

pub struct MaxEntrySizeRule;

impl BudgetRule for MaxEntrySizeRule {
    fn name(&self) -> &'static str { "max_entry_size" }

    fn check(&self, artifacts: &[&OutputArtifact], budget: &SizeBudget) -> Vec<BudgetViolation> {
        let total: u64 = artifacts.iter().filter(|a| a.entry).map(|a| a.size()).sum();
        if total > budget.max_entry_size {
            vec![BudgetViolation {
                rule: self.name().to_string(),
                path: None,
                threshold: budget.max_entry_size,
                actual: total,
            }]
        } else {
            vec![]
        }
    }
}

/// Runs every rule against every budget and applies the strictness policy.
pub struct BudgetChecker {
    rules: Vec<Box<dyn BudgetRule>>,
    strict: bool,
}

impl BudgetChecker {
    pub fn new(strict: bool) -> Self {
        Self {
            rules: vec![Box::new(MaxAssetSizeRule), Box::new(MaxEntrySizeRule)],
            strict,
        }
    }

    pub fn violations(&self, manifest: &BuildManifest, budgets: &[SizeBudget]) -> Vec<BudgetViolation> {
        let mut all = vec![];
        for budget in budgets {
            let scoped = in_scope(manifest, budget);
            for rule in &self.rules {
                all.extend(rule.check(&scoped, budget));
            }
        }
        all
    }

    pub fn check(&self, manifest: &BuildManifest, budgets: &[SizeBudget]) -> Vec<Diagnostic> {
        let severity = if self.strict { Severity::Error } else { Severity::Warning };

        self.violations(manifest, budgets)
            .into_iter()
            .map(|v| {
                let subject = v.path.as_deref().unwrap_or("entry bundles");
                warn!(rule = %v.rule, subject, threshold = v.threshold, actual = v.actual, "size budget exceeded");
                Diagnostic {
                    kind: DiagnosticKind::BudgetViolation,
                    severity,
                    message: format!("{subject} exceeds {} ({} > {} bytes)", v.rule, v.actual, v.threshold),
                    path: v.path,
                    expected: Some(format!("<= {} bytes", v.threshold)),
                    actual: Some(format!("{} bytes", v.actual)),
                }
            })
            .collect()
    }
}

impl Default for BudgetChecker {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(path: &str, size: usize, kind: AssetKind, entry: bool) -> OutputArtifact {
        OutputArtifact {
            path: path.to_string(),
            content: vec![b'x'; size],
            kind,
            entry,
            source: path.to_string(),
            verbatim: false,
        }
    }

    fn budget(max_asset: u64, max_entry: u64) -> SizeBudget {
        SizeBudget {
            max_asset_size: max_asset,
            max_entry_size: max_entry,
            ..SizeBudget::default()
        }
    }

    #[test]
    fn test_images_never_counted() {
        let mut m = BuildManifest::new();
        m.insert(artifact("big.png", 500, AssetKind::Image, false)).unwrap();
        let b = SizeBudget {
            kinds: vec![AssetKind::Image],
            ..budget(10, 10)
        };
        assert!(BudgetChecker::default().check(&m, &[b]).is_empty());
    }

    #[test]
    fn test_asset_and_entry_violations() {
        let mut m = BuildManifest::new();
        m.insert(artifact("index.js", 60, AssetKind::Script, true)).unwrap();
        m.insert(artifact("index.css", 50, AssetKind::Style, true)).unwrap();
        m.insert(artifact("font.woff", 900, AssetKind::Font, false)).unwrap();

        let violations = BudgetChecker::default().violations(&m, &[budget(55, 100)]);
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].rule, "max_asset_size");
        assert_eq!(violations[0].path.as_deref(), Some("index.js"));
        assert_eq!(violations[1].rule, "max_entry_size");
        assert_eq!(violations[1].actual, 110);
    }

    #[test]
    fn test_strict_policy_escalates() {
        let mut m = BuildManifest::new();
        m.insert(artifact("index.js", 60, AssetKind::Script, true)).unwrap();

        let lenient = BudgetChecker::new(false).check(&m, &[budget(10, 1000)]);
        assert_eq!(lenient[0].severity, Severity::Warning);
        assert!(!lenient[0].is_error());

        let strict = BudgetChecker::new(true).check(&m, &[budget(10, 1000)]);
        assert!(strict[0].is_error());
        assert_eq!(strict[0].kind, DiagnosticKind::BudgetViolation);
    }
}
