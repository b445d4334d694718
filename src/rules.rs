//! Rule Matcher - extension predicates to ordered stage lists
//!
//! Rules are a declaration-ordered table. Matching never ranks by
//! specificity: every matching rule applies, `pre` rules first.

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifiers of the per-file transform stages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum StageId {
    Script,
    Style,
    RawText,
    ShaderInclude,
    File,
}

impl StageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Style => "style",
            Self::RawText => "raw-text",
            Self::ShaderInclude => "shader-include",
            Self::File => "file",
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Enforce {
    /// Runs before the main compile step of every asset.
    Pre,
    #[default]
    Normal,
}

/// A rule as declared in configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuleSpec {
    /// Regex tested against the `/`-separated source-relative path.
    pub test: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<String>,
    #[serde(rename = "use")]
    pub stages: Vec<StageId>,
    #[serde(default)]
    pub enforce: Enforce,
}

impl RuleSpec {
    pub fn new(test: &str, stages: &[StageId]) -> Self {
        Self {
            test: test.to_string(),
            exclude: None,
            stages: stages.to_vec(),
            enforce: Enforce::Normal,
        }
    }

    pub fn excluding(mut self, exclude: &str) -> Self {
        self.exclude = Some(exclude.to_string());
        self
    }

    pub fn pre(mut self) -> Self {
        self.enforce = Enforce::Pre;
        self
    }
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("rule {index}: invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        index: usize,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("rule {0}: empty stage list")]
    NoStages(usize),
}

#[derive(Debug, Clone)]
pub struct Rule {
    /// Position in the declared table.
    pub index: usize,
    test: Regex,
    exclude: Option<Regex>,
    pub stages: Vec<StageId>,
    pub enforce: Enforce,
}

impl Rule {
    pub fn compile(index: usize, spec: &RuleSpec) -> Result<Self, RuleError> {
        if spec.stages.is_empty() {
            return Err(RuleError::NoStages(index));
        }
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|source| RuleError::InvalidPattern {
                index,
                pattern: pattern.to_string(),
                source,
            })
        };
        Ok(Self {
            index,
            test: compile(&spec.test)?,
            exclude: spec.exclude.as_deref().map(compile).transpose()?,
            stages: spec.stages.clone(),
            enforce: spec.enforce,
        })
    }

    pub fn matches(&self, rel_path: &str) -> bool {
        self.test.is_match(rel_path)
            && !self.exclude.as_ref().map_or(false, |ex| ex.is_match(rel_path))
    }
}

/// Ordered stage plan for one asset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StagePlan {
    pub pre: Vec<StageId>,
    pub main: Vec<StageId>,
    /// Indices of the matching rules, in application order.
    pub rules: Vec<usize>,
}

impl StagePlan {
    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.main.is_empty()
    }

    pub fn contains(&self, stage: StageId) -> bool {
        self.pre.contains(&stage) || self.main.contains(&stage)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuleMatcher {
    rules: Vec<Rule>,
}

impl RuleMatcher {
    pub fn new(specs: &[RuleSpec]) -> Result<Self, RuleError> {
        let rules = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| Rule::compile(i, spec))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// All rules matching `rel_path`: `pre` rules first, each group in
    /// declaration order. Zero matches is not an error.
    pub fn matching(&self, rel_path: &str) -> Vec<&Rule> {
        let hits: Vec<&Rule> = self.rules.iter().filter(|r| r.matches(rel_path)).collect();
        let (pre, normal): (Vec<&Rule>, Vec<&Rule>) =
            hits.into_iter().partition(|r| r.enforce == Enforce::Pre);
        pre.into_iter().chain(normal).collect()
    }

    pub fn plan(&self, rel_path: &str) -> StagePlan {
        let mut plan = StagePlan::default();
        for rule in self.matching(rel_path) {
            plan.rules.push(rule.index);
            match rule.enforce {
                Enforce::Pre => plan.pre.extend(&rule.stages),
                Enforce::Normal => plan.main.extend(&rule.stages),
            }
        }
        plan
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Default loader table. Shader sources become string modules in the pre
/// phase so scripts can inline them.
pub fn default_rules() -> Vec<RuleSpec> {
    vec![
        RuleSpec::new(r"\.js$", &[StageId::Script]).excluding("node_modules"),
        RuleSpec::new(r"\.scss$", &[StageId::Style]),
        RuleSpec::new(
            r"(?i)\.(png|jpe?g|gif|svg|webp|woff|woff2|eot|ttf|otf|fnt)$",
            &[StageId::File],
        ),
        RuleSpec::new(r"\.(glsl|frag|vert)$", &[StageId::ShaderInclude])
            .excluding("node_modules")
            .pre(),
        RuleSpec::new(r"\.(glsl|frag|vert)$", &[StageId::RawText])
            .excluding("node_modules")
            .pre(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> RuleMatcher {
        RuleMatcher::new(&default_rules()).unwrap()
    }

    #[test]
    fn test_unmatched_path_has_empty_plan() {
        let plan = matcher().plan("robots.txt");
        assert!(plan.is_empty());
        assert!(plan.rules.is_empty());
    }

    #[test]
    fn test_exclusion_predicate() {
        let m = matcher();
        assert_eq!(m.plan("app/index.js").main, vec![StageId::Script]);
        assert!(m.plan("node_modules/lib/index.js").is_empty());
    }

    #[test]
    fn test_pre_rules_first_then_declaration_order() {
        let specs = vec![
            RuleSpec::new(r"\.glsl$", &[StageId::File]),
            RuleSpec::new(r"\.glsl$", &[StageId::ShaderInclude]).pre(),
            RuleSpec::new(r"\.glsl$", &[StageId::RawText]).pre(),
        ];
        let m = RuleMatcher::new(&specs).unwrap();
        let order: Vec<usize> = m.matching("a.glsl").iter().map(|r| r.index).collect();
        assert_eq!(order, vec![1, 2, 0]);

        let plan = m.plan("a.glsl");
        assert_eq!(plan.pre, vec![StageId::ShaderInclude, StageId::RawText]);
        assert_eq!(plan.main, vec![StageId::File]);
    }

    #[test]
    fn test_ties_ignore_specificity() {
        let specs = vec![
            RuleSpec::new(r"\.js$", &[StageId::File]),
            RuleSpec::new(r"^app/index\.js$", &[StageId::Script]),
        ];
        let m = RuleMatcher::new(&specs).unwrap();
        assert_eq!(m.plan("app/index.js").main, vec![StageId::File, StageId::Script]);
    }

    #[test]
    fn test_image_pattern_case_insensitive() {
        assert_eq!(matcher().plan("img/LOGO.PNG").main, vec![StageId::File]);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let specs = vec![RuleSpec::new(r"\.(js$", &[StageId::Script])];
        let err = RuleMatcher::new(&specs).unwrap_err();
        assert!(err.to_string().contains("rule 0"));
    }

    #[test]
    fn test_rule_spec_json_shape() {
        let spec: RuleSpec = serde_json::from_str(
            r#"{"test": "\\.frag$", "exclude": "vendor", "use": ["raw-text"], "enforce": "pre"}"#,
        )
        .unwrap();
        assert_eq!(spec.stages, vec![StageId::RawText]);
        assert_eq!(spec.enforce, Enforce::Pre);
        assert_eq!(spec.exclude.as_deref(), Some("vendor"));
    }
}
