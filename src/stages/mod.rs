//! Transform Stages - per-file converters
//!
//! Stages are looked up through a fixed table keyed by `StageId`; a rule only
//! names stages, it never carries behavior of its own.

pub mod file;
pub mod raw_text;
pub mod script;
pub mod shader;
pub mod static_copy;
pub mod style;

use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

use crate::asset::{AssetKind, SourceAsset, SourceSet};
use crate::config::BuildConfig;
use crate::rules::StageId;
use crate::scss::ScssError;
use crate::script::SyntaxError;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Scss(#[from] ScssError),

    #[error("CSS error: {0}")]
    Css(String),

    #[error("Shader include error: {0}")]
    Shader(String),

    #[error("Stage {stage} cannot consume {kind} input")]
    KindMismatch { stage: StageId, kind: AssetKind },

    #[error("Input is not valid UTF-8")]
    Encoding,
}

/// Output of one stage, or of a whole stage chain.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformResult {
    pub content: Vec<u8>,
    pub kind: AssetKind,
    /// Source map for `content`, emitted next to the primary artifact.
    pub source_map: Option<Vec<u8>>,
    /// Other sources folded into this result; they are not emitted alone.
    pub consumed: Vec<String>,
}

impl TransformResult {
    pub fn new(content: Vec<u8>, kind: AssetKind) -> Self {
        Self {
            content,
            kind,
            source_map: None,
            consumed: Vec::new(),
        }
    }

    fn absorb(&mut self, next: TransformResult) {
        self.content = next.content;
        self.kind = next.kind;
        if next.source_map.is_some() {
            self.source_map = next.source_map;
        }
        for path in next.consumed {
            if !self.consumed.contains(&path) {
                self.consumed.push(path);
            }
        }
    }
}

/// Build-scoped, read-only state shared by every stage call.
pub struct StageContext<'a> {
    pub config: &'a BuildConfig,
    pub sources: &'a SourceSet,
    pub defines: &'a BTreeMap<String, String>,
    /// Results of the pre phase, keyed by source path. Empty while the pre
    /// phase itself is running.
    pub pre_outputs: &'a HashMap<String, TransformResult>,
}

/// What a stage sees: the originating asset plus the current bytes, which
/// differ from the asset's when an earlier stage already ran.
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    pub asset: &'a SourceAsset,
    pub content: &'a [u8],
    pub kind: AssetKind,
}

impl<'a> StageInput<'a> {
    pub fn text(&self) -> Result<&'a str, TransformError> {
        std::str::from_utf8(self.content).map_err(|_| TransformError::Encoding)
    }
}

pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    fn accepts(&self, kind: AssetKind) -> bool;

    fn transform(
        &self,
        input: StageInput<'_>,
        ctx: &StageContext<'_>,
    ) -> Result<TransformResult, TransformError>;
}

pub fn stage_for(id: StageId) -> &'static dyn Stage {
    match id {
        StageId::Script => &script::ScriptStage,
        StageId::Style => &style::StyleStage,
        StageId::RawText => &raw_text::RawTextStage,
        StageId::ShaderInclude => &shader::ShaderIncludeStage,
        StageId::File => &file::FileStage,
    }
}

/// Run `stages` in order over `asset`, starting from `start` when an earlier
/// phase already produced a result.
pub fn run_chain(
    stages: &[StageId],
    asset: &SourceAsset,
    start: Option<TransformResult>,
    ctx: &StageContext<'_>,
) -> Result<TransformResult, TransformError> {
    let mut current = start.unwrap_or_else(|| TransformResult::new(asset.content.to_vec(), asset.kind));

    for &id in stages {
        let stage = stage_for(id);
        if !stage.accepts(current.kind) {
            return Err(TransformError::KindMismatch {
                stage: id,
                kind: current.kind,
            });
        }
        let input = StageInput {
            asset,
            content: &current.content,
            kind: current.kind,
        };
        let next = stage.transform(input, ctx)?;
        current.absorb(next);
    }

    Ok(current)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::path::PathBuf;

    pub fn sources(files: &[(&str, &str)]) -> SourceSet {
        let mut set = SourceSet::new(PathBuf::from("/src"));
        for (rel, content) in files {
            set.insert(SourceAsset::new(
                PathBuf::from("/src").join(rel),
                rel.to_string(),
                content.as_bytes().to_vec(),
            ));
        }
        set
    }
}
