//! Style stage: Sass compilation through `grass`, then syntax lowering and
//! vendor prefixing through lightningcss.

use lightningcss::stylesheet::{MinifyOptions, ParserFlags, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};

use super::{Stage, StageContext, StageInput, TransformError, TransformResult};
use crate::asset::AssetKind;
use crate::rules::StageId;
use crate::scss;

pub struct StyleStage;

impl Stage for StyleStage {
    fn id(&self) -> StageId {
        StageId::Style
    }

    fn accepts(&self, kind: AssetKind) -> bool {
        kind == AssetKind::Style
    }

    fn transform(
        &self,
        input: StageInput<'_>,
        ctx: &StageContext<'_>,
    ) -> Result<TransformResult, TransformError> {
        let compiled = scss::compile(input.asset, input.content, ctx.sources, &ctx.config.resolve_dirs)?;
        let css = compile_css(&input.asset.rel_path, &compiled.css, false).map_err(TransformError::Css)?;

        let mut result = TransformResult::new(css.into_bytes(), AssetKind::Style);
        result.consumed = compiled.imported;
        Ok(result)
    }
}

/// Browser floor used for prefixing and syntax lowering.
fn targets() -> Targets {
    Targets::from(Browsers {
        chrome: Some(80 << 16),
        edge: Some(80 << 16),
        firefox: Some(78 << 16),
        safari: Some(13 << 16),
        ios_saf: Some(13 << 16),
        ..Browsers::default()
    })
}

/// Parse and reprint `code`. Also used by the optimizer with `minify` set.
pub fn compile_css(filename: &str, code: &str, minify: bool) -> Result<String, String> {
    let targets = targets();
    let mut sheet = StyleSheet::parse(
        code,
        ParserOptions {
            filename: filename.to_string(),
            flags: ParserFlags::NESTING,
            ..ParserOptions::default()
        },
    )
    .map_err(|e| e.to_string())?;

    sheet
        .minify(MinifyOptions {
            targets,
            ..MinifyOptions::default()
        })
        .map_err(|e| e.to_string())?;

    let printed = sheet
        .to_css(PrinterOptions {
            minify,
            targets,
            ..PrinterOptions::default()
        })
        .map_err(|e| e.to_string())?;
    Ok(printed.code)
}
