//! Script stage: parse, raw-module inlining, define replacement and
//! down-leveling, plus development source maps.

use base64::Engine;

use super::{raw_text, Stage, StageContext, StageInput, TransformError, TransformResult};
use crate::asset::AssetKind;
use crate::config::SourceMapMode;
use crate::rules::StageId;
use crate::script::{self, CompileOptions, InlineModule};

pub struct ScriptStage;

impl Stage for ScriptStage {
    fn id(&self) -> StageId {
        StageId::Script
    }

    fn accepts(&self, kind: AssetKind) -> bool {
        kind == AssetKind::Script
    }

    fn transform(
        &self,
        input: StageInput<'_>,
        ctx: &StageContext<'_>,
    ) -> Result<TransformResult, TransformError> {
        let source = input.text()?;
        let from = input.asset.rel_path.as_str();

        let resolve = |spec: &str| -> Option<InlineModule> {
            let target = ctx
                .sources
                .resolve(from, spec, &ctx.config.resolve_dirs, |joined| vec![joined.to_string()])?;
            let module = ctx.pre_outputs.get(&target.rel_path)?;
            let expression = raw_text::default_export(&module.content)?;
            Some(InlineModule {
                path: target.rel_path.clone(),
                expression: expression.to_string(),
            })
        };

        let production = ctx.config.mode.is_production();
        let wants_map = !production && ctx.config.source_maps != SourceMapMode::None;
        let compiled = script::compile(
            from,
            source,
            &CompileOptions {
                defines: ctx.defines,
                resolve: &resolve,
                source_map: wants_map,
            },
        )?;
        let mut result = TransformResult::new(Vec::new(), AssetKind::Script);
        result.consumed = compiled.inlined;

        let mut code = compiled.code;
        match (ctx.config.source_maps, compiled.source_map) {
            (SourceMapMode::File, Some(map)) => result.source_map = Some(map.into_bytes()),
            (SourceMapMode::Inline, Some(map)) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(map);
                if !code.ends_with('\n') {
                    code.push('\n');
                }
                code.push_str("//# sourceMappingURL=data:application/json;charset=utf-8;base64,");
                code.push_str(&encoded);
                code.push('\n');
            }
            _ => {}
        }

        result.content = code.into_bytes();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BuildConfig, BuildMode};
    use crate::stages::test_support::sources;
    use std::collections::HashMap;

    fn run(
        config: &BuildConfig,
        files: &[(&str, &str)],
        pre: HashMap<String, TransformResult>,
    ) -> Result<TransformResult, TransformError> {
        let set = sources(files);
        let defines = config.effective_defines();
        let ctx = StageContext {
            config,
            sources: &set,
            defines: &defines,
            pre_outputs: &pre,
        };
        let asset = set.get(files[0].0).unwrap();
        ScriptStage.transform(
            StageInput {
                asset,
                content: &asset.content,
                kind: asset.kind,
            },
            &ctx,
        )
    }

    #[test]
    fn test_production_has_no_source_map() {
        let out = run(&BuildConfig::default(), &[("app/index.js", "if (IS_DEVELOPMENT) { log(); }\n")], HashMap::new()).unwrap();
        assert!(out.source_map.is_none());
        let code = String::from_utf8(out.content).unwrap();
        assert!(code.contains("if (false)"), "{code}");
        assert!(!code.contains("sourceMappingURL"));
    }

    #[test]
    fn test_development_file_source_map() {
        let config = BuildConfig {
            mode: BuildMode::Development,
            ..BuildConfig::default()
        };
        let out = run(&config, &[("app/index.js", "const a = `x`;\n")], HashMap::new()).unwrap();
        let map: serde_json::Value = serde_json::from_slice(out.source_map.as_deref().unwrap()).unwrap();
        assert_eq!(map["sources"][0], "app/index.js");
    }

    #[test]
    fn test_development_inline_source_map() {
        let config = BuildConfig {
            mode: BuildMode::Development,
            source_maps: SourceMapMode::Inline,
            ..BuildConfig::default()
        };
        let out = run(&config, &[("app/index.js", "a()")], HashMap::new()).unwrap();
        let code = String::from_utf8(out.content).unwrap();
        assert!(code.starts_with("a();\n//# sourceMappingURL=data:application/json"), "{code}");
        assert!(out.source_map.is_none());
    }

    #[test]
    fn test_raw_module_inlined_from_pre_outputs() {
        let mut pre = HashMap::new();
        pre.insert(
            "app/gl/wave.frag".to_string(),
            TransformResult::new(b"export default \"void main(){}\";\n".to_vec(), AssetKind::Script),
        );
        let out = run(
            &BuildConfig::default(),
            &[
                ("app/index.js", "import wave from './gl/wave.frag';\nrender(wave);\n"),
                ("app/gl/wave.frag", "void main(){}"),
            ],
            pre,
        )
        .unwrap();
        let code = String::from_utf8(out.content).unwrap();
        assert!(code.contains("var wave = \"void main(){}\";"), "{code}");
        assert!(!code.contains("import"), "{code}");
        assert_eq!(out.consumed, vec!["app/gl/wave.frag"]);
    }

    #[test]
    fn test_syntax_error() {
        let err = run(&BuildConfig::default(), &[("app/index.js", "function broken( {\n")], HashMap::new()).unwrap_err();
        assert!(matches!(err, TransformError::Syntax(_)));
    }

    #[test]
    fn test_balanced_but_invalid_syntax() {
        let err = run(&BuildConfig::default(), &[("app/index.js", "let x = ;\nconst = 5;\n")], HashMap::new()).unwrap_err();
        assert!(matches!(err, TransformError::Syntax(ref e) if e.line == 1), "{err:?}");
    }

    #[test]
    fn test_shorthand_define_stays_valid() {
        let out = run(&BuildConfig::default(), &[("app/index.js", "report({ IS_DEVELOPMENT });\n")], HashMap::new()).unwrap();
        let code = String::from_utf8(out.content).unwrap();
        assert!(!code.contains("{ false"), "{code}");
        assert!(script::minify(&code).is_ok(), "{code}");
    }
}
