//! Shader-include stage: splices `#include "x"` and
//! `#pragma glslify: import('x')` lines before raw inlining.

use super::{Stage, StageContext, StageInput, TransformError, TransformResult};
use crate::asset::{AssetKind, SourceSet};
use crate::rules::StageId;

pub struct ShaderIncludeStage;

/// Path named by an include directive, if `line` is one.
fn include_spec(line: &str) -> Option<&str> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("#include") {
        let rest = rest.trim_start();
        let close = match rest.chars().next()? {
            '"' => '"',
            '<' => '>',
            _ => return None,
        };
        let (spec, tail) = rest[1..].split_once(close)?;
        return (!spec.is_empty() && tail.trim().is_empty()).then_some(spec);
    }

    let rest = line
        .strip_prefix("#pragma")?
        .trim_start()
        .strip_prefix("glslify")?
        .trim_start()
        .strip_prefix(':')?
        .trim_start()
        .strip_prefix("import")?
        .trim_start()
        .strip_prefix('(')?
        .trim_start();
    let quote = rest.chars().next().filter(|c| matches!(c, '"' | '\''))?;
    let (spec, tail) = rest[1..].split_once(quote)?;
    (!spec.is_empty() && tail.trim() == ")").then_some(spec)
}

impl Stage for ShaderIncludeStage {
    fn id(&self) -> StageId {
        StageId::ShaderInclude
    }

    fn accepts(&self, kind: AssetKind) -> bool {
        kind == AssetKind::RawText
    }

    fn transform(
        &self,
        input: StageInput<'_>,
        ctx: &StageContext<'_>,
    ) -> Result<TransformResult, TransformError> {
        let mut splicer = Splicer {
            sources: ctx.sources,
            search_dirs: &ctx.config.resolve_dirs,
            stack: vec![input.asset.rel_path.clone()],
            included: Vec::new(),
        };
        let text = splicer.splice(&input.asset.rel_path, input.text()?)?;
        let mut result = TransformResult::new(text.into_bytes(), AssetKind::RawText);
        result.consumed = splicer.included;
        Ok(result)
    }
}

struct Splicer<'a> {
    sources: &'a SourceSet,
    search_dirs: &'a [String],
    stack: Vec<String>,
    included: Vec<String>,
}

impl<'a> Splicer<'a> {
    fn splice(&mut self, path: &str, text: &str) -> Result<String, TransformError> {
        let sources = self.sources;
        let mut out = String::with_capacity(text.len());

        for line in text.split_inclusive('\n') {
            let Some(spec) = include_spec(line) else {
                out.push_str(line);
                continue;
            };

            let target = sources
                .resolve(path, spec, self.search_dirs, |joined| {
                    vec![joined.to_string(), format!("{joined}.glsl")]
                })
                .ok_or_else(|| TransformError::Shader(format!("{path}: cannot resolve {spec:?}")))?;

            if self.stack.contains(&target.rel_path) {
                let mut chain = self.stack.clone();
                chain.push(target.rel_path.clone());
                return Err(TransformError::Shader(format!("include cycle: {}", chain.join(" -> "))));
            }
            if !self.included.contains(&target.rel_path) {
                self.included.push(target.rel_path.clone());
            }

            let body = std::str::from_utf8(&target.content).map_err(|_| TransformError::Encoding)?;
            self.stack.push(target.rel_path.clone());
            let spliced = self.splice(&target.rel_path, body)?;
            self.stack.pop();

            out.push_str(&spliced);
            if line.ends_with('\n') && !spliced.ends_with('\n') {
                out.push('\n');
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;
    use crate::stages::test_support::sources;
    use std::collections::{BTreeMap, HashMap};

    fn run(files: &[(&str, &str)]) -> Result<TransformResult, TransformError> {
        let set = sources(files);
        let config = BuildConfig::default();
        let defines = BTreeMap::new();
        let pre = HashMap::new();
        let ctx = StageContext {
            config: &config,
            sources: &set,
            defines: &defines,
            pre_outputs: &pre,
        };
        let asset = set.get(files[0].0).unwrap();
        ShaderIncludeStage.transform(StageInput { asset, content: &asset.content, kind: asset.kind }, &ctx)
    }

    #[test]
    fn test_include_directive_forms() {
        assert_eq!(include_spec("#include \"common.glsl\"\n"), Some("common.glsl"));
        assert_eq!(include_spec("  #include <lib/noise>"), Some("lib/noise"));
        assert_eq!(include_spec("#pragma glslify: import('./a.glsl')"), Some("./a.glsl"));
        assert_eq!(include_spec("#pragma glslify : import ( \"b\" ) "), Some("b"));
        assert_eq!(include_spec("#include \"a\" trailing"), None);
        assert_eq!(include_spec("#pragma once"), None);
        assert_eq!(include_spec("float x = 1.0;"), None);
    }

    #[test]
    fn test_glslify_pragma_and_nested_include() {
        let out = run(&[
            ("gl/main.frag", "#pragma glslify: import('./noise')\nvoid main() {}"),
            ("gl/noise.glsl", "#include \"lib/hash.glsl\"\nfloat noise();"),
            ("gl/lib/hash.glsl", "float hash();"),
        ])
        .unwrap();
        assert_eq!(
            String::from_utf8(out.content).unwrap(),
            "float hash();\nfloat noise();\nvoid main() {}"
        );
        assert_eq!(out.consumed, vec!["gl/noise.glsl", "gl/lib/hash.glsl"]);
    }

    #[test]
    fn test_include_cycle() {
        let err = run(&[("a.glsl", "#include \"b.glsl\""), ("b.glsl", "#include \"a.glsl\"")]).unwrap_err();
        assert!(err.to_string().contains("include cycle: a.glsl -> b.glsl -> a.glsl"));
    }

    #[test]
    fn test_unresolved_include() {
        let err = run(&[("a.glsl", "#include \"missing.glsl\"\n")]).unwrap_err();
        assert!(err.to_string().contains("cannot resolve"));
    }
}
