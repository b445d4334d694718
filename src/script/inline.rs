//! Raw-module inlining.
//!
//! `import name from "./wave.frag"` is replaced by `var name = <literal>;`
//! when the pre phase turned the imported file into a default-export module.
//! Only top-level imports with a single default binding are candidates. The
//! replacement keeps the statement's line count.

use oxc::allocator::Allocator;
use oxc::ast::ast::{ImportDeclaration, ImportDeclarationSpecifier, Statement};
use oxc::parser::Parser;
use oxc::span::SourceType;

use super::SyntaxError;

/// A module inlined in place of an `import NAME from "..."` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineModule {
    /// Source-relative path of the inlined asset.
    pub path: String,
    /// JavaScript expression bound to the imported name.
    pub expression: String,
}

pub(super) struct Spliced {
    pub code: String,
    pub consumed: Vec<String>,
}

pub(super) fn inline_modules(
    source: &str,
    resolve: &dyn Fn(&str) -> Option<InlineModule>,
) -> Result<Spliced, SyntaxError> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, SourceType::mjs()).parse();
    if let Some(err) = SyntaxError::first(source, &parsed.errors) {
        return Err(err);
    }

    let mut code = String::with_capacity(source.len());
    let mut consumed = Vec::new();
    let mut cursor = 0;
    for statement in &parsed.program.body {
        let Statement::ImportDeclaration(decl) = statement else {
            continue;
        };
        let Some(name) = default_binding(decl) else {
            continue;
        };
        let Some(module) = resolve(decl.source.value.as_str()) else {
            continue;
        };

        let (start, end) = (decl.span.start as usize, decl.span.end as usize);
        code.push_str(&source[cursor..start]);
        code.push_str(&format!("var {name} = {};", module.expression));
        for _ in source[start..end].matches('\n') {
            code.push('\n');
        }
        cursor = end;
        consumed.push(module.path);
    }
    code.push_str(&source[cursor..]);

    Ok(Spliced { code, consumed })
}

fn default_binding(decl: &ImportDeclaration<'_>) -> Option<String> {
    let specifiers = decl.specifiers.as_ref()?;
    match specifiers.as_slice() {
        [ImportDeclarationSpecifier::ImportDefaultSpecifier(default)] => Some(default.local.name.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wave(spec: &str) -> Option<InlineModule> {
        (spec == "./wave.frag").then(|| InlineModule {
            path: "app/wave.frag".to_string(),
            expression: "\"void main(){}\"".to_string(),
        })
    }

    #[test]
    fn test_default_import_replaced() {
        let out = inline_modules("import wave from './wave.frag';\nrender(wave);\n", &wave).unwrap();
        assert_eq!(out.code, "var wave = \"void main(){}\";\nrender(wave);\n");
        assert_eq!(out.consumed, vec!["app/wave.frag"]);
    }

    #[test]
    fn test_line_count_preserved() {
        let src = "import wave\n  from './wave.frag';\nrender(wave);\n";
        let out = inline_modules(src, &wave).unwrap();
        assert_eq!(out.code.lines().count(), src.lines().count());
    }

    #[test]
    fn test_named_and_unresolved_imports_untouched() {
        let src = "import { wave } from './wave.frag';\nimport other from './other.js';\n";
        let out = inline_modules(src, &wave).unwrap();
        assert_eq!(out.code, src);
        assert!(out.consumed.is_empty());
    }
}
