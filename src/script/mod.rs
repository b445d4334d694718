//! Script compilation on the oxc toolchain.
//!
//! `compile` parses a module, splices raw modules in place of their imports,
//! replaces global defines, lowers the syntax to ES2015 and prints the
//! result. `minify` is the production pass run by the optimizer.

mod inline;
mod minify;

pub use inline::InlineModule;
pub use minify::minify;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use oxc::allocator::Allocator;
use oxc::codegen::{CodeGenerator, CodegenOptions};
use oxc::diagnostics::OxcDiagnostic;
use oxc::parser::Parser;
use oxc::semantic::SemanticBuilder;
use oxc::span::SourceType;
use oxc::transformer::{ReplaceGlobalDefines, ReplaceGlobalDefinesConfig, TransformOptions, Transformer};
use thiserror::Error;

/// Syntax level every script is lowered to.
const TARGET: &str = "es2015";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("SyntaxError at {line}:{column}: {message}")]
pub struct SyntaxError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

impl SyntaxError {
    /// Locate the first labelled span of `diagnostic` in `source`.
    /// Diagnostics without a label point at 1:1.
    fn from_diagnostic(source: &str, diagnostic: &OxcDiagnostic) -> Self {
        let offset = diagnostic
            .labels
            .as_ref()
            .and_then(|labels| labels.first())
            .map_or(0, |label| label.offset());
        let (line, column) = line_column(source, offset);
        Self {
            line,
            column,
            message: diagnostic.message.to_string(),
        }
    }

    fn first(source: &str, diagnostics: &[OxcDiagnostic]) -> Option<Self> {
        diagnostics.first().map(|d| Self::from_diagnostic(source, d))
    }
}

/// One-based line and column (in characters) of a byte offset.
fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let before = source.get(..offset.min(source.len())).unwrap_or(source);
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    (line, before[line_start..].chars().count() + 1)
}

pub struct CompileOptions<'a> {
    pub defines: &'a BTreeMap<String, String>,
    pub resolve: &'a dyn Fn(&str) -> Option<InlineModule>,
    pub source_map: bool,
}

#[derive(Debug, Clone)]
pub struct CompiledScript {
    pub code: String,
    /// Version 3 source map JSON, when requested.
    pub source_map: Option<String>,
    /// Modules inlined into `code`.
    pub inlined: Vec<String>,
}

/// Check and down-level the module at `path`.
pub fn compile(path: &str, source: &str, options: &CompileOptions<'_>) -> Result<CompiledScript, SyntaxError> {
    let spliced = inline::inline_modules(source, options.resolve)?;
    let source = spliced.code.as_str();

    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, SourceType::mjs()).parse();
    if let Some(err) = SyntaxError::first(source, &parsed.errors) {
        return Err(err);
    }
    let mut program = parsed.program;

    let (symbols, scopes) = SemanticBuilder::new()
        .build(&program)
        .semantic
        .into_symbol_table_and_scope_tree();

    let defines: Vec<(&str, &str)> = options
        .defines
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    let define_config = ReplaceGlobalDefinesConfig::new(&defines).map_err(|errors| SyntaxError {
        line: 0,
        column: 0,
        message: format!(
            "invalid define: {}",
            errors.first().map(|e| e.message.to_string()).unwrap_or_default()
        ),
    })?;
    let replaced = ReplaceGlobalDefines::new(&allocator, define_config).build(symbols, scopes, &mut program);

    let transform_options = TransformOptions::from_target(TARGET).map_err(|message| SyntaxError {
        line: 0,
        column: 0,
        message,
    })?;
    let transformed = Transformer::new(&allocator, Path::new(path), &transform_options)
        .build_with_symbols_and_scopes(replaced.symbols, replaced.scopes, &mut program);
    if let Some(err) = SyntaxError::first(source, &transformed.errors) {
        return Err(err);
    }

    let printed = CodeGenerator::new()
        .with_options(CodegenOptions {
            source_map_path: options.source_map.then(|| PathBuf::from(path)),
            ..CodegenOptions::default()
        })
        .build(&program);

    Ok(CompiledScript {
        code: printed.code,
        source_map: printed.map.map(|map| map.to_json_string()),
        inlined: spliced.consumed,
    })
}
