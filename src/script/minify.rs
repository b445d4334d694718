use oxc::allocator::Allocator;
use oxc::codegen::{CodeGenerator, CodegenOptions};
use oxc::minifier::{Minifier, MinifierOptions};
use oxc::parser::Parser;
use oxc::span::SourceType;

use super::SyntaxError;

/// Compress (constant folding, dead-branch removal), shorten local names and
/// print without whitespace. Top-level names are kept.
pub fn minify(code: &str) -> Result<String, SyntaxError> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, code, SourceType::mjs()).parse();
    if let Some(err) = SyntaxError::first(code, &parsed.errors) {
        return Err(err);
    }
    let mut program = parsed.program;

    let options = MinifierOptions {
        mangle: true,
        ..MinifierOptions::default()
    };
    let minified = Minifier::new(options).build(&allocator, &mut program);

    Ok(CodeGenerator::new()
        .with_options(CodegenOptions {
            minify: true,
            ..CodegenOptions::default()
        })
        .with_mangler(minified.mangler)
        .build(&program)
        .code)
}
