// src/core/pipeline.rs
//! Source → tokens → AST → {interpreter, JS} stages with one error type.

use std::path::Path;

use anyhow::Context;
use tracing::{debug, info};

use crate::core::ast::AstNode;
use crate::core::compiler::{Compiler, CompilerOptions};
use crate::core::error::Error;
use crate::core::lexer::{Lexer, LexerOptions};
use crate::core::parser::parse;
use crate::core::token::Token;
use crate::io::atomic_write;

/// One-line description of the input, logged before compiling.
pub fn summarize(code: &str) -> String {
    let lines = code.lines().count();
    let chars = code.chars().count();
    format!("{} lines, {} characters", lines, chars)
}

pub fn tokenize_source(source: &str, options: LexerOptions) -> Result<Vec<Token>, Error> {
    let tokens = Lexer::with_options(source, options).tokenize()?;
    debug!(count = tokens.len(), "tokenized");
    Ok(tokens)
}

pub fn parse_source(source: &str, options: LexerOptions) -> Result<AstNode, Error> {
    let tokens = tokenize_source(source, options)?;
    let ast = parse(tokens)?;
    debug!("parsed");
    Ok(ast)
}

pub fn compile_source(
    source: &str,
    lexer: LexerOptions,
    options: CompilerOptions,
) -> Result<String, Error> {
    let ast = parse_source(source, lexer)?;
    Ok(Compiler::with_options(options).compile(&ast))
}

/// Reads `input`, compiles it and writes the JS atomically to `output`.
/// Pipeline errors come back in the inner result so the caller can render
/// them against the source.
pub fn compile_file(
    input: &Path,
    output: &Path,
    lexer: LexerOptions,
    options: CompilerOptions,
) -> anyhow::Result<Result<(), (String, Error)>> {
    let source = std::fs::read_to_string(input)
        .with_context(|| format!("reading {}", input.display()))?;
    info!(input = %input.display(), summary = %summarize(&source), "compiling");
    let js = match compile_source(&source, lexer, options) {
        Ok(js) => js,
        Err(e) => return Ok(Err((source, e))),
    };
    atomic_write(output, js.as_bytes())
        .with_context(|| format!("writing {}", output.display()))?;
    Ok(Ok(()))
}
