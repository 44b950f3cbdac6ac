use std::path::Path;

use super::read_input;
use crate::config::Config;
use crate::core::diagnostics;
use crate::core::lexer::LexerOptions;
use crate::core::pipeline::tokenize_source;

pub fn main(input: &Path, cfg: &Config, pretty: bool) -> anyhow::Result<i32> {
    let source = read_input(input)?;
    let options = LexerOptions {
        lenient_literals: cfg.interpreter.lenient_literals,
    };
    match tokenize_source(&source, options) {
        Ok(tokens) => {
            for token in &tokens {
                println!("{}", token);
            }
            Ok(0)
        }
        Err(e) => {
            diagnostics::report(&input.display().to_string(), &source, &e, pretty);
            Ok(1)
        }
    }
}
