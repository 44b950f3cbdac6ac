use std::path::{Path, PathBuf};

use colored::Colorize;

use crate::config::Config;
use crate::core::compiler::CompilerOptions;
use crate::core::diagnostics;
use crate::core::lexer::LexerOptions;
use crate::core::pipeline::compile_file;

pub fn default_output(input: &Path) -> PathBuf {
    input.with_extension("js")
}

pub fn main_with_opts(input: &Path, out: Option<PathBuf>, cfg: &Config, pretty: bool) -> anyhow::Result<i32> {
    let out = out.unwrap_or_else(|| default_output(input));
    let lexer = LexerOptions {
        lenient_literals: cfg.interpreter.lenient_literals,
    };
    let options = CompilerOptions {
        max_loop_iterations: cfg.interpreter.max_loop_iterations,
        ..CompilerOptions::default()
    };
    match compile_file(input, &out, lexer, options)? {
        Ok(()) => {
            println!("{} wrote {}", "compiled:".bright_green().bold(), out.display());
            Ok(0)
        }
        Err((source, e)) => {
            diagnostics::report(&input.display().to_string(), &source, &e, pretty);
            Ok(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_defaults_next_to_input() {
        assert_eq!(default_output(Path::new("dir/demo.cell")), PathBuf::from("dir/demo.js"));
    }
}
