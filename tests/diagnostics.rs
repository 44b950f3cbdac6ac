use std::fs;
use std::process::{Command, Output};

use cellscript::core::symbols::{encode, SymbolTable};

fn bin() -> String {
    env!("CARGO_BIN_EXE_cellscript").to_string()
}

fn run_file(name: &str, source: &str, pretty: bool) -> (Output, String) {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join(name);
    fs::write(&input, source).unwrap();

    let mut cmd = Command::new(bin());
    cmd.env("NO_COLOR", "1").arg("run").arg(&input);
    if pretty {
        cmd.arg("--pretty-errors");
    }
    let output = cmd.output().expect("run");
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    (output, stderr)
}

#[test]
fn pretty_lexer_error_shows_span() {
    let table = SymbolTable::standard();
    // missing closing delimiter
    let mut bad = table.spell("let x = ");
    bad.push(table.string_delimiter);
    bad.push_str(&encode("unterminated"));

    let (output, err) = run_file("bad_lexer.cell", &bad, true);
    assert_eq!(output.status.code(), Some(1));
    assert!(err.contains("error:"), "no 'error:' in stderr\n{err}");
    assert!(err.contains("Unterminated string"), "no message in stderr\n{err}");
    assert!(err.contains("bad_lexer.cell:1:"), "no file:line:col in stderr\n{err}");
    assert!(err.contains('^'), "no caret in stderr\n{err}");
}

#[test]
fn pretty_parser_error_shows_span() {
    let bad = SymbolTable::standard().spell("let x = 1\nlet = 2");

    let (output, err) = run_file("bad_parser.cell", &bad, true);
    assert_eq!(output.status.code(), Some(1));
    assert!(err.contains("syntax error:"), "parser message missing\n{err}");
    assert!(err.contains("bad_parser.cell:2:"), "no file:line:col in stderr\n{err}");
}

#[test]
fn plain_runtime_error_is_one_line() {
    let bad = SymbolTable::standard().spell("print(1)\nprint(missing)");

    let (output, err) = run_file("bad_runtime.cell", &bad, false);
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "1");
    let line = err
        .lines()
        .find(|l| l.starts_with("error:"))
        .unwrap_or_else(|| panic!("no error line in stderr\n{err}"));
    assert!(line.contains("UnboundName"), "{line}");
    assert!(line.contains("bad_runtime.cell:2:"), "{line}");
}
