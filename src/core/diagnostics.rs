// src/core/diagnostics.rs
//! Pretty, colored, file+line diagnostics.

use colored::Colorize;

use crate::core::error::Error;

pub struct Span {
    pub line: usize,
    pub col: usize,
    pub len: usize, // underline length (use 1 if unknown)
}

impl Span {
    pub fn single(line: usize, col: usize) -> Self {
        Self { line, col, len: 1 }
    }
}

/// Renders the error block as a string (no trailing blank line).
pub fn render_error(filename: &str, source: &str, title: &str, span: &Span) -> String {
    let (ln, col) = (span.line, span.col);
    let line_text = nth_line(source, ln).unwrap_or_default();
    let ln_str = format!("{:>4}", ln);
    // Cells are one char each but may be wider on screen; underline by char.
    let underline = " ".repeat(col.saturating_sub(1)) + &"^".repeat(span.len.max(1));

    let mut out = String::new();
    out.push_str(&format!("{} {}\n", "error:".bright_red().bold(), title.bright_white()));
    out.push_str(&format!(
        "{} {}\n",
        "-->".bright_blue(),
        format!("{}:{}:{}", filename, ln, col).bright_white()
    ));
    out.push_str(&format!(" {} {}\n", " ".repeat(ln_str.len()).dimmed(), "|".dimmed()));
    out.push_str(&format!("{} {} {}\n", ln_str.dimmed(), "|".dimmed(), line_text));
    out.push_str(&format!(
        " {} {} {}",
        " ".repeat(ln_str.len()).dimmed(),
        "|".dimmed(),
        underline.bright_red()
    ));
    out
}

pub fn print_error(filename: &str, source: &str, title: &str, span: Span) {
    eprintln!("{}", render_error(filename, source, title, &span));
    eprintln!();
}

/// Prints any pipeline error: with the source excerpt when `pretty` and a
/// position is known, else as a single line.
pub fn report(filename: &str, source: &str, err: &Error, pretty: bool) {
    match (pretty, err.position()) {
        (true, Some((line, col))) => {
            print_error(filename, source, &err.title(), Span::single(line, col))
        }
        _ => match err.position() {
            Some((line, col)) => eprintln!(
                "{} {} ({}:{}:{})",
                "error:".bright_red(),
                err.title(),
                filename,
                line,
                col
            ),
            None => eprintln!("{} {}", "error:".bright_red(), err.title()),
        },
    }
}

fn nth_line(src: &str, n: usize) -> Option<String> {
    src.lines().nth(n.saturating_sub(1)).map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_points_at_column() {
        colored::control::set_override(false);
        let out = render_error("f.cell", "one\ntwo three", "boom", &Span::single(2, 5));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "error: boom");
        assert_eq!(lines[1], "--> f.cell:2:5");
        assert_eq!(lines[3], "   2 | two three");
        assert!(lines[4].ends_with("|     ^"), "{:?}", lines[4]);
    }
}
