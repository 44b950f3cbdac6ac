use std::path::{Path, PathBuf};

use anyhow::Context;

use super::read_input;
use crate::core::symbols::SymbolTable;
use crate::io::atomic_write;

pub fn main(input: &Path, out: Option<PathBuf>) -> anyhow::Result<i32> {
    let readable = read_input(input)?;
    let cells = SymbolTable::standard().spell(&readable);
    match out {
        Some(path) => atomic_write(&path, cells.as_bytes())
            .with_context(|| format!("writing {}", path.display()))?,
        None => print!("{cells}"),
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::symbols::is_alphabet;

    #[test]
    fn writes_cells_only() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("p.txt");
        let out = dir.path().join("p.cell");
        std::fs::write(&src, "let x = 1\nprint(x)\n").unwrap();
        assert_eq!(main(&src, Some(out.clone())).unwrap(), 0);
        let cells = std::fs::read_to_string(out).unwrap();
        assert!(cells.chars().all(|c| is_alphabet(c) || c.is_whitespace()), "{cells}");
    }
}
