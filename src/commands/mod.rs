pub mod ast;
pub mod compile;
pub mod encode;
pub mod run;
pub mod spell;
pub mod tokens;

use std::path::Path;

use anyhow::Context;

pub(crate) fn read_input(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}
