use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::info;

use super::read_input;
use crate::ai;
use crate::config::Config;
use crate::core::diagnostics;
use crate::core::interpreter::Interpreter;
use crate::io::atomic_write;
use crate::sal::Sal;

#[derive(Debug, Default, Clone)]
pub struct RunOpts {
    pub report: Option<PathBuf>,
    pub cache: Option<PathBuf>,
    pub export: Option<PathBuf>,
    pub trace: bool,
}

/// Interprets `input` and prints its output. Returns the process exit code:
/// 0 on success (including `halt`), 1 when the program failed.
pub fn main_with_opts(input: &Path, opts: &RunOpts, cfg: &Config, pretty: bool) -> anyhow::Result<i32> {
    let source = read_input(input)?;
    let sal = Sal::new(cfg.sal.clone());
    if let Some(bundle) = &opts.cache {
        let n = sal
            .import_from(bundle)
            .with_context(|| format!("importing {}", bundle.display()))?;
        info!(entries = n, bundle = %bundle.display(), "replay bundle imported");
    }
    let backend = ai::from_config(&cfg.backend)?;
    let mut interp = Interpreter::with_parts(cfg.interpreter.clone(), sal.clone(), backend);

    let code = match interp.run_source(&source) {
        Ok(exec) => {
            for line in &exec.output_lines {
                println!("{line}");
            }
            info!(halted = exec.halted, stats = ?exec.stats, "run finished");
            0
        }
        Err(e) => {
            for line in interp.output() {
                println!("{line}");
            }
            diagnostics::report(&input.display().to_string(), &source, &e, pretty);
            1
        }
    };

    if opts.trace {
        eprint!("{}", sal.trace_log());
    }
    if let Some(path) = &opts.report {
        let text = serde_json::to_string_pretty(&sal.report())?;
        atomic_write(path, text.as_bytes())
            .with_context(|| format!("writing report {}", path.display()))?;
    }
    if let Some(path) = &opts.export {
        sal.export_to(path)
            .with_context(|| format!("exporting bundle {}", path.display()))?;
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::symbols::SymbolTable;

    #[test]
    fn export_then_replay_round_trips_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("p.cell");
        std::fs::write(&program, SymbolTable::standard().spell("print(infer(\"hello\"))")).unwrap();
        let bundle = dir.path().join("bundle.json");
        let report = dir.path().join("report.json");
        let cfg = Config::default();

        let first = RunOpts {
            export: Some(bundle.clone()),
            ..RunOpts::default()
        };
        assert_eq!(main_with_opts(&program, &first, &cfg, false).unwrap(), 0);
        assert!(bundle.exists());

        let second = RunOpts {
            cache: Some(bundle),
            report: Some(report.clone()),
            ..RunOpts::default()
        };
        assert_eq!(main_with_opts(&program, &second, &cfg, false).unwrap(), 0);
        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(report).unwrap()).unwrap();
        assert_eq!(json["stats"]["cache_hits"], 1);
    }

    #[test]
    fn runtime_failure_exits_one() {
        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("bad.cell");
        std::fs::write(&program, SymbolTable::standard().spell("print(nope)")).unwrap();
        let code = main_with_opts(&program, &RunOpts::default(), &Config::default(), true).unwrap();
        assert_eq!(code, 1);
    }
}
