use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ai::BackendConfig;
use crate::core::interpreter::InterpreterOptions;
use crate::sal::SalConfig;

/// Everything `cellscript.toml` can set. Missing sections take defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub interpreter: InterpreterOptions,
    pub sal: SalConfig,
    pub backend: BackendConfig,
}

pub fn default_config_path() -> Option<PathBuf> {
    // ~/.cellscript/config.toml
    dirs_next::home_dir().map(|h| h.join(".cellscript").join("config.toml"))
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("parsing config")
    }

    /// An explicit `--config` file must exist; the default path is optional.
    pub fn load(cli_path: &Option<PathBuf>) -> Result<Self> {
        match cli_path {
            Some(p) => Self::load_file(p),
            None => match default_config_path() {
                Some(p) if p.is_file() => Self::load_file(&p),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::BackendKind;

    #[test]
    fn sections_are_optional() {
        let cfg = Config::from_toml("[sal]\ncache_ttl_secs = 60\n").unwrap();
        assert_eq!(cfg.sal.cache_ttl_secs, Some(60));
        assert!(cfg.sal.cache_enabled);
        assert_eq!(cfg.interpreter.max_loop_iterations, 100_000);
        assert_eq!(cfg.backend.kind, BackendKind::DryRun);
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = Some(dir.path().join("nope.toml"));
        assert!(Config::load(&missing).is_err());
    }

    #[test]
    fn loads_interpreter_section() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.toml");
        std::fs::write(&path, "[interpreter]\nmax_loop_iterations = 5\ntrace_deterministic = true\n").unwrap();
        let cfg = Config::load(&Some(path)).unwrap();
        assert_eq!(cfg.interpreter.max_loop_iterations, 5);
        assert!(cfg.interpreter.trace_deterministic);
        assert_eq!(cfg.interpreter.max_call_depth, 200);
    }
}
