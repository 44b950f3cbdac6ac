//! Inference backends for the AI primitives.
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

pub mod dry_run;
#[cfg(feature = "ai-openai")]
pub mod openai;

pub use dry_run::DryRun;

pub trait InferenceBackend: Send + Sync {
    fn name(&self) -> &'static str;
    /// Model used when a call does not name one.
    fn default_model(&self) -> &str;
    fn default_max_tokens(&self) -> u32;
    fn infer(&self, prompt: &str, model: &str, max_tokens: u32) -> Result<String>;
    fn embed(&self, text: &str) -> Result<Vec<f64>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    #[default]
    DryRun,
    Openai,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub endpoint: String,
    pub model: String,
    pub embedding_model: String,
    /// Environment variable holding the bearer token.
    pub api_key_env: String,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::DryRun,
            endpoint: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            embedding_model: "text-embedding-3-small".into(),
            api_key_env: "CELLSCRIPT_API_KEY".into(),
            max_tokens: 256,
            timeout_secs: 45,
        }
    }
}

pub fn from_config(cfg: &BackendConfig) -> Result<Arc<dyn InferenceBackend>> {
    match cfg.kind {
        BackendKind::DryRun => Ok(Arc::new(DryRun::new(&cfg.model, cfg.max_tokens))),
        #[cfg(feature = "ai-openai")]
        BackendKind::Openai => Ok(Arc::new(openai::OpenAiCompatible::from_config(cfg)?)),
        #[cfg(not(feature = "ai-openai"))]
        BackendKind::Openai => anyhow::bail!(
            "backend 'openai' requires building with the `ai-openai` feature"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_dry_run() {
        let backend = from_config(&BackendConfig::default()).unwrap();
        assert_eq!(backend.name(), "dry-run");
        assert_eq!(backend.default_model(), "gpt-4o-mini");
    }

    #[test]
    fn kind_parses_from_toml() {
        let cfg: BackendConfig = toml::from_str("kind = \"openai\"\nmodel = \"m\"").unwrap();
        assert_eq!(cfg.kind, BackendKind::Openai);
        assert_eq!(cfg.max_tokens, 256);
    }
}
