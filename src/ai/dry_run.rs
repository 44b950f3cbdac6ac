use anyhow::Result;
use sha2::{Digest, Sha256};

use super::InferenceBackend;

const PROMPT_PREVIEW_CHARS: usize = 48;
const EMBEDDING_DIMS: usize = 8;

/// Offline backend: answers are pure functions of the input.
pub struct DryRun {
    model: String,
    max_tokens: u32,
}

impl Default for DryRun {
    fn default() -> Self {
        Self::new("gpt-4o-mini", 256)
    }
}

impl DryRun {
    pub fn new(model: &str, max_tokens: u32) -> Self {
        Self {
            model: model.to_string(),
            max_tokens,
        }
    }
}

impl InferenceBackend for DryRun {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    fn default_max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn infer(&self, prompt: &str, model: &str, _max_tokens: u32) -> Result<String> {
        let preview: String = prompt.chars().take(PROMPT_PREVIEW_CHARS).collect();
        let ellipsis = if prompt.chars().count() > PROMPT_PREVIEW_CHARS { "…" } else { "" };
        Ok(format!("[dry-run:{model}] {preview}{ellipsis}"))
    }

    /// Unit-length vector seeded from the text's SHA-256.
    fn embed(&self, text: &str) -> Result<Vec<f64>> {
        let digest = Sha256::digest(text.as_bytes());
        let raw: Vec<f64> = digest
            .chunks(32 / EMBEDDING_DIMS)
            .map(|chunk| {
                let word = chunk.iter().fold(0u32, |acc, b| (acc << 8) | *b as u32);
                word as f64 / u32::MAX as f64 - 0.5
            })
            .collect();
        let norm = raw.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm == 0.0 {
            return Ok(raw);
        }
        Ok(raw.into_iter().map(|x| x / norm).collect())
    }
}
