use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use tracing::debug;

use super::{BackendConfig, InferenceBackend};

/// Any endpoint speaking the OpenAI chat-completions and embeddings API.
pub struct OpenAiCompatible {
    endpoint: String,
    model: String,
    embedding_model: String,
    api_key: String,
    max_tokens: u32,
    client: reqwest::blocking::Client,
}

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(serde::Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(serde::Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<Choice>,
}
#[derive(serde::Deserialize, Debug)]
struct Choice { message: ChoiceMessage }
#[derive(serde::Deserialize, Debug)]
struct ChoiceMessage { content: String }

#[derive(serde::Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(serde::Deserialize, Debug)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}
#[derive(serde::Deserialize, Debug)]
struct EmbeddingData { embedding: Vec<f64> }

impl OpenAiCompatible {
    pub fn from_config(cfg: &BackendConfig) -> Result<Self> {
        let api_key = std::env::var(&cfg.api_key_env)
            .map_err(|_| anyhow!("{} not set in environment", cfg.api_key_env))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("building http client")?;
        Ok(Self {
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            embedding_model: cfg.embedding_model.clone(),
            api_key,
            max_tokens: cfg.max_tokens,
            client,
        })
    }

    fn post<T: serde::Serialize, R: serde::de::DeserializeOwned>(&self, path: &str, body: &T) -> Result<R> {
        let url = format!("{}/{}", self.endpoint, path);
        debug!(%url, "backend request");
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().unwrap_or_default();
            bail!("backend http error {status}: {text}");
        }
        Ok(resp.json()?)
    }
}

impl InferenceBackend for OpenAiCompatible {
    fn name(&self) -> &'static str { "openai" }

    fn default_model(&self) -> &str { &self.model }

    fn default_max_tokens(&self) -> u32 { self.max_tokens }

    fn infer(&self, prompt: &str, model: &str, max_tokens: u32) -> Result<String> {
        let trimmed = prompt.trim();
        if trimmed.is_empty() { bail!("empty prompt"); }
        let req = ChatRequest {
            model,
            messages: vec![ChatMessage { role: "user", content: trimmed }],
            max_tokens,
        };
        let cr: ChatResponse = self.post("chat/completions", &req)?;
        cr.choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| anyhow!("empty response"))
    }

    fn embed(&self, text: &str) -> Result<Vec<f64>> {
        let req = EmbeddingRequest { model: &self.embedding_model, input: text };
        let er: EmbeddingResponse = self.post("embeddings", &req)?;
        er.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow!("empty embedding response"))
    }
}
