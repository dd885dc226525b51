use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::warn;

use paintquote_core::config::{LlmConfig, LlmProvider};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 256;
const RETRY_BASE_DELAY_MS: u64 = 250;

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}

/// Chat-completion client for the hosted and local providers we support.
pub struct HttpLlmClient {
    provider: LlmProvider,
    base_url: String,
    model: String,
    api_key: Option<SecretString>,
    max_retries: u32,
    client: reqwest::Client,
}

impl HttpLlmClient {
    /// Returns `None` when the provider is disabled.
    pub fn from_config(config: &LlmConfig) -> Result<Option<Self>> {
        if config.provider == LlmProvider::Disabled {
            return Ok(None);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("failed to build llm http client")?;
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| default_base_url(config.provider).to_owned())
            .trim_end_matches('/')
            .to_owned();

        Ok(Some(Self {
            provider: config.provider,
            base_url,
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries,
            client,
        }))
    }

    async fn send_once(&self, path: &str, body: &Value) -> Result<Value, Attempt> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.client.post(&url).json(body);
        match (self.provider, &self.api_key) {
            (LlmProvider::OpenAi, Some(key)) => {
                request = request.bearer_auth(key.expose_secret());
            }
            (LlmProvider::Anthropic, Some(key)) => {
                request = request
                    .header("x-api-key", key.expose_secret())
                    .header("anthropic-version", ANTHROPIC_VERSION);
            }
            _ => {}
        }

        let response = request.send().await.map_err(|e| Attempt::Retry(anyhow!(e)))?;
        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(Attempt::Retry(anyhow!("llm provider returned {status}")));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Attempt::Fatal(anyhow!("llm provider returned {status}: {text}")));
        }

        response.json::<Value>().await.map_err(|e| Attempt::Fatal(anyhow!(e)))
    }
}

enum Attempt {
    Retry(anyhow::Error),
    Fatal(anyhow::Error),
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        let (path, body) = build_request(self.provider, &self.model, system, prompt)?;

        let mut attempt = 0;
        loop {
            match self.send_once(path, &body).await {
                Ok(payload) => return parse_completion(self.provider, &payload),
                Err(Attempt::Fatal(error)) => return Err(error),
                Err(Attempt::Retry(error)) if attempt >= self.max_retries => return Err(error),
                Err(Attempt::Retry(error)) => {
                    attempt += 1;
                    warn!(
                        event_name = "llm.request.retry",
                        provider = ?self.provider,
                        attempt,
                        error = %error,
                        "llm request failed; retrying"
                    );
                    let backoff = RETRY_BASE_DELAY_MS.saturating_mul(1 << attempt.min(6));
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
            }
        }
    }
}

pub fn default_base_url(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "https://api.openai.com/v1",
        LlmProvider::Anthropic => "https://api.anthropic.com",
        LlmProvider::Ollama | LlmProvider::Disabled => "http://localhost:11434",
    }
}

/// Request path (relative to the base url) and JSON body for one completion.
pub fn build_request(
    provider: LlmProvider,
    model: &str,
    system: &str,
    prompt: &str,
) -> Result<(&'static str, Value)> {
    match provider {
        LlmProvider::OpenAi => Ok((
            "/chat/completions",
            json!({
                "model": model,
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": prompt },
                ],
                "max_tokens": MAX_OUTPUT_TOKENS,
            }),
        )),
        LlmProvider::Anthropic => Ok((
            "/v1/messages",
            json!({
                "model": model,
                "system": system,
                "messages": [{ "role": "user", "content": prompt }],
                "max_tokens": MAX_OUTPUT_TOKENS,
            }),
        )),
        LlmProvider::Ollama => Ok((
            "/api/chat",
            json!({
                "model": model,
                "messages": [
                    { "role": "system", "content": system },
                    { "role": "user", "content": prompt },
                ],
                "stream": false,
            }),
        )),
        LlmProvider::Disabled => bail!("llm provider is disabled"),
    }
}

pub fn parse_completion(provider: LlmProvider, payload: &Value) -> Result<String> {
    let text = match provider {
        LlmProvider::OpenAi => payload
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.pointer("/message/content"))
            .and_then(Value::as_str)
            .map(str::to_owned),
        LlmProvider::Anthropic => payload.get("content").and_then(Value::as_array).map(|blocks| {
            blocks
                .iter()
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("")
        }),
        LlmProvider::Ollama => {
            payload.pointer("/message/content").and_then(Value::as_str).map(str::to_owned)
        }
        LlmProvider::Disabled => None,
    };

    match text.map(|text| text.trim().to_owned()) {
        Some(text) if !text.is_empty() => Ok(text),
        _ => bail!("llm response carried no text content"),
    }
}
