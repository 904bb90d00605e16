//! Ollama backend (`/api/generate`, non-streaming).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::config::{generate_endpoint, ConfigError, OllamaConfig};
use crate::extract::truncate;
use crate::provider::{GenerationError, LLMProvider, RequestContext};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for a local Ollama server.
///
/// Holds only read-only settings and a pooled HTTP client, so one instance can
/// serve concurrent callers.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    endpoint: Url,
    model: String,
    timeout: Duration,
    temperature: f32,
    max_tokens: u32,
}

impl OllamaProvider {
    pub fn new(config: &OllamaConfig) -> Result<Self, ConfigError> {
        let endpoint = generate_endpoint(&config.server_url)?;
        let client = Client::builder()
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            timeout: config.timeout,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, prompt: &str) -> Result<String, GenerationError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                GenerationError::Network(format!(
                    "failed to reach ollama at {} (is it running?): {e}",
                    self.endpoint
                ))
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Http {
                status: status.as_u16(),
                body: truncate(text.trim(), 200),
            });
        }

        let out: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| GenerationError::InvalidResponse(format!("ollama returned invalid JSON: {e}")))?;
        Ok(out.response)
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    async fn generate(&self, ctx: &RequestContext, prompt: &str) -> Result<String, GenerationError> {
        let started = tokio::time::Instant::now();
        let out = ctx.run_bounded(self.timeout, self.send(prompt)).await;
        debug!(
            model = %self.model,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = out.is_ok(),
            "ollama generate finished"
        );
        out
    }
}
