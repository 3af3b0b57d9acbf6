//! Text-generation backend.
//!
//! The [`GenerationClient`] trait decouples the stage agents from the actual
//! backend (currently a local Ollama server). Tests use scripted clients that
//! return predetermined text without any network access.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Stateless, shareable text generation.
pub trait GenerationClient: Send + Sync {
    /// Generate text for `prompt` under `system` with `model`.
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String>;
}

impl<T: GenerationClient + ?Sized> GenerationClient for &T {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String> {
        (**self).generate(model, prompt, system)
    }
}

impl<T: GenerationClient + ?Sized> GenerationClient for std::sync::Arc<T> {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String> {
        (**self).generate(model, prompt, system)
    }
}

/// Enumerates the models a backend can serve.
pub trait ModelCatalog: Send + Sync {
    fn list_models(&self) -> Result<Vec<ModelInfo>>;
}

/// A model offered by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified_at: Option<String>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

/// [`GenerationClient`] for the Ollama HTTP API.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
}

impl OllamaClient {
    /// `timeout` bounds each whole request, including generation time.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("build ollama http client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl ModelCatalog for OllamaClient {
    /// List locally available models.
    #[instrument(skip_all)]
    fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("request {url}"))?;
        let body = read_success_body(response, "list models")?;
        let tags: TagsResponse = serde_json::from_str(&body).context("parse ollama tags")?;
        debug!(count = tags.models.len(), "listed models");
        Ok(tags.models)
    }
}

impl GenerationClient for OllamaClient {
    #[instrument(skip_all, fields(model = %model, prompt_bytes = prompt.len()))]
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model,
            prompt,
            system,
            stream: false,
        };
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .with_context(|| format!("request {url}"))?;
        let body = read_success_body(response, "generate")?;
        let text = parse_generate_body(&body)?;
        debug!(response_bytes = text.len(), "generation finished");
        Ok(text)
    }
}

fn read_success_body(response: reqwest::blocking::Response, action: &str) -> Result<String> {
    let status = response.status();
    let body = response
        .text()
        .with_context(|| format!("read ollama {action} response"))?;
    if !status.is_success() {
        let detail = serde_json::from_str::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        warn!(%status, action, "ollama request failed");
        return Err(anyhow!("ollama {action} returned {status}: {}", detail.trim()));
    }
    Ok(body)
}

fn parse_generate_body(body: &str) -> Result<String> {
    let parsed: GenerateResponse =
        serde_json::from_str(body).context("parse ollama generate response")?;
    Ok(parsed.response)
}
