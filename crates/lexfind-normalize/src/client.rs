//! The seam to the external generative model.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use lexfind_core::config::ProviderSettings;

use crate::error::NormalizeError;

#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Send one prompt, return the model's text output.
    async fn generate(&self, prompt: &str) -> Result<String, NormalizeError>;
}

/// Google `generateContent` over reqwest, asking for a JSON response body.
pub struct GeminiClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

impl GeminiClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self, NormalizeError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| NormalizeError::Transport(e.to_string()))?;
        Ok(Self { http, endpoint: endpoint.into(), model: model.into(), api_key, timeout })
    }

    /// The API key is read from the environment variable the provider names.
    pub fn from_settings(provider: &ProviderSettings, timeout: Duration) -> Result<Self, NormalizeError> {
        let api_key = std::env::var(&provider.api_key_env).ok().filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            tracing::warn!(provider = %provider.name, env = %provider.api_key_env, "no API key configured");
        }
        Self::new(provider.endpoint.clone(), provider.model.clone(), api_key, timeout)
    }

    fn request_error(&self, e: reqwest::Error) -> NormalizeError {
        if e.is_timeout() {
            NormalizeError::Timeout(u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX))
        } else {
            NormalizeError::Transport(e.to_string())
        }
    }

    fn url(&self) -> String { format!("{}/models/{}:generateContent", self.endpoint.trim_end_matches('/'), self.model) }
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, NormalizeError> {
        let api_key = self.api_key.as_deref().ok_or(NormalizeError::Unauthorized)?;
        let body = GenerateRequest {
            contents: vec![Content { role: "user", parts: vec![Part { text: prompt }] }],
            generation_config: GenerationConfig { response_mime_type: "application/json", temperature: 0.0 },
        };
        let response = self
            .http
            .post(self.url())
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        match status.as_u16() {
            429 => return Err(NormalizeError::RateLimited),
            401 | 403 => return Err(NormalizeError::Unauthorized),
            _ if !status.is_success() => return Err(NormalizeError::Provider { status: status.as_u16() }),
            _ => {}
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            if e.is_decode() { NormalizeError::Malformed(e.to_string()) } else { self.request_error(e) }
        })?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(NormalizeError::Malformed("empty candidate".to_string()));
        }
        Ok(text)
    }
}
