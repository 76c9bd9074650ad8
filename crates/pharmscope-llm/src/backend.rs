//! AI text-model trait and concrete implementations.
//!
//! Backends:
//!   GeminiModel       — Google Gemini API (gemini-2.0-flash, 1.5-pro, …)
//!   OpenAiCompatModel — any OpenAI-compatible endpoint (OpenAI itself,
//!                       Groq, TogetherAI, OpenRouter, vLLM, …)
//!
//! Both backends log a call audit entry per completed generation
//! (see `audit`).

use async_trait::async_trait;
use pharmscope_common::retry::Transient;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audit;

// ── Error ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum AiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rate limited by AI backend (retry-after: {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("authentication rejected: {0}")]
    Auth(String),
    #[error("API error [{status}]: {message}")]
    Api { status: u16, message: String },
    #[error("malformed model response: {0}")]
    Malformed(String),
}

impl Transient for AiError {
    /// Network trouble, rate limits and server-side errors are worth a
    /// retry. Auth rejections and malformed payloads are not: the same
    /// request would fail the same way.
    fn is_transient(&self) -> bool {
        match self {
            AiError::Http(_) | AiError::RateLimited { .. } => true,
            AiError::Api { status, .. } => *status >= 500,
            AiError::Auth(_) | AiError::Malformed(_) => false,
        }
    }

    fn retry_after_secs(&self) -> Option<u64> {
        match self {
            AiError::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }
}

// ── Request options ───────────────────────────────────────────────────────────

/// Generation parameters, read once from configuration at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_output_tokens: 1024,
        }
    }
}

// ── Trait ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait TextModel: Send + Sync {
    /// Single-prompt text generation.
    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<String, AiError>;
    fn model_id(&self) -> &str;
}

// ── Helper: map non-2xx responses to AiError ──────────────────────────────────

async fn check_status(resp: reqwest::Response) -> Result<serde_json::Value, AiError> {
    let status = resp.status().as_u16();
    let retry_after = resp
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let body: serde_json::Value = resp.json().await?;
    if status >= 400 {
        let message = body["error"]["message"]
            .as_str()
            .or_else(|| body["message"].as_str())
            .unwrap_or("unknown API error")
            .to_string();
        return Err(match status {
            401 | 403 => AiError::Auth(message),
            429 => AiError::RateLimited {
                retry_after_secs: retry_after,
            },
            _ => AiError::Api { status, message },
        });
    }
    Ok(body)
}

// ── 1. Google Gemini ──────────────────────────────────────────────────────────

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiModel {
    pub model: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiModel {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl TextModel for GeminiModel {
    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<String, AiError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url.trim_end_matches('/'),
            self.model,
            self.api_key
        );
        let body = serde_json::json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "maxOutputTokens": opts.max_output_tokens,
                "temperature":     opts.temperature,
            }
        });

        let started = std::time::Instant::now();
        let resp = self.client.post(&url).json(&body).send().await?;
        let json = check_status(resp).await?;

        let text = json["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or("")
            .to_string();
        if text.trim().is_empty() {
            return Err(AiError::Malformed("empty candidate text".to_string()));
        }

        audit::record("gemini", &self.model, prompt, &text, started.elapsed());
        Ok(text)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// ── 2. OpenAI-compatible ──────────────────────────────────────────────────────

pub struct OpenAiCompatModel {
    pub base_url: String,
    pub model: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatModel {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(k) => req.bearer_auth(k),
            None => req,
        }
    }
}

#[async_trait]
impl TextModel for OpenAiCompatModel {
    async fn generate(&self, prompt: &str, opts: &GenerateOptions) -> Result<String, AiError> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model":       self.model,
            "messages":    [{ "role": "user", "content": prompt }],
            "max_tokens":  opts.max_output_tokens,
            "temperature": opts.temperature,
        });

        let started = std::time::Instant::now();
        let resp = self.auth(self.client.post(&url)).json(&body).send().await?;
        let json = check_status(resp).await?;

        let text = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();
        if text.trim().is_empty() {
            return Err(AiError::Malformed("empty completion text".to_string()));
        }

        audit::record("openai_compatible", &self.model, prompt, &text, started.elapsed());
        Ok(text)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
