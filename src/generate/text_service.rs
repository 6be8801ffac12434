//! Generative text service seam and the Gemini implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::constants::USER_AGENT;
use crate::retry::Retryable;

/// One completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Error)]
pub enum TextServiceError {
    /// Worth retrying: timeouts, connection errors, throttling, 5xx, empty output
    #[error("text service temporarily unavailable: {0}")]
    Transient(String),
    #[error("text service rejected the request: {0}")]
    Permanent(String),
}

impl Retryable for TextServiceError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Anything that turns a prompt into text.
#[async_trait]
pub trait TextService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, TextServiceError>;
}

const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com";

/// Client for the Gemini `generateContent` REST endpoint.
pub struct GeminiClient {
    api_key: String,
    model: String,
    http: reqwest::Client,
    base_url: String,
}

impl GeminiClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: &str, model: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            api_key: api_key.to_string(),
            model: model.to_string(),
            http,
            base_url: GEMINI_API_URL.to_string(),
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn headers(&self) -> Result<HeaderMap, TextServiceError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| TextServiceError::Permanent(format!("invalid API key: {e}")))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: Vec<GeminiContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<GeminiPart<'a>>,
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
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

#[async_trait]
impl TextService for GeminiClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, TextServiceError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url,
            urlencoding::encode(&self.model)
        );
        let body = GenerateRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: &request.system,
                }],
            },
            contents: vec![GeminiContent {
                role: Some("user"),
                parts: vec![GeminiPart {
                    text: &request.prompt,
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
            },
        };

        debug!(model = %self.model, "Gemini generateContent request");

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| TextServiceError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = format!("Gemini API error ({status}): {error_text}");
            return Err(if status.as_u16() == 429 || status.is_server_error() {
                TextServiceError::Transient(message)
            } else {
                TextServiceError::Permanent(message)
            });
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| TextServiceError::Transient(format!("unreadable response: {e}")))?;

        let text: String = parsed
            .candidates
            .into_iter()
            .find_map(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        let text = text.trim();
        if text.is_empty() {
            return Err(TextServiceError::Transient(
                "Gemini returned an empty response".to_string(),
            ));
        }
        Ok(text.to_string())
    }
}
