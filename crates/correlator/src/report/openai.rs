//! Chat-completions report generator (OpenAI or Ollama).
//!
//! Ollama exposes an OpenAI-compatible `/v1/chat/completions` endpoint, so
//! both providers share one client; they differ only in base URL and in
//! whether an API key is required.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

use crate::alert::AlertRecord;
use crate::error::{ReportError, ReportResult};

use super::prompt::{build_user_prompt, SYSTEM_PROMPT};
use super::ReportGenerator;

/// Default OpenAI API root
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default Ollama API root (OpenAI-compatible)
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";

/// Default model
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

const DEFAULT_MAX_TOKENS: u32 = 150;
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Which LLM backend serves report requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LlmProvider {
    /// OpenAI hosted API
    #[default]
    OpenAi,
    /// Local Ollama server
    Ollama,
}

impl LlmProvider {
    /// Default API root for this provider.
    #[must_use]
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => OPENAI_BASE_URL,
            Self::Ollama => OLLAMA_BASE_URL,
        }
    }

    /// Whether requests must carry an API key.
    #[must_use]
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::OpenAi)
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAi => f.write_str("openai"),
            Self::Ollama => f.write_str("ollama"),
        }
    }
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(format!("unknown LLM provider '{other}' (expected openai or ollama)")),
        }
    }
}

/// Chat-completions request message
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// Chat-completions request
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

/// Chat-completions response choice message
#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Chat-completions response choice
#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

/// Chat-completions usage
#[derive(Debug, Deserialize)]
struct Usage {
    total_tokens: u32,
}

/// Chat-completions response
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

/// API error body
#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// API error response
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

/// Report generator backed by a chat-completions API.
pub struct OpenAiReportGenerator {
    client: Client,
    provider: LlmProvider,
    api_key: Option<String>,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl fmt::Debug for OpenAiReportGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiReportGenerator")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("has_api_key", &self.api_key.is_some())
            .finish_non_exhaustive()
    }
}

impl OpenAiReportGenerator {
    /// Create a generator for the given provider with its default endpoint.
    pub fn new(provider: LlmProvider) -> Self {
        Self {
            client: Client::new(),
            provider,
            api_key: None,
            base_url: provider.default_base_url().to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    /// Set the API key; empty keys are ignored.
    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|key| !key.trim().is_empty());
        self
    }

    /// Set a custom API root (proxies, Azure, remote Ollama).
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the model.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Check if the generator can make requests.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.provider.requires_api_key() || self.api_key.is_some()
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn build_request(&self, alerts: &[AlertRecord]) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: build_user_prompt(alerts),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl ReportGenerator for OpenAiReportGenerator {
    fn name(&self) -> &'static str {
        match self.provider {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Ollama => "ollama",
        }
    }

    async fn generate(&self, alerts: &[AlertRecord]) -> ReportResult<String> {
        if alerts.is_empty() {
            return Err(ReportError::NoAlerts);
        }
        if !self.is_configured() {
            return Err(ReportError::NotConfigured("OPENAI_API_KEY not set".to_string()));
        }

        let request = self.build_request(alerts);
        debug!(
            provider = %self.provider,
            model = %self.model,
            alerts = alerts.len(),
            "Requesting incident report"
        );

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .map_or(body, |error_response| error_response.error.message);
            return Err(ReportError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let api_response: ChatResponse = serde_json::from_str(&body)?;
        let text = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(ReportError::Empty)?;

        info!(
            provider = %self.provider,
            total_tokens = api_response.usage.map_or(0, |usage| usage.total_tokens),
            "Incident report generated successfully"
        );

        Ok(text)
    }
}
