// ABOUTME: OpenAI API adapter implementing the ProviderClient trait.
// ABOUTME: Translates prompts into Chat Completions calls; the request/response helpers are shared with Grok.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::provider::{GenerationMode, ProviderClient, ProviderError};
use crate::providers::{non_empty, send_json, system_prompt};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4";
const MAX_TOKENS: u32 = 4096;

/// OpenAI runtime adapter. Calls the Chat Completions API and returns the
/// first choice's message content.
pub struct OpenAIClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAIClient {
    /// Create a new OpenAIClient reading configuration from environment variables.
    /// Required: `OPENAI_API_KEY`
    /// Optional: `OPENAI_BASE_URL` (defaults to https://api.openai.com)
    /// Optional: `GPT_MODEL` (defaults to gpt-4)
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ProviderError::NotConfigured("OPENAI_API_KEY".to_string()))?;

        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let model = std::env::var("GPT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Ok(Self::new(api_key, base_url, model))
    }

    /// Create a new OpenAIClient with explicit configuration.
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            model,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Build the JSON request body for the Chat Completions API.
    pub fn build_request_body(&self, prompt: &str, mode: GenerationMode) -> Value {
        chat_request_body(&self.model, MAX_TOKENS, prompt, mode)
    }

    /// Extract the generated text from a Chat Completions response.
    pub fn parse_response(response_body: &Value) -> Result<String, ProviderError> {
        parse_chat_response(response_body)
    }
}

/// Chat Completions request body, shared by OpenAI-compatible vendors.
pub(crate) fn chat_request_body(model: &str, max_tokens: u32, prompt: &str, mode: GenerationMode) -> Value {
    json!({
        "model": model,
        "max_tokens": max_tokens,
        "temperature": mode.temperature(),
        "messages": [
            {"role": "system", "content": system_prompt(mode)},
            {"role": "user", "content": prompt}
        ]
    })
}

/// First choice's message content from a Chat Completions response.
pub(crate) fn parse_chat_response(response_body: &Value) -> Result<String, ProviderError> {
    let choices = response_body
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| {
            ProviderError::InvalidResponse("missing choices array in response".to_string())
        })?;

    let choice = choices
        .first()
        .ok_or_else(|| ProviderError::InvalidResponse("empty choices array".to_string()))?;

    let content = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .unwrap_or("");

    non_empty(content.to_string())
}

#[async_trait]
impl ProviderClient for OpenAIClient {
    async fn generate(&self, prompt: &str, mode: GenerationMode) -> Result<String, ProviderError> {
        let body = self.build_request_body(prompt, mode);
        let url = format!("{}/v1/chat/completions", self.base_url);

        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body);

        let response_body = send_json(request, "OPENAI_API_KEY").await?;
        Self::parse_response(&response_body)
    }

    fn provider_id(&self) -> &str {
        "gpt"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
