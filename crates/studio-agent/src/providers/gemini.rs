// ABOUTME: Google Gemini API adapter implementing the ProviderClient trait.
// ABOUTME: Translates prompts into generateContent calls with a fixed seed and large output budget.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::provider::{GenerationMode, ProviderClient, ProviderError};
use crate::providers::{non_empty, send_json, system_prompt};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
const MAX_TOKENS: u32 = 20000;
const SEED: u32 = 12;

/// Google Gemini runtime adapter.
pub struct GeminiClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClient {
    /// Create a new GeminiClient reading configuration from environment variables.
    /// Required: `GOOGLE_API_KEY` (or `GEMINI_API_KEY`)
    /// Optional: `GEMINI_BASE_URL` (defaults to https://generativelanguage.googleapis.com)
    /// Optional: `GEMINI_MODEL` (defaults to gemini-2.0-flash-exp)
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = ["GOOGLE_API_KEY", "GEMINI_API_KEY"]
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|k| !k.is_empty()))
            .ok_or_else(|| ProviderError::NotConfigured("GOOGLE_API_KEY".to_string()))?;

        let base_url =
            std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Ok(Self::new(api_key, base_url, model))
    }

    /// Create a new GeminiClient with explicit configuration.
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

    /// Build the JSON request body for the generateContent API.
    pub fn build_request_body(&self, prompt: &str, mode: GenerationMode) -> Value {
        json!({
            "systemInstruction": {
                "parts": [{"text": system_prompt(mode)}]
            },
            "contents": [
                {"role": "user", "parts": [{"text": prompt}]}
            ],
            "generationConfig": {
                "temperature": mode.temperature(),
                "maxOutputTokens": MAX_TOKENS,
                "seed": SEED
            }
        })
    }

    /// Join the text parts of the first candidate.
    pub fn parse_response(response_body: &Value) -> Result<String, ProviderError> {
        let candidates = response_body
            .get("candidates")
            .and_then(|c| c.as_array())
            .ok_or_else(|| {
                ProviderError::InvalidResponse("missing candidates array in response".to_string())
            })?;

        let candidate = candidates
            .first()
            .ok_or_else(|| ProviderError::InvalidResponse("empty candidates array".to_string()))?;

        let parts = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.as_array())
            .ok_or_else(|| {
                ProviderError::InvalidResponse("missing parts array in content".to_string())
            })?;

        let text = parts
            .iter()
            .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("");

        non_empty(text)
    }
}

#[async_trait]
impl ProviderClient for GeminiClient {
    async fn generate(&self, prompt: &str, mode: GenerationMode) -> Result<String, ProviderError> {
        let body = self.build_request_body(prompt, mode);
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);

        let response_body = send_json(request, "GOOGLE_API_KEY").await?;
        Self::parse_response(&response_body)
    }

    fn provider_id(&self) -> &str {
        "gemini"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
