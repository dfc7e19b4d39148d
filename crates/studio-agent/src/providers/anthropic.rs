// ABOUTME: Anthropic Claude API adapter implementing the ProviderClient trait.
// ABOUTME: Translates prompts into Anthropic Messages API calls and joins the returned text blocks.

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::provider::{GenerationMode, ProviderClient, ProviderError};
use crate::providers::{non_empty, send_json, system_prompt};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-opus-4-20250514";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 16000;

/// Anthropic Claude runtime adapter.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicClient {
    /// Create a new AnthropicClient reading configuration from environment variables.
    /// Required: `ANTHROPIC_API_KEY`
    /// Optional: `ANTHROPIC_BASE_URL` (defaults to https://api.anthropic.com)
    /// Optional: `CLAUDE_MODEL` (defaults to claude-opus-4-20250514)
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ProviderError::NotConfigured("ANTHROPIC_API_KEY".to_string()))?;

        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let model = std::env::var("CLAUDE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Ok(Self::new(api_key, base_url, model))
    }

    /// Create a new AnthropicClient with explicit configuration.
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

    /// Build the JSON request body for the Anthropic Messages API.
    pub fn build_request_body(&self, prompt: &str, mode: GenerationMode) -> Value {
        json!({
            "model": self.model,
            "max_tokens": MAX_TOKENS,
            "temperature": mode.temperature(),
            "system": system_prompt(mode),
            "messages": [
                {"role": "user", "content": prompt}
            ]
        })
    }

    /// Join every text block of a Messages API response.
    pub fn parse_response(response_body: &Value) -> Result<String, ProviderError> {
        let content = response_body
            .get("content")
            .and_then(|c| c.as_array())
            .ok_or_else(|| {
                ProviderError::InvalidResponse("missing content array in response".to_string())
            })?;

        let text: String = content
            .iter()
            .filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("");

        non_empty(text)
    }
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    async fn generate(&self, prompt: &str, mode: GenerationMode) -> Result<String, ProviderError> {
        let body = self.build_request_body(prompt, mode);
        let url = format!("{}/v1/messages", self.base_url);

        let request = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body);

        let response_body = send_json(request, "ANTHROPIC_API_KEY").await?;
        Self::parse_response(&response_body)
    }

    fn provider_id(&self) -> &str {
        "claude"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str) -> AnthropicClient {
        AnthropicClient::new(
            "test-key".to_string(),
            base_url.to_string(),
            "claude-opus-4-20250514".to_string(),
        )
    }

    #[test]
    fn anthropic_builds_request_body() {
        let body = client(DEFAULT_BASE_URL).build_request_body("Create Persona: Ada", GenerationMode::Creative);

        assert_eq!(body["model"], "claude-opus-4-20250514");
        assert_eq!(body["max_tokens"], 16000);
        assert!(body["system"].as_str().unwrap().contains("personas"));
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn anthropic_joins_text_blocks() {
        let response = json!({
            "content": [
                {"type": "text", "text": "# Ada\n"},
                {"type": "tool_use", "id": "x", "name": "noop", "input": {}},
                {"type": "text", "text": "Mathematician."}
            ],
            "stop_reason": "end_turn"
        });
        assert_eq!(
            AnthropicClient::parse_response(&response).unwrap(),
            "# Ada\nMathematician."
        );
    }

    #[test]
    fn anthropic_rejects_missing_content() {
        assert!(matches!(
            AnthropicClient::parse_response(&json!({"type": "error"})),
            Err(ProviderError::InvalidResponse(_))
        ));
        assert!(matches!(
            AnthropicClient::parse_response(&json!({"content": []})),
            Err(ProviderError::EmptyResponse)
        ));
    }

    #[tokio::test]
    async fn anthropic_sends_version_and_key_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .and(header("anthropic-version", API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [{"type": "text", "text": "Claude persona"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client(&server.uri())
            .generate("p", GenerationMode::Creative)
            .await
            .unwrap();
        assert_eq!(text, "Claude persona");
    }

    #[tokio::test]
    #[cfg(feature = "live-test")]
    async fn anthropic_adapter_basic() {
        let client = AnthropicClient::from_env().expect("ANTHROPIC_API_KEY must be set");
        let result = client
            .generate("Describe Ada Lovelace in one sentence.", GenerationMode::Creative)
            .await;
        assert!(result.is_ok(), "live test failed: {:?}", result.err());
    }
}
