// ABOUTME: xAI Grok adapter implementing the ProviderClient trait.
// ABOUTME: Grok speaks the OpenAI Chat Completions format, so request/response handling is shared.

use async_trait::async_trait;
use serde_json::Value;

use crate::provider::{GenerationMode, ProviderClient, ProviderError};
use crate::providers::openai::{chat_request_body, parse_chat_response};
use crate::providers::send_json;

const DEFAULT_BASE_URL: &str = "https://api.x.ai";
const DEFAULT_MODEL: &str = "grok-2-1212";
const MAX_TOKENS: u32 = 20000;

/// Grok runtime adapter.
pub struct GrokClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GrokClient {
    /// Required: `GROK_API_KEY`
    /// Optional: `GROK_BASE_URL` (defaults to https://api.x.ai)
    /// Optional: `GROK_MODEL` (defaults to grok-2-1212)
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("GROK_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ProviderError::NotConfigured("GROK_API_KEY".to_string()))?;

        let base_url =
            std::env::var("GROK_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

        let model = std::env::var("GROK_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Ok(Self::new(api_key, base_url, model))
    }

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

    pub fn build_request_body(&self, prompt: &str, mode: GenerationMode) -> Value {
        chat_request_body(&self.model, MAX_TOKENS, prompt, mode)
    }
}

#[async_trait]
impl ProviderClient for GrokClient {
    async fn generate(&self, prompt: &str, mode: GenerationMode) -> Result<String, ProviderError> {
        let body = self.build_request_body(prompt, mode);
        let url = format!("{}/v1/chat/completions", self.base_url);

        let request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body);

        let response_body = send_json(request, "GROK_API_KEY").await?;
        parse_chat_response(&response_body)
    }

    fn provider_id(&self) -> &str {
        "grok"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn grok_uses_large_token_budget() {
        let client = GrokClient::new(
            "k".to_string(),
            DEFAULT_BASE_URL.to_string(),
            DEFAULT_MODEL.to_string(),
        );
        let body = client.build_request_body("p", GenerationMode::Creative);
        assert_eq!(body["max_tokens"], 20000);
        assert_eq!(body["model"], "grok-2-1212");
        assert_eq!(client.provider_id(), "grok");
    }

    #[tokio::test]
    async fn grok_unauthorized_names_key_variable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = GrokClient::new("bad".to_string(), server.uri(), "grok-2".to_string());
        let err = client
            .generate("p", GenerationMode::Creative)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("GROK_API_KEY"));
    }

    #[tokio::test]
    async fn grok_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "Grok persona"}}]
            })))
            .mount(&server)
            .await;

        let client = GrokClient::new("k".to_string(), server.uri(), "grok-2".to_string());
        let text = client.generate("p", GenerationMode::Creative).await.unwrap();
        assert_eq!(text, "Grok persona");
    }
}
