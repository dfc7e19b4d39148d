// ABOUTME: Defines the ProviderClient trait that every LLM vendor adapter implements.
// ABOUTME: Also defines GenerationMode (sampling profile) and ProviderError (what can go wrong).

use async_trait::async_trait;

/// Sampling profile for a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// Independent persona generation.
    Creative,
    /// Faithful merging of several sources.
    Synthesis,
    /// Derivative prompt writing.
    Prompt,
}

impl GenerationMode {
    pub fn temperature(&self) -> f32 {
        match self {
            Self::Creative => 0.7,
            Self::Synthesis => 0.3,
            Self::Prompt => 0.5,
        }
    }
}

/// Errors a single provider call can produce. These never escape the
/// aggregator; they are recorded on the provider's outcome.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{0} not set")]
    NotConfigured(String),

    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("rate limited")]
    RateLimited,

    #[error("unauthorized: check {0}")]
    Unauthorized(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("empty response")]
    EmptyResponse,
}

/// A text-generation backend. One request, one response, no streaming.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Generate text for the prompt.
    async fn generate(&self, prompt: &str, mode: GenerationMode) -> Result<String, ProviderError>;

    /// Stable identifier, also used as the raw output file name (e.g. "claude").
    fn provider_id(&self) -> &str;

    /// Model identifier being used (e.g. "gpt-4").
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesis_is_less_random_than_generation() {
        assert!(GenerationMode::Synthesis.temperature() < GenerationMode::Creative.temperature());
    }

    #[test]
    fn provider_error_display() {
        let errors = vec![
            ProviderError::NotConfigured("GROK_API_KEY".to_string()),
            ProviderError::Transport("connection reset".to_string()),
            ProviderError::Timeout(600),
            ProviderError::RateLimited,
            ProviderError::Unauthorized("OPENAI_API_KEY".to_string()),
            ProviderError::Api {
                status: 400,
                body: "bad request".to_string(),
            },
            ProviderError::InvalidResponse("missing choices".to_string()),
            ProviderError::EmptyResponse,
        ];

        for err in &errors {
            assert!(!err.to_string().is_empty());
        }
        assert_eq!(ProviderError::Timeout(600).to_string(), "timed out after 600s");
    }
}
