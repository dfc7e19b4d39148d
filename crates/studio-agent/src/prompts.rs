// ABOUTME: Derivative prompt generation from a synthesized persona document.
// ABOUTME: Renders one template per prompt kind, calls a single provider, and validates the result.

use std::sync::Arc;
use std::time::Duration;

use studio_core::PromptKind;
use studio_core::prompt_kind::PromptValidationError;
use studio_core::template::{TemplateName, TemplateStore, render};
use tokio_util::sync::CancellationToken;

use crate::aggregate::DEFAULT_PROVIDER_TIMEOUT;
use crate::provider::{GenerationMode, ProviderClient, ProviderError};

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("{kind} prompt generation failed: {source}")]
    Provider {
        kind: PromptKind,
        #[source]
        source: ProviderError,
    },

    #[error(transparent)]
    Invalid(#[from] PromptValidationError),

    #[error("prompt generation cancelled")]
    Cancelled,
}

/// A validated derivative prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedPrompt {
    pub kind: PromptKind,
    pub content: String,
}

pub struct PromptGenerator {
    provider: Arc<dyn ProviderClient>,
    templates: TemplateStore,
    timeout: Duration,
}

impl PromptGenerator {
    pub fn new(provider: Arc<dyn ProviderClient>, templates: TemplateStore) -> Self {
        Self {
            provider,
            templates,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider_id(&self) -> &str {
        self.provider.provider_id()
    }

    pub async fn generate(
        &self,
        cancel: &CancellationToken,
        synthesized: &str,
        kind: PromptKind,
    ) -> Result<GeneratedPrompt, PromptError> {
        let template = self.templates.load(TemplateName::Derivative(kind));
        let prompt = render(&template, &[("SYNTHESIZED_PERSONA", synthesized.trim())]);

        let call = tokio::time::timeout(
            self.timeout,
            self.provider.generate(&prompt, GenerationMode::Prompt),
        );
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PromptError::Cancelled),
            outcome = call => outcome,
        };

        let content = match outcome {
            Ok(Ok(text)) => text.trim().to_string(),
            Ok(Err(source)) => return Err(PromptError::Provider { kind, source }),
            Err(_) => {
                return Err(PromptError::Provider {
                    kind,
                    source: ProviderError::Timeout(self.timeout.as_secs()),
                });
            }
        };

        kind.validate(&content)?;
        tracing::info!(kind = %kind, chars = content.len(), "derivative prompt generated");
        Ok(GeneratedPrompt { kind, content })
    }

    /// Generate each kind in order. Individual failures are returned
    /// alongside the successes; only cancellation stops the run.
    pub async fn generate_all(
        &self,
        cancel: &CancellationToken,
        synthesized: &str,
        kinds: &[PromptKind],
    ) -> Result<(Vec<GeneratedPrompt>, Vec<PromptError>), PromptError> {
        let mut generated = Vec::new();
        let mut failed = Vec::new();
        for &kind in kinds {
            match self.generate(cancel, synthesized, kind).await {
                Ok(prompt) => generated.push(prompt),
                Err(PromptError::Cancelled) => return Err(PromptError::Cancelled),
                Err(e) => {
                    tracing::warn!(kind = %kind, error = %e, "skipping derivative prompt");
                    failed.push(e);
                }
            }
        }
        Ok((generated, failed))
    }
}
