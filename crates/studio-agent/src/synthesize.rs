// ABOUTME: Synthesizer merging successful provider outputs into one persona document.
// ABOUTME: Uses one designated provider in low-randomness mode and falls back to the longest output on failure.

use std::sync::Arc;
use std::time::Duration;

use studio_core::feedback::format_feedback;
use studio_core::template::{TemplateName, TemplateStore, render};
use studio_core::{AggregationResult, SynthesizedDocument};
use tokio_util::sync::CancellationToken;

use crate::aggregate::DEFAULT_PROVIDER_TIMEOUT;
use crate::provider::{GenerationMode, ProviderClient, ProviderError};

const SOURCES_HEADER: &str = "INPUT PERSONAS TO COMBINE:";
const SOURCES_HEADER_WITH_USER: &str = "INPUT PERSONAS TO COMBINE (including user-supplied version):";

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    /// Every provider failed; there is nothing to merge or fall back to.
    #[error("no successful provider outputs to synthesize")]
    NoSuccessfulOutputs,

    #[error("synthesis cancelled")]
    Cancelled,

    /// Only produced by [`Synthesizer::merge_update`], which has no fallback.
    #[error("synthesis provider failed: {0}")]
    Provider(#[from] ProviderError),
}

/// Merges aggregation results through one synthesis-capable provider.
pub struct Synthesizer {
    provider: Arc<dyn ProviderClient>,
    templates: TemplateStore,
    timeout: Duration,
}

impl Synthesizer {
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

    /// Merge the successful outcomes, plus an optional user-supplied document.
    pub async fn synthesize(
        &self,
        cancel: &CancellationToken,
        result: &AggregationResult,
        supplemental: Option<&str>,
    ) -> Result<SynthesizedDocument, SynthesisError> {
        let template = self.templates.load(TemplateName::Combination);
        self.merge(cancel, result, supplemental, &template, &[]).await
    }

    /// Merge for a feedback revision; the merge prompt also lists the feedback.
    pub async fn synthesize_revision(
        &self,
        cancel: &CancellationToken,
        result: &AggregationResult,
        supplemental: Option<&str>,
        feedback: &[String],
    ) -> Result<SynthesizedDocument, SynthesisError> {
        let template = self.templates.load(TemplateName::FeedbackCombination);
        self.merge(cancel, result, supplemental, &template, feedback).await
    }

    /// Merge an existing persona with a user-provided update.
    pub async fn merge_update(
        &self,
        cancel: &CancellationToken,
        existing: &str,
        update: &str,
    ) -> Result<String, SynthesisError> {
        let template = self.templates.load(TemplateName::UpdateMerge);
        let prompt = render(
            &template,
            &[("EXISTING_PERSONA", existing), ("USER_UPDATE", update)],
        );
        self.call(cancel, &prompt).await?.map_err(SynthesisError::Provider)
    }

    async fn merge(
        &self,
        cancel: &CancellationToken,
        result: &AggregationResult,
        supplemental: Option<&str>,
        template: &str,
        feedback: &[String],
    ) -> Result<SynthesizedDocument, SynthesisError> {
        let successes = result.success_count();
        let supplemental = supplemental.filter(|s| !s.trim().is_empty());
        let source_count = successes + usize::from(supplemental.is_some());

        let Some(longest) = result.longest_success() else {
            return Err(SynthesisError::NoSuccessfulOutputs);
        };

        if successes == 1 && supplemental.is_none() {
            tracing::info!(
                provider = %longest.provider_id,
                "single successful output, skipping synthesis"
            );
            return Ok(SynthesizedDocument {
                text: longest.text.clone(),
                source_count,
                used_fallback: false,
            });
        }

        let prompt = build_merge_prompt(template, result, supplemental, feedback);
        match self.call(cancel, &prompt).await? {
            Ok(text) if !text.trim().is_empty() => {
                tracing::info!(
                    synthesizer = self.provider.provider_id(),
                    sources = source_count,
                    chars = text.len(),
                    "synthesis complete"
                );
                Ok(SynthesizedDocument {
                    text,
                    source_count,
                    used_fallback: false,
                })
            }
            outcome => {
                let error = match outcome {
                    Err(e) => e.to_string(),
                    Ok(_) => ProviderError::EmptyResponse.to_string(),
                };
                tracing::warn!(
                    synthesizer = self.provider.provider_id(),
                    error = %error,
                    fallback = %longest.provider_id,
                    "synthesis failed, using longest individual output"
                );
                Ok(SynthesizedDocument {
                    text: longest.text.clone(),
                    source_count,
                    used_fallback: true,
                })
            }
        }
    }

    /// One bounded, cancellable call to the synthesis provider. The outer
    /// error is cancellation; the inner result is the provider's answer.
    async fn call(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
    ) -> Result<Result<String, ProviderError>, SynthesisError> {
        let call = tokio::time::timeout(
            self.timeout,
            self.provider.generate(prompt, GenerationMode::Synthesis),
        );
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SynthesisError::Cancelled),
            outcome = call => Ok(match outcome {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(self.timeout.as_secs())),
            }),
        }
    }
}

/// Label every successful output, plus the user-supplied document, with
/// explicit start/end delimiters.
pub fn format_sources(result: &AggregationResult, supplemental: Option<&str>) -> String {
    let mut sections: Vec<String> = result
        .successes()
        .enumerate()
        .map(|(i, outcome)| {
            format!(
                "Persona {}: {}\n<<<\n{}\n>>>",
                i + 1,
                outcome.provider_id,
                outcome.text.trim()
            )
        })
        .collect();

    if let Some(user) = supplemental.filter(|s| !s.trim().is_empty()) {
        sections.push(format!(
            "Persona {}: User-Supplied\n<<<\n{}\n>>>",
            sections.len() + 1,
            user.trim()
        ));
    }

    sections.join("\n\n")
}

/// Fill a combination template. Templates without a `{{PERSONAS}}` slot get
/// the sources appended under a header.
pub fn build_merge_prompt(
    template: &str,
    result: &AggregationResult,
    supplemental: Option<&str>,
    feedback: &[String],
) -> String {
    let sources = format_sources(result, supplemental);
    let has_user = supplemental.is_some_and(|s| !s.trim().is_empty());
    let feedback = format_feedback(feedback);

    let mut prompt = if template.contains("{{PERSONAS}}") {
        render(template, &[("PERSONAS", &sources), ("FEEDBACK", &feedback)])
    } else {
        format!(
            "{}\n\n{SOURCES_HEADER}\n\n{sources}",
            render(template, &[("FEEDBACK", &feedback)])
        )
    };

    if has_user {
        prompt = prompt.replacen(SOURCES_HEADER, SOURCES_HEADER_WITH_USER, 1);
    }
    prompt
}
