// ABOUTME: Result types flowing from the fan-out aggregator into the synthesizer.
// ABOUTME: ProviderOutcome per provider call, AggregationResult per request, SynthesizedDocument per merge.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Result of calling one provider for one request. Exactly one of `text`
/// (non-empty) or `error` is meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderOutcome {
    pub provider_id: String,
    pub text: String,
    pub error: Option<String>,
}

impl ProviderOutcome {
    /// A successful outcome. Empty text is recorded as a failure.
    pub fn success(provider_id: impl Into<String>, text: impl Into<String>) -> Self {
        let provider_id = provider_id.into();
        let text = text.into();
        if text.trim().is_empty() {
            return Self::failure(provider_id, "provider returned an empty response");
        }
        Self {
            provider_id,
            text,
            error: None,
        }
    }

    pub fn failure(provider_id: impl Into<String>, error: impl Display) -> Self {
        Self {
            provider_id: provider_id.into(),
            text: String::new(),
            error: Some(error.to_string()),
        }
    }

    /// Build an outcome from a provider call result.
    pub fn from_result<E: Display>(provider_id: impl Into<String>, result: Result<String, E>) -> Self {
        match result {
            Ok(text) => Self::success(provider_id, text),
            Err(e) => Self::failure(provider_id, e),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Every outcome for one request, in provider registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregationResult {
    outcomes: Vec<ProviderOutcome>,
}

impl AggregationResult {
    pub fn new(outcomes: Vec<ProviderOutcome>) -> Self {
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &[ProviderOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Successful outcomes, still in registration order.
    pub fn successes(&self) -> impl Iterator<Item = &ProviderOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProviderOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// The successful outcome with the longest text. Ties go to the
    /// earliest-registered provider.
    pub fn longest_success(&self) -> Option<&ProviderOutcome> {
        self.successes().fold(None, |best: Option<&ProviderOutcome>, candidate| match best {
            Some(b) if b.text.chars().count() >= candidate.text.chars().count() => Some(b),
            _ => Some(candidate),
        })
    }
}

/// The merged persona document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesizedDocument {
    pub text: String,
    /// Successful provider outcomes plus the supplemental document, if any.
    pub source_count: usize,
    /// True when synthesis failed and the longest single output was used instead.
    pub used_fallback: bool,
}
