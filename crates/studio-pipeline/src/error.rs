// ABOUTME: Error taxonomy for pipeline flows.
// ABOUTME: Separates user-input failures from transient failures that are retried on the next poll.

use studio_agent::{AggregateError, SynthesisError};
use studio_core::PublisherError;
use studio_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The request text cannot be turned into a request.
    #[error("invalid request: {0}")]
    Parse(String),

    /// Every provider failed; the request is retried on a later poll.
    #[error("all {providers} providers failed")]
    AggregationFailure { providers: usize },

    #[error("synthesis failed: {0}")]
    Synthesis(SynthesisError),

    #[error("publisher error: {0}")]
    Publisher(#[from] PublisherError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("cancelled")]
    Cancelled,

    #[error("no existing persona found for {0}")]
    MissingPersona(String),

    #[error("no derivative prompts could be generated ({failed} failed)")]
    NoPrompts { failed: usize },
}

impl PipelineError {
    /// Errors caused by the request itself rather than a collaborator.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::Parse(_) | Self::MissingPersona(_))
    }
}

impl From<AggregateError> for PipelineError {
    fn from(err: AggregateError) -> Self {
        match err {
            AggregateError::Cancelled => Self::Cancelled,
        }
    }
}

impl From<SynthesisError> for PipelineError {
    fn from(err: SynthesisError) -> Self {
        match err {
            SynthesisError::Cancelled => Self::Cancelled,
            other => Self::Synthesis(other),
        }
    }
}
