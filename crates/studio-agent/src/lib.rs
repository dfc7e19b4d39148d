// ABOUTME: Provider layer for the persona studio: LLM clients, fan-out aggregation, and synthesis.
// ABOUTME: Every vendor sits behind the ProviderClient trait; the aggregator never branches on identity.

pub mod aggregate;
pub mod client;
pub mod prompts;
pub mod provider;
pub mod providers;
pub mod synthesize;
pub mod testing;

pub use aggregate::{AggregateError, Aggregator, DEFAULT_PROVIDER_TIMEOUT};
pub use client::{ProviderInfo, create_provider, create_providers, detect_providers};
pub use prompts::{GeneratedPrompt, PromptError, PromptGenerator};
pub use provider::{GenerationMode, ProviderClient, ProviderError};
pub use synthesize::{SynthesisError, Synthesizer};
