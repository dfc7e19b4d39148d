// ABOUTME: Fan-out aggregator issuing one concurrent call per registered provider.
// ABOUTME: Waits for every call (or its timeout), keeps every outcome, and returns them in registration order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use studio_core::{AggregationResult, ProviderOutcome};
use tokio_util::sync::CancellationToken;

use crate::provider::{GenerationMode, ProviderClient, ProviderError};

/// Per-call budget applied when none is configured.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    /// The round was aborted; no outcomes are returned.
    #[error("aggregation cancelled")]
    Cancelled,
}

/// The registered providers and the timeout bounding each call.
pub struct Aggregator {
    providers: Vec<Arc<dyn ProviderClient>>,
    timeout: Duration,
}

impl Aggregator {
    pub fn new(providers: Vec<Arc<dyn ProviderClient>>) -> Self {
        Self {
            providers,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn providers(&self) -> &[Arc<dyn ProviderClient>] {
        &self.providers
    }

    pub fn provider_ids(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|p| p.provider_id().to_string())
            .collect()
    }

    /// Send the same prompt to every provider.
    pub async fn aggregate(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
    ) -> Result<AggregationResult, AggregateError> {
        self.aggregate_with(cancel, |_| prompt.to_string()).await
    }

    /// Send each provider the prompt produced by `prompt_for`. The caller
    /// prepares any provider-specific variant; this method never inspects it.
    pub async fn aggregate_with<F>(
        &self,
        cancel: &CancellationToken,
        prompt_for: F,
    ) -> Result<AggregationResult, AggregateError>
    where
        F: Fn(&dyn ProviderClient) -> String,
    {
        let calls = self.providers.iter().map(|provider| {
            let prompt = prompt_for(provider.as_ref());
            self.call_one(Arc::clone(provider), prompt)
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!("aggregation round cancelled, discarding in-flight provider calls");
                Err(AggregateError::Cancelled)
            }
            outcomes = join_all(calls) => {
                let result = AggregationResult::new(outcomes);
                tracing::info!(
                    providers = result.len(),
                    successes = result.success_count(),
                    "aggregation round complete"
                );
                Ok(result)
            }
        }
    }

    async fn call_one(&self, provider: Arc<dyn ProviderClient>, prompt: String) -> ProviderOutcome {
        let started = Instant::now();
        let result = match tokio::time::timeout(
            self.timeout,
            provider.generate(&prompt, GenerationMode::Creative),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.timeout.as_secs())),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(text) => tracing::info!(
                provider = provider.provider_id(),
                model = provider.model_name(),
                chars = text.len(),
                elapsed_ms,
                "provider call succeeded"
            ),
            Err(e) => tracing::warn!(
                provider = provider.provider_id(),
                model = provider.model_name(),
                error = %e,
                elapsed_ms,
                "provider call failed"
            ),
        }

        ProviderOutcome::from_result(provider.provider_id(), result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubProvider;

    fn arc(stub: StubProvider) -> Arc<dyn ProviderClient> {
        Arc::new(stub)
    }

    #[tokio::test]
    async fn keeps_every_outcome_under_partial_failure() {
        let aggregator = Aggregator::new(vec![
            arc(StubProvider::new("claude", "a".repeat(120))),
            arc(StubProvider::new("gemini", "b".repeat(340))),
            arc(StubProvider::failing("grok", "connection reset")),
            arc(StubProvider::new("gpt", "d".repeat(210))),
        ]);

        let result = aggregator
            .aggregate(&CancellationToken::new(), "prompt")
            .await
            .unwrap();

        assert_eq!(result.len(), 4);
        assert_eq!(result.success_count(), 3);
        assert!(result.outcomes()[2].error.as_ref().unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn total_failure_still_returns_all_outcomes() {
        let aggregator = Aggregator::new(vec![
            arc(StubProvider::failing("claude", "down")),
            arc(StubProvider::failing("gemini", "down")),
        ]);

        let result = aggregator
            .aggregate(&CancellationToken::new(), "prompt")
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result.success_count(), 0);
    }

    #[tokio::test]
    async fn order_follows_registration_not_completion() {
        for _ in 0..3 {
            let aggregator = Aggregator::new(vec![
                arc(StubProvider::new("slow", "slow text").with_delay(Duration::from_millis(60))),
                arc(StubProvider::new("fast", "fast text")),
                arc(StubProvider::new("medium", "medium text").with_delay(Duration::from_millis(20))),
            ]);

            let result = aggregator
                .aggregate(&CancellationToken::new(), "prompt")
                .await
                .unwrap();

            let ids: Vec<&str> = result.outcomes().iter().map(|o| o.provider_id.as_str()).collect();
            assert_eq!(ids, vec!["slow", "fast", "medium"]);
        }
    }

    #[tokio::test]
    async fn slow_provider_times_out_without_failing_siblings() {
        let aggregator = Aggregator::new(vec![
            arc(StubProvider::new("claude", "ok")),
            arc(StubProvider::new("grok", "late").with_delay(Duration::from_secs(30))),
        ])
        .with_timeout(Duration::from_millis(50));

        let started = Instant::now();
        let result = aggregator
            .aggregate(&CancellationToken::new(), "prompt")
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(result.outcomes()[0].is_success());
        assert!(result.outcomes()[1].error.as_ref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn every_provider_receives_the_prompt() {
        let claude = Arc::new(StubProvider::new("claude", "x"));
        let gpt = Arc::new(StubProvider::new("gpt", "y"));
        let aggregator = Aggregator::new(vec![
            claude.clone() as Arc<dyn ProviderClient>,
            gpt.clone() as Arc<dyn ProviderClient>,
        ]);

        aggregator
            .aggregate_with(&CancellationToken::new(), |p| format!("for {}", p.provider_id()))
            .await
            .unwrap();

        assert_eq!(claude.last_prompt().as_deref(), Some("for claude"));
        assert_eq!(gpt.last_prompt().as_deref(), Some("for gpt"));
        assert_eq!(claude.call_count(), 1);
    }

    #[tokio::test]
    async fn cancellation_aborts_the_round() {
        let aggregator = Aggregator::new(vec![arc(
            StubProvider::new("claude", "never").with_delay(Duration::from_secs(30)),
        )]);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let result = aggregator.aggregate(&cancel, "prompt").await;
        assert!(matches!(result, Err(AggregateError::Cancelled)));
    }
}
