// ABOUTME: Test utilities for studio-agent, including a configurable stub provider.
// ABOUTME: Used by unit and integration tests to simulate provider responses without real API calls.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::provider::{GenerationMode, ProviderClient, ProviderError};

/// A provider that returns a fixed response, optionally after a delay.
/// Records how often it was called and with which prompt.
#[derive(Debug)]
pub struct StubProvider {
    id: String,
    response: Result<String, String>,
    delay: Duration,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
    last_mode: Mutex<Option<GenerationMode>>,
}

impl StubProvider {
    /// A stub that always returns `text`.
    pub fn new(id: &str, text: impl Into<String>) -> Self {
        Self::with_response(id, Ok(text.into()))
    }

    /// A stub that always fails with a transport error carrying `message`.
    pub fn failing(id: &str, message: &str) -> Self {
        Self::with_response(id, Err(message.to_string()))
    }

    fn with_response(id: &str, response: Result<String, String>) -> Self {
        Self {
            id: id.to_string(),
            response,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
            last_mode: Mutex::new(None),
        }
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().ok().and_then(|p| p.clone())
    }

    pub fn last_mode(&self) -> Option<GenerationMode> {
        self.last_mode.lock().ok().and_then(|m| *m)
    }
}

#[async_trait]
impl ProviderClient for StubProvider {
    async fn generate(&self, prompt: &str, mode: GenerationMode) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = Some(prompt.to_string());
        }
        if let Ok(mut last) = self.last_mode.lock() {
            *last = Some(mode);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.response
            .clone()
            .map_err(ProviderError::Transport)
    }

    fn provider_id(&self) -> &str {
        &self.id
    }

    fn model_name(&self) -> &str {
        "stub-model"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_returns_configured_text_and_records_call() {
        let stub = StubProvider::new("claude", "Hello, world!");
        let text = stub.generate("prompt", GenerationMode::Synthesis).await.unwrap();

        assert_eq!(text, "Hello, world!");
        assert_eq!(stub.call_count(), 1);
        assert_eq!(stub.last_prompt().as_deref(), Some("prompt"));
        assert_eq!(stub.last_mode(), Some(GenerationMode::Synthesis));
    }

    #[tokio::test]
    async fn failing_stub_returns_transport_error() {
        let stub = StubProvider::failing("gpt", "boom");
        let err = stub.generate("p", GenerationMode::Creative).await.unwrap_err();
        assert!(matches!(err, ProviderError::Transport(ref m) if m == "boom"));
    }
}
