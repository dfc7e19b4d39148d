// ABOUTME: Factory for creating provider clients from environment configuration.
// ABOUTME: Resolves provider names + optional model overrides into Arc<dyn ProviderClient>, and reports key availability.

use std::env;
use std::sync::Arc;

use anyhow::Context;

use crate::provider::ProviderClient;
use crate::providers::anthropic::AnthropicClient;
use crate::providers::gemini::GeminiClient;
use crate::providers::grok::GrokClient;
use crate::providers::openai::OpenAIClient;

/// Create a provider client for the given name.
///
/// Accepted names: `claude`/`anthropic`, `gemini`/`google`, `grok`/`xai`,
/// `gpt`/`openai`. The model is resolved from:
/// 1. The explicit `model` parameter (if Some)
/// 2. The vendor's model environment variable (e.g. CLAUDE_MODEL)
/// 3. The vendor default
pub fn create_provider(
    name: &str,
    model: Option<&str>,
) -> Result<Arc<dyn ProviderClient>, anyhow::Error> {
    let client: Arc<dyn ProviderClient> = match name.trim().to_lowercase().as_str() {
        "claude" | "anthropic" => {
            let mut client = AnthropicClient::from_env().context("claude provider")?;
            if let Some(model) = model {
                client = client.with_model(model);
            }
            Arc::new(client)
        }
        "gemini" | "google" => {
            let mut client = GeminiClient::from_env().context("gemini provider")?;
            if let Some(model) = model {
                client = client.with_model(model);
            }
            Arc::new(client)
        }
        "grok" | "xai" => {
            let mut client = GrokClient::from_env().context("grok provider")?;
            if let Some(model) = model {
                client = client.with_model(model);
            }
            Arc::new(client)
        }
        "gpt" | "openai" => {
            let mut client = OpenAIClient::from_env().context("gpt provider")?;
            if let Some(model) = model {
                client = client.with_model(model);
            }
            Arc::new(client)
        }
        unknown => return Err(anyhow::anyhow!("unsupported LLM provider: {}", unknown)),
    };
    Ok(client)
}

/// Create every named provider, preserving order. Fails on the first
/// provider that cannot be configured.
pub fn create_providers(names: &[String]) -> Result<Vec<Arc<dyn ProviderClient>>, anyhow::Error> {
    names.iter().map(|name| create_provider(name, None)).collect()
}

/// Configuration status of one provider, never exposing key values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderInfo {
    pub name: &'static str,
    pub has_api_key: bool,
    pub model: String,
}

/// Report which providers have credentials in the environment.
pub fn detect_providers() -> Vec<ProviderInfo> {
    vec![
        check_provider("claude", &["ANTHROPIC_API_KEY"], "CLAUDE_MODEL", "claude-opus-4-20250514"),
        check_provider(
            "gemini",
            &["GOOGLE_API_KEY", "GEMINI_API_KEY"],
            "GEMINI_MODEL",
            "gemini-2.0-flash-exp",
        ),
        check_provider("grok", &["GROK_API_KEY"], "GROK_MODEL", "grok-2-1212"),
        check_provider("gpt", &["OPENAI_API_KEY"], "GPT_MODEL", "gpt-4"),
    ]
}

fn check_provider(
    name: &'static str,
    key_vars: &[&str],
    model_var: &str,
    default_model: &str,
) -> ProviderInfo {
    let has_api_key = key_vars
        .iter()
        .any(|var| env::var(var).map(|v| !v.is_empty()).unwrap_or(false));
    let model = env::var(model_var)
        .ok()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| default_model.to_string());
    ProviderInfo {
        name,
        has_api_key,
        model,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Serialize all tests that read/write env vars to prevent race conditions.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Arc<dyn ProviderClient> doesn't impl Debug, so unwrap_err() is unavailable.
    fn expect_err(result: Result<Arc<dyn ProviderClient>, anyhow::Error>) -> String {
        match result {
            Err(e) => format!("{:#}", e),
            Ok(client) => panic!("expected error, got provider {}", client.provider_id()),
        }
    }

    #[test]
    fn unknown_provider_returns_error() {
        let err = expect_err(create_provider("unknown", None));
        assert!(err.contains("unsupported LLM provider"), "got: {}", err);
    }

    #[test]
    fn missing_api_key_names_the_variable() {
        let _guard = ENV_MUTEX.lock().unwrap();
        // SAFETY: serialized by ENV_MUTEX
        unsafe { env::remove_var("GROK_API_KEY") };
        let err = expect_err(create_provider("grok", None));
        assert!(err.contains("GROK_API_KEY"), "got: {}", err);
    }

    #[test]
    fn aliases_resolve_to_same_provider() {
        let _guard = ENV_MUTEX.lock().unwrap();
        // SAFETY: serialized by ENV_MUTEX
        unsafe { env::set_var("OPENAI_API_KEY", "test-key") };

        let by_vendor = create_provider("openai", None).map(|c| c.provider_id().to_string());
        let by_id = create_provider("GPT", None).map(|c| c.provider_id().to_string());

        unsafe { env::remove_var("OPENAI_API_KEY") };

        assert_eq!(by_vendor.unwrap(), "gpt");
        assert_eq!(by_id.unwrap(), "gpt");
    }

    #[test]
    fn explicit_model_param_overrides_default() {
        let _guard = ENV_MUTEX.lock().unwrap();
        // SAFETY: serialized by ENV_MUTEX
        unsafe { env::set_var("ANTHROPIC_API_KEY", "test-key-456") };

        let result = create_provider("anthropic", Some("claude-sonnet-4-5-20250929"));

        unsafe { env::remove_var("ANTHROPIC_API_KEY") };

        let client = match result {
            Ok(client) => client,
            Err(e) => panic!("expected Ok, got Err: {}", e),
        };
        assert_eq!(client.model_name(), "claude-sonnet-4-5-20250929");
    }

    #[test]
    fn gemini_accepts_either_key_variable() {
        let _guard = ENV_MUTEX.lock().unwrap();
        // SAFETY: serialized by ENV_MUTEX
        unsafe {
            env::remove_var("GOOGLE_API_KEY");
            env::set_var("GEMINI_API_KEY", "g-key");
        }

        let result = create_provider("gemini", None).map(|c| c.provider_id().to_string());
        let detected = detect_providers();

        unsafe { env::remove_var("GEMINI_API_KEY") };

        assert_eq!(result.unwrap(), "gemini");
        let gemini = detected.iter().find(|p| p.name == "gemini").unwrap();
        assert!(gemini.has_api_key);
    }

    #[test]
    fn create_providers_preserves_order() {
        let _guard = ENV_MUTEX.lock().unwrap();
        // SAFETY: serialized by ENV_MUTEX
        unsafe {
            env::set_var("GROK_API_KEY", "x");
            env::set_var("OPENAI_API_KEY", "y");
        }

        let ids = create_providers(&["grok".to_string(), "openai".to_string()])
            .map(|v| v.iter().map(|c| c.provider_id().to_string()).collect::<Vec<_>>());

        unsafe {
            env::remove_var("GROK_API_KEY");
            env::remove_var("OPENAI_API_KEY");
        }

        assert_eq!(ids.unwrap(), vec!["grok".to_string(), "gpt".to_string()]);
    }
}
