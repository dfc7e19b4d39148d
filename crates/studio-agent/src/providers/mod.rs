// ABOUTME: Provider module aggregating all LLM vendor adapters.
// ABOUTME: Each sub-module implements ProviderClient for one vendor API; shared HTTP handling lives here.

pub mod anthropic;
pub mod gemini;
pub mod grok;
pub mod openai;

use serde_json::Value;

use crate::provider::{GenerationMode, ProviderError};

/// System prompt shared by every adapter so all vendors receive the same framing.
pub fn system_prompt(mode: GenerationMode) -> &'static str {
    match mode {
        GenerationMode::Creative => {
            "You are an expert at creating detailed, realistic personas. \
             Write the persona in well-structured Markdown and start directly with the content."
        }
        GenerationMode::Synthesis => {
            "You combine several persona documents into one faithful, coherent persona. \
             Do not invent facts that none of the sources support."
        }
        GenerationMode::Prompt => {
            "You turn persona documents into ready-to-use prompts for AI assistants. \
             Respond with the prompt text only."
        }
    }
}

/// Send a prepared request and decode the JSON body, mapping HTTP failures
/// onto ProviderError. `key_var` names the credential for auth errors.
pub(crate) async fn send_json(
    request: reqwest::RequestBuilder,
    key_var: &str,
) -> Result<Value, ProviderError> {
    let response = request
        .send()
        .await
        .map_err(|e| ProviderError::Transport(e.to_string()))?;

    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ProviderError::RateLimited);
    }

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ProviderError::Unauthorized(key_var.to_string()));
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::Api {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| ProviderError::InvalidResponse(format!("failed to parse JSON: {}", e)))
}

/// Fail on blank generated text.
pub(crate) fn non_empty(text: String) -> Result<String, ProviderError> {
    if text.trim().is_empty() {
        Err(ProviderError::EmptyResponse)
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_differs_per_mode() {
        let creative = system_prompt(GenerationMode::Creative);
        let synthesis = system_prompt(GenerationMode::Synthesis);
        let prompt = system_prompt(GenerationMode::Prompt);
        assert_ne!(creative, synthesis);
        assert_ne!(synthesis, prompt);
    }

    #[test]
    fn non_empty_rejects_whitespace() {
        assert!(matches!(
            non_empty("  \n".to_string()),
            Err(ProviderError::EmptyResponse)
        ));
        assert_eq!(non_empty("ok".to_string()).unwrap(), "ok");
    }
}
