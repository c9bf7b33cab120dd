pub mod providers;
pub mod retry;

use gleaner_core::config::{AppConfig, ModelConfig};
use gleaner_core::error::{GleanerError, Result};
use gleaner_core::traits::LlmClient;

pub use providers::openai::OpenAiClient;
pub use retry::RetryingClient;

/// Create an LLM client based on the provider name.
///
/// Every supported provider speaks the OpenAI chat-completions dialect;
/// capability flags come from the preset for `config.provider`.
pub fn create_client(config: &ModelConfig) -> Result<Box<dyn LlmClient>> {
    match config.provider.as_str() {
        "anthropic" | "claude" | "gemini" | "cohere" => Err(GleanerError::UnsupportedProvider(
            format!(
                "{} (use an OpenAI-compatible gateway such as openrouter)",
                config.provider
            ),
        )),
        _ => Ok(Box::new(OpenAiClient::new(config))),
    }
}

/// Create the client for an app config: the primary model wrapped with
/// retries and any fallback models.
pub fn client_for(config: &AppConfig) -> Result<Box<dyn LlmClient>> {
    let primary = create_client(&config.model)?;
    if config.model.retry.is_none() && config.fallback_models.is_empty() {
        return Ok(primary);
    }

    let fallbacks = config
        .fallback_models
        .iter()
        .map(|m| create_client(m).map(|c| (m.clone(), c)))
        .collect::<Result<Vec<_>>>()?;

    Ok(Box::new(RetryingClient::new(
        primary,
        fallbacks,
        config.model.retry.clone().unwrap_or_default(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gleaner_core::types::Capabilities;

    #[test]
    fn test_create_client_uses_preset_capabilities() {
        let client = create_client(&ModelConfig::new("openai", "gpt-4o-mini")).unwrap();
        assert_eq!(client.capabilities(), Capabilities::new(true, true));
    }

    #[test]
    fn test_unsupported_provider() {
        let err = create_client(&ModelConfig::new("anthropic", "claude")).err();
        assert!(matches!(err, Some(GleanerError::UnsupportedProvider(_))));
    }
}
