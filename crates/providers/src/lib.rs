//! LLM provider implementations for Brook.
//!
//! One provider backs a deployment. Every supported backend speaks the
//! OpenAI-compatible `/chat/completions` dialect, so a single client type
//! covers Gemini (via its OpenAI-compat endpoint), OpenAI, OpenRouter,
//! Ollama, and any custom endpoint.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use brook_core::provider::Provider;
use std::sync::Arc;

/// Build the configured provider.
///
/// `provider_url` in the config overrides the well-known base URL for the
/// named provider.
pub fn build_from_config(config: &brook_config::AppConfig) -> Arc<dyn Provider> {
    let api_key = config.api_key.clone().unwrap_or_default();
    let base_url = config
        .provider_url
        .clone()
        .unwrap_or_else(|| default_base_url(&config.provider));

    Arc::new(OpenAiCompatProvider::new(
        &config.provider,
        &base_url,
        &api_key,
    ))
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "gemini" => "https://generativelanguage.googleapis.com/v1beta/openai".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        other => format!("https://{other}.api.example.com/v1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("gemini").contains("generativelanguage.googleapis.com"));
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }

    #[test]
    fn build_from_default_config() {
        let config = brook_config::AppConfig::default();
        let provider = build_from_config(&config);
        assert_eq!(provider.name(), "gemini");
    }

    #[test]
    fn explicit_url_wins() {
        let config = brook_config::AppConfig {
            provider: "gemini".into(),
            provider_url: Some("http://localhost:9999/v1".into()),
            ..brook_config::AppConfig::default()
        };
        let provider = build_from_config(&config);
        assert_eq!(provider.name(), "gemini");
    }
}
